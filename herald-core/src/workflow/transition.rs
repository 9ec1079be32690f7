//! Status transition engine
//!
//! Reviewer and merger authority are separate tiers: a reviewer changes only
//! their own sub-status, the merger changes the aggregate status. A user who
//! holds both roles gets both tiers applied, reviewer first.

use std::fmt;

use tracing::{debug, info};

use crate::notify::{resolve_intent, NotificationIntent};
use crate::request::{ReviewRequest, ReviewStatus, User, ESCALATION_LIMIT, ESCALATION_RESET};
use crate::store::{AggregateUpdate, RequestRepository};
use crate::Result;

/// Outcome of an attempted status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The actor is neither a reviewer nor the merger
    NotAReviewer,
    /// Only the merger may set this status
    NotTheMerger,
    Success,
}

impl TransitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionOutcome::Success)
    }

    /// Private explanation shown to a rejected actor
    pub fn rejection_message(&self) -> Option<&'static str> {
        match self {
            TransitionOutcome::NotAReviewer => Some(
                "I am unable perform this action, you are not listed as a reviewer for this pull request.",
            ),
            TransitionOutcome::NotTheMerger => Some(
                "I am unable perform this action, you are not listed as the merge master for this pull request.",
            ),
            TransitionOutcome::Success => None,
        }
    }
}

impl fmt::Display for TransitionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionOutcome::NotAReviewer => "not_a_reviewer",
            TransitionOutcome::NotTheMerger => "not_the_merger",
            TransitionOutcome::Success => "success",
        };
        f.write_str(s)
    }
}

/// Result of `attempt_transition`
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub outcome: TransitionOutcome,
    /// The request after mutation (success only)
    pub request: Option<ReviewRequest>,
    pub intent: Option<NotificationIntent>,
    /// The acting user as known to the request
    pub actor: Option<User>,
}

impl TransitionResult {
    fn rejected(outcome: TransitionOutcome, actor: Option<User>) -> Self {
        Self {
            outcome,
            request: None,
            intent: None,
            actor,
        }
    }
}

/// Change to apply to the acting reviewer's sub-record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerChange {
    pub user_id: String,
    pub status: ReviewStatus,
    pub reminder_count: Option<u32>,
}

/// Mutations an authorized transition applies, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub reviewer: Option<ReviewerChange>,
    pub merger: Option<AggregateUpdate>,
    pub actor: User,
}

/// Counter after a reviewer comments or starts reviewing
///
/// Returns `None` when the requested status leaves the counter alone.
pub fn reviewer_reset(count: u32, requested: ReviewStatus) -> Option<u32> {
    if !requested.eases_reminders() {
        return None;
    }
    if count >= ESCALATION_LIMIT {
        Some(ESCALATION_RESET)
    } else {
        Some(count.saturating_sub(1))
    }
}

/// Counter after the merger sets the aggregate status
///
/// Only a comment on an escalated request moves the counter.
pub fn merger_reset(count: u32, requested: ReviewStatus) -> Option<u32> {
    if requested == ReviewStatus::Commented && count >= ESCALATION_LIMIT {
        Some(ESCALATION_RESET)
    } else {
        None
    }
}

/// Decide whether the actor may request the status, and what to mutate
pub fn plan_transition(
    request: &ReviewRequest,
    actor_id: &str,
    requested: ReviewStatus,
) -> std::result::Result<TransitionPlan, TransitionResult> {
    let reviewer = request.reviewer(actor_id);
    let is_merger = request.is_merger(actor_id);

    if reviewer.is_none() && !is_merger {
        return Err(TransitionResult::rejected(
            TransitionOutcome::NotAReviewer,
            None,
        ));
    }

    if requested.is_merger_only() && !is_merger {
        return Err(TransitionResult::rejected(
            TransitionOutcome::NotTheMerger,
            reviewer.map(|r| r.user.clone()),
        ));
    }

    let count = request.reminder_count;

    let reviewer_change = reviewer.map(|r| ReviewerChange {
        user_id: r.user.id.clone(),
        status: requested,
        reminder_count: reviewer_reset(count, requested),
    });

    // The merger write lands last and is computed from the count as loaded, so
    // a dual-role comment keeps the pre-action count unless it was escalated.
    let merger_update = is_merger.then(|| {
        let reviewer_eased = reviewer_change
            .as_ref()
            .is_some_and(|c| c.reminder_count.is_some());
        let reset = merger_reset(count, requested).or(
            (requested == ReviewStatus::Commented && reviewer_eased).then_some(count),
        );
        AggregateUpdate::status(requested).with_reminder_count(reset)
    });

    let actor = reviewer
        .map(|r| r.user.clone())
        .unwrap_or_else(|| request.merger.clone());

    Ok(TransitionPlan {
        reviewer: reviewer_change,
        merger: merger_update,
        actor,
    })
}

/// Authorize and apply a status change through field-scoped repository updates
pub async fn attempt_transition(
    repo: &dyn RequestRepository,
    request: &ReviewRequest,
    actor_id: &str,
    requested: ReviewStatus,
) -> Result<TransitionResult> {
    let plan = match plan_transition(request, actor_id, requested) {
        Ok(plan) => plan,
        Err(rejected) => {
            debug!(
                request_id = %request.id,
                actor = actor_id,
                status = %requested,
                outcome = %rejected.outcome,
                "Transition rejected"
            );
            return Ok(rejected);
        }
    };

    let mut updated = request.clone();

    if let Some(change) = &plan.reviewer {
        updated = repo
            .update_reviewer_status(
                request.id,
                &change.user_id,
                change.status,
                change.reminder_count,
            )
            .await?;
    }

    if let Some(update) = plan.merger {
        updated = repo.update_aggregate(request.id, update).await?;
    }

    let intent = resolve_intent(requested, updated.has_total_approvals());

    info!(
        request_id = %request.id,
        actor = actor_id,
        status = %requested,
        reminder_count = updated.reminder_count,
        intent = ?intent,
        "Review status updated"
    );

    Ok(TransitionResult {
        outcome: TransitionOutcome::Success,
        request: Some(updated),
        intent,
        actor: Some(plan.actor),
    })
}
