//! Inbound status actions and comment resolution

use tracing::{info, warn};

use super::transition::{attempt_transition, TransitionOutcome};
use super::ReviewDesk;
use crate::gateway::MessageContent;
use crate::notify::{render_notification, render_resolved_comment, NotificationIntent, Stakeholders};
use crate::request::{MessageHandle, ReviewRequest, ReviewStatus};
use crate::Result;

/// Shown when an action refers to a message Herald does not know
pub const REQUEST_NOT_FOUND: &str =
    "Sorry, I can't find the pull request submission. Please try again later.";

/// Shown to a user who tries to resolve someone else's comment
pub const RESOLVE_REFUSED: &str =
    "I am unable to perform this action, only the commenting reviewer or the author can resolve this comment.";

/// What happened to an inbound action
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// No request is attached to the message
    NotFound,
    /// The actor was not allowed to make the change
    Rejected(TransitionOutcome),
    /// The change was applied and the card re-rendered
    Updated {
        request: ReviewRequest,
        /// Notification that was delivered, if any
        notified: Option<NotificationIntent>,
    },
}

impl ActionOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, ActionOutcome::Updated { .. })
    }
}

impl ReviewDesk {
    /// Apply a status chosen from a request card's menu
    ///
    /// The card is re-rendered before any stakeholder is notified; if the
    /// re-render fails the error is returned and nobody is notified.
    pub async fn handle_status_action(
        &self,
        card: &MessageHandle,
        actor_id: &str,
        requested: ReviewStatus,
    ) -> Result<ActionOutcome> {
        let Some(request) = self.repository().find_by_message(card).await? else {
            warn!(message = %card, actor = actor_id, "Status action on unknown message");
            self.gateway()
                .post_ephemeral(self.channel(), actor_id, REQUEST_NOT_FOUND, Some(card))
                .await?;
            return Ok(ActionOutcome::NotFound);
        };

        let result = attempt_transition(self.repository(), &request, actor_id, requested).await?;

        if let Some(message) = result.outcome.rejection_message() {
            self.gateway()
                .post_ephemeral(self.channel(), actor_id, message, None)
                .await?;
            return Ok(ActionOutcome::Rejected(result.outcome));
        }

        let (Some(updated), Some(actor)) = (result.request, result.actor) else {
            return Ok(ActionOutcome::Rejected(result.outcome));
        };

        self.gateway()
            .update_message(self.channel(), card, &MessageContent::RequestCard(updated.clone()))
            .await?;

        let mut notified = None;
        if let Some(intent) = result.intent {
            let notification = render_notification(
                intent,
                Stakeholders {
                    author: &updated.author,
                    merger: &updated.merger,
                    actor: &actor,
                },
                &updated.ticket_link,
            );

            match self
                .gateway()
                .publish(
                    self.channel(),
                    &MessageContent::Notification(notification),
                    Some(card),
                )
                .await
            {
                Ok(_) => {
                    info!(request_id = %updated.id, intent = %intent, "Notification sent");
                    notified = Some(intent);
                }
                Err(e) => {
                    warn!(request_id = %updated.id, intent = %intent, error = %e, "Failed to send notification");
                }
            }
        }

        Ok(ActionOutcome::Updated {
            request: updated,
            notified,
        })
    }

    /// Mark a reviewer's comment as resolved
    ///
    /// Only the commenting reviewer or the request's author may resolve. Runs
    /// the transition to `reviewing` on behalf of the reviewer, re-renders the
    /// card, then rewrites the comment notification as resolved.
    pub async fn resolve_comment(
        &self,
        card: &MessageHandle,
        notification: &MessageHandle,
        actor_id: &str,
        reviewer_id: &str,
    ) -> Result<ActionOutcome> {
        let Some(request) = self.repository().find_by_message(card).await? else {
            warn!(message = %card, reviewer = reviewer_id, "Comment resolved on unknown message");
            return Ok(ActionOutcome::NotFound);
        };

        if actor_id != reviewer_id && actor_id != request.author.id {
            warn!(
                request_id = %request.id,
                actor = actor_id,
                reviewer = reviewer_id,
                "Comment resolve refused"
            );
            self.gateway()
                .post_ephemeral(self.channel(), actor_id, RESOLVE_REFUSED, Some(card))
                .await?;
            return Ok(ActionOutcome::Rejected(TransitionOutcome::NotAReviewer));
        }

        let result =
            attempt_transition(self.repository(), &request, reviewer_id, ReviewStatus::Reviewing)
                .await?;

        let (Some(updated), Some(reviewer)) = (result.request, result.actor) else {
            warn!(
                request_id = %request.id,
                reviewer = reviewer_id,
                outcome = %result.outcome,
                "Comment could not be resolved"
            );
            return Ok(ActionOutcome::Rejected(result.outcome));
        };

        self.gateway()
            .update_message(self.channel(), card, &MessageContent::RequestCard(updated.clone()))
            .await?;

        let resolved = render_resolved_comment(&updated.author, &reviewer);
        self.gateway()
            .update_message(
                self.channel(),
                notification,
                &MessageContent::Notification(resolved),
            )
            .await?;

        info!(request_id = %updated.id, reviewer = reviewer_id, "Comment resolved");

        Ok(ActionOutcome::Updated {
            request: updated,
            notified: None,
        })
    }
}
