//! Reminder sweep
//!
//! Every open request created within the lookback window gets one nudge per
//! sweep, addressed to whoever the request is waiting on. The reminder counter
//! advances after each attempt whether or not the message went out.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::ReviewDesk;
use crate::gateway::MessageContent;
use crate::notify::{render_reminder, ReminderKind};
use crate::request::{ReviewRequest, ESCALATION_LIMIT};
use crate::{Error, Result};

/// Decide who a request is waiting on
pub fn classify_reminder(request: &ReviewRequest) -> (ReminderKind, Vec<String>) {
    if request.has_pending_comment() {
        return (ReminderKind::Author, vec![request.author.id.clone()]);
    }

    let pending = request.pending_reviewers();
    if pending.is_empty() {
        (ReminderKind::Merger, vec![request.merger.id.clone()])
    } else {
        (
            ReminderKind::Reviewers,
            pending.iter().map(|r| r.user.id.clone()).collect(),
        )
    }
}

/// The escalation contact is tagged once the counter reaches the limit
pub fn should_escalate(kind: ReminderKind, reminder_count: u32) -> bool {
    kind.can_escalate() && reminder_count >= ESCALATION_LIMIT
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Requests considered
    pub swept: usize,
    /// Reminders delivered
    pub dispatched: usize,
    /// Requests where sending or counting failed
    pub failed: usize,
}

impl ReviewDesk {
    /// Nudge the stakeholders of every open request
    ///
    /// One request's failure is logged and never aborts the sweep.
    pub async fn run_reminder_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let lookback = chrono::Duration::from_std(self.settings.lookback)
            .map_err(|e| Error::Config(format!("Invalid reminder lookback: {}", e)))?;
        let cutoff = now - lookback;

        let requests = self.repository().find_open_created_since(cutoff).await?;
        info!(count = requests.len(), cutoff = %cutoff, "Running reminder sweep");

        let mut report = SweepReport::default();

        for request in &requests {
            report.swept += 1;
            let mut clean = true;

            match self.send_reminder(request).await {
                Ok(()) => report.dispatched += 1,
                Err(e) => {
                    clean = false;
                    warn!(request_id = %request.id, error = %e, "Failed to send reminder");
                }
            }

            if let Err(e) = self.repository().increment_reminder_count(request.id).await {
                clean = false;
                error!(request_id = %request.id, error = %e, "Failed to advance reminder counter");
            }

            if !clean {
                report.failed += 1;
            }
        }

        info!(
            swept = report.swept,
            dispatched = report.dispatched,
            failed = report.failed,
            "Reminder sweep finished"
        );

        Ok(report)
    }

    async fn send_reminder(&self, request: &ReviewRequest) -> Result<()> {
        let (kind, recipients) = classify_reminder(request);

        let escalate_to = if should_escalate(kind, request.reminder_count) {
            if self.settings.escalation_contact.is_none() {
                debug!(request_id = %request.id, "Escalation due but no contact configured");
            }
            self.settings.escalation_contact.as_deref()
        } else {
            None
        };

        let reminder = render_reminder(kind, recipients, escalate_to);

        self.gateway()
            .publish(
                self.channel(),
                &MessageContent::Reminder(reminder),
                request.message_handle(),
            )
            .await?;

        debug!(request_id = %request.id, kind = %kind, escalated = escalate_to.is_some(), "Reminder sent");
        Ok(())
    }
}
