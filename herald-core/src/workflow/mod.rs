//! Review workflow
//!
//! `ReviewDesk` ties the transition engine, the dispatch resolver and the
//! collaborators together: inbound actions, submissions, edits, reminder
//! sweeps and the weekly report all run through it.

pub mod conversation;
pub mod reminder;
pub mod report;
pub mod schedule;
pub mod status;
pub mod submission;
pub mod transition;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::gateway::{IdentityResolver, NotificationGateway};
use crate::store::RequestRepository;
use crate::{Error, Result};

pub use reminder::{classify_reminder, should_escalate, SweepReport};
pub use report::{ReportDigest, ReportGroup, ReportSettings, ReportSummary, ReportWindow};
pub use schedule::WeeklySchedule;
pub use status::ActionOutcome;
pub use submission::{SubmissionForm, ValidSubmission};
pub use transition::{attempt_transition, TransitionOutcome, TransitionResult};

/// Settings the desk needs at runtime
#[derive(Debug, Clone)]
pub struct DeskSettings {
    /// Review channel requests are published to
    pub channel: String,
    /// Tagged on escalated reminders
    pub escalation_contact: Option<String>,
    /// Reminder rotation window
    pub lookback: Duration,
}

impl DeskSettings {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            escalation_contact: None,
            lookback: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    pub fn with_escalation_contact(mut self, contact: impl Into<String>) -> Self {
        self.escalation_contact = Some(contact.into());
        self
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Build from loaded configuration; the review channel is required
    pub fn from_config(config: &Config) -> Result<Self> {
        let channel = config
            .slack
            .channel
            .clone()
            .ok_or_else(|| Error::Config("No review channel configured (slack.channel / HERALD_CHANNEL)".to_string()))?;

        Ok(Self {
            channel,
            escalation_contact: config.reminders.escalation_contact.clone(),
            lookback: config.reminders.lookback,
        })
    }
}

/// Entry point for every review workflow operation
pub struct ReviewDesk {
    repo: Arc<dyn RequestRepository>,
    gateway: Arc<dyn NotificationGateway>,
    identities: Arc<dyn IdentityResolver>,
    settings: DeskSettings,
}

impl ReviewDesk {
    pub fn new(
        repo: Arc<dyn RequestRepository>,
        gateway: Arc<dyn NotificationGateway>,
        identities: Arc<dyn IdentityResolver>,
        settings: DeskSettings,
    ) -> Self {
        Self {
            repo,
            gateway,
            identities,
            settings,
        }
    }

    pub fn settings(&self) -> &DeskSettings {
        &self.settings
    }

    pub fn repository(&self) -> &dyn RequestRepository {
        self.repo.as_ref()
    }

    fn gateway(&self) -> &dyn NotificationGateway {
        self.gateway.as_ref()
    }

    fn channel(&self) -> &str {
        &self.settings.channel
    }
}
