//! Chat platform collaborators
//!
//! The workflow talks to the chat workspace only through these traits, so the
//! Slack adapter and the test fakes are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::notify::{Notification, Reminder};
use crate::request::{MessageHandle, ReviewRequest, User};
use crate::workflow::report::{ReportGroup, ReportSummary};
use crate::Result;

/// A message the gateway accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMessage {
    /// Channel the message landed in (a DM channel when posted to a user)
    pub channel: String,
    pub handle: MessageHandle,
}

/// Everything Herald publishes; the gateway decides how each renders
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// The request card in the review channel
    RequestCard(ReviewRequest),
    /// Receipt sent to the author after submission or edit
    SubmissionReceipt {
        request: ReviewRequest,
        permalink: Option<String>,
        updated: bool,
    },
    Notification(Notification),
    Reminder(Reminder),
    ReportSummary(ReportSummary),
    ReportGroup(ReportGroup),
    /// Introduction and usage, addressed to a user
    Help { user_id: String },
    /// Prompt carrying the button that opens the submission form
    SubmitPrompt,
}

impl MessageContent {
    /// Plain-text fallback shown in push notifications
    pub fn fallback_text(&self) -> String {
        match self {
            MessageContent::RequestCard(request) => format!(
                "@{} submitted a new pull request: {}",
                request.author.handle(),
                request.display_title()
            ),
            MessageContent::SubmissionReceipt { updated: false, .. } => {
                "Your pull request has been successfully submitted!  :tada:".to_string()
            }
            MessageContent::SubmissionReceipt { updated: true, .. } => {
                "Your pull request has been successfully updated!".to_string()
            }
            MessageContent::Notification(n) => n.text.clone(),
            MessageContent::Reminder(r) => r.text.clone(),
            MessageContent::ReportSummary(_) => "Weekly Pull Requests Report".to_string(),
            MessageContent::ReportGroup(group) => format!("{} Weekly Report", group.label),
            MessageContent::Help { user_id } => format!(
                "Hello <@{}> :sunglasses: I'm Herald - your pull request management assistant",
                user_id
            ),
            MessageContent::SubmitPrompt => "Submit a Pull Request".to_string(),
        }
    }
}

/// Forms the gateway can open for a user
#[derive(Debug, Clone, PartialEq)]
pub enum FormView {
    /// Empty submission form
    Submit { user_id: String },
    /// Edit form pre-filled from a stored request
    Edit(ReviewRequest),
}

/// Sends and updates chat messages
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Post a message, optionally threaded under another one
    async fn publish(
        &self,
        channel: &str,
        content: &MessageContent,
        thread: Option<&MessageHandle>,
    ) -> Result<PostedMessage>;

    /// Replace the content of an existing message
    async fn update_message(
        &self,
        channel: &str,
        handle: &MessageHandle,
        content: &MessageContent,
    ) -> Result<()>;

    /// Post a message only the given user can see
    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
        thread: Option<&MessageHandle>,
    ) -> Result<()>;

    /// Permanent link to a message
    async fn permalink(&self, channel: &str, handle: &MessageHandle) -> Result<String>;

    /// Open a modal form in response to an interaction trigger
    async fn open_form(&self, trigger_id: &str, form: &FormView) -> Result<()>;
}

/// Looks up workspace users
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_user(&self, user_id: &str) -> Result<User>;
}
