//! Review request domain model
//!
//! A review request is a single pull request submitted for review: its
//! descriptive metadata, the people involved, the per-reviewer statuses and
//! the aggregate status, plus the handle of the chat message it was published as.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of reminder sweeps after which the escalation contact is tagged
pub const ESCALATION_LIMIT: u32 = 4;

/// Counter value used when easing off an escalated request
pub const ESCALATION_RESET: u32 = 2;

/// Identifier of a stored review request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(RequestId)
            .map_err(|_| Error::NotFound(format!("invalid request id: {}", s)))
    }
}

/// Opaque reference to a published chat message (a Slack `ts`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(pub String);

impl MessageHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat workspace user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Platform user id
    pub id: String,
    /// Account name
    pub name: String,
    /// Display name, if the user set one
    #[serde(default)]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Name to show in message text (display name, falling back to account name)
    pub fn handle(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.name,
        }
    }

    /// Mention markup that pings the user
    pub fn mention(&self) -> String {
        mention(&self.id)
    }
}

/// Mention markup for a raw user id
pub fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}

/// Review status, used both per reviewer and for the request aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Reviewing,
    Commented,
    Approved,
    Declined,
    Merged,
    OnHold,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 7] = [
        ReviewStatus::Pending,
        ReviewStatus::Reviewing,
        ReviewStatus::Commented,
        ReviewStatus::Approved,
        ReviewStatus::Declined,
        ReviewStatus::Merged,
        ReviewStatus::OnHold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Reviewing => "reviewing",
            ReviewStatus::Commented => "commented",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Declined => "declined",
            ReviewStatus::Merged => "merged",
            ReviewStatus::OnHold => "on_hold",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "Pending",
            ReviewStatus::Reviewing => "Reviewing",
            ReviewStatus::Commented => "Commented",
            ReviewStatus::Approved => "Approved",
            ReviewStatus::Declined => "Declined",
            ReviewStatus::Merged => "Merged",
            ReviewStatus::OnHold => "On Hold",
        }
    }

    /// Emoji shown next to a reviewer carrying this status
    pub fn emoji(&self) -> &'static str {
        match self {
            ReviewStatus::Reviewing => ":hourglass_flowing_sand:",
            ReviewStatus::Approved | ReviewStatus::Merged => ":white_check_mark:",
            ReviewStatus::Commented => ":speech_balloon:",
            ReviewStatus::Declined => ":x:",
            ReviewStatus::Pending | ReviewStatus::OnHold => "",
        }
    }

    /// Statuses only the merger may set
    pub fn is_merger_only(&self) -> bool {
        matches!(self, ReviewStatus::Merged | ReviewStatus::OnHold)
    }

    /// Aggregate statuses that take a request out of the reminder rotation
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            ReviewStatus::Merged | ReviewStatus::Declined | ReviewStatus::OnHold
        )
    }

    /// Statuses that count as attention paid and ease the reminder counter
    pub fn eases_reminders(&self) -> bool {
        matches!(self, ReviewStatus::Commented | ReviewStatus::Reviewing)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        ReviewStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| Error::Other(format!("unknown review status: {}", s)))
    }
}

/// Urgency of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Urgent => "urgent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Urgent => "Urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(Error::Other(format!("unknown priority: {}", s))),
        }
    }
}

/// Kind of change the pull request makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Feature,
    Bugfix,
    Hotfix,
    Doc,
    Deployment,
    Refactor,
    Style,
    Chore,
    Perf,
    Test,
    Build,
    Ci,
    Revert,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 13] = [
        ChangeKind::Feature,
        ChangeKind::Bugfix,
        ChangeKind::Hotfix,
        ChangeKind::Doc,
        ChangeKind::Deployment,
        ChangeKind::Refactor,
        ChangeKind::Style,
        ChangeKind::Chore,
        ChangeKind::Perf,
        ChangeKind::Test,
        ChangeKind::Build,
        ChangeKind::Ci,
        ChangeKind::Revert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Feature => "feature",
            ChangeKind::Bugfix => "bugfix",
            ChangeKind::Hotfix => "hotfix",
            ChangeKind::Doc => "doc",
            ChangeKind::Deployment => "deployment",
            ChangeKind::Refactor => "refactor",
            ChangeKind::Style => "style",
            ChangeKind::Chore => "chore",
            ChangeKind::Perf => "perf",
            ChangeKind::Test => "test",
            ChangeKind::Build => "build",
            ChangeKind::Ci => "ci",
            ChangeKind::Revert => "revert",
        }
    }

    /// Label with emoji, as shown on the request card
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Feature => "Feature :sparkles:",
            ChangeKind::Bugfix => "Bugfix :bug:",
            ChangeKind::Hotfix => "Hotfix :fire:",
            ChangeKind::Doc => "Doc :memo:",
            ChangeKind::Deployment => "Deployment :rocket:",
            ChangeKind::Refactor => "Refactor :hammer:",
            ChangeKind::Style => "Style :lipstick:",
            ChangeKind::Chore => "Chore :wrench:",
            ChangeKind::Perf => "Perf :zap:",
            ChangeKind::Test => "Test :white_check_mark:",
            ChangeKind::Build => "Build :hammer_and_wrench:",
            ChangeKind::Ci => "CI :construction_worker:",
            ChangeKind::Revert => "Revert :rewind:",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        ChangeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| Error::Other(format!("unknown change type: {}", s)))
    }
}

/// A reviewer assigned to a request, with their own status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub user: User,
    pub status: ReviewStatus,
}

impl Reviewer {
    /// A freshly assigned reviewer
    pub fn pending(user: User) -> Self {
        Self {
            user,
            status: ReviewStatus::Pending,
        }
    }
}

/// Handles of the messages a request was published as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedMessage {
    /// The request card in the review channel
    pub handle: MessageHandle,
    /// The receipt sent to the author
    pub success_handle: Option<MessageHandle>,
    /// Channel the receipt lives in (the author's DM)
    pub dm_channel: Option<String>,
    /// Permalink to the request card
    pub permalink: Option<String>,
}

/// A stored review request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub id: RequestId,
    pub title: String,
    pub link: String,
    pub ticket_link: String,
    pub project: String,
    pub kind: ChangeKind,
    pub priority: Priority,
    pub author: User,
    pub merger: User,
    pub reviewers: Vec<Reviewer>,
    pub status: ReviewStatus,
    pub reminder_count: u32,
    pub message: Option<PublishedMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewRequest {
    /// Find the reviewer entry for a user
    pub fn reviewer(&self, user_id: &str) -> Option<&Reviewer> {
        self.reviewers.iter().find(|r| r.user.id == user_id)
    }

    /// Check if the user is the designated merger
    pub fn is_merger(&self, user_id: &str) -> bool {
        self.merger.id == user_id
    }

    /// Every reviewer has approved
    pub fn has_total_approvals(&self) -> bool {
        self.reviewers
            .iter()
            .all(|r| r.status == ReviewStatus::Approved)
    }

    /// Aggregate or any reviewer is waiting on the author
    pub fn has_pending_comment(&self) -> bool {
        self.status == ReviewStatus::Commented
            || self
                .reviewers
                .iter()
                .any(|r| r.status == ReviewStatus::Commented)
    }

    /// Reviewers who have neither approved nor merged
    pub fn pending_reviewers(&self) -> Vec<&Reviewer> {
        self.reviewers
            .iter()
            .filter(|r| !matches!(r.status, ReviewStatus::Approved | ReviewStatus::Merged))
            .collect()
    }

    /// Handle of the request card, if it has been published
    pub fn message_handle(&self) -> Option<&MessageHandle> {
        self.message.as_ref().map(|m| &m.handle)
    }

    /// Title with the first letter capitalized, or a placeholder when blank
    pub fn display_title(&self) -> String {
        let title = self.title.trim();
        let mut chars = title.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => "Untitled PR".to_string(),
        }
    }
}

/// Data for a new request, with identities already resolved
#[derive(Debug, Clone, PartialEq)]
pub struct NewReviewRequest {
    pub title: String,
    pub link: String,
    pub ticket_link: String,
    pub project: String,
    pub kind: ChangeKind,
    pub priority: Priority,
    pub author: User,
    pub merger: User,
    pub reviewers: Vec<Reviewer>,
}

impl NewReviewRequest {
    /// Drop repeated reviewer identities, keeping the first occurrence
    pub fn dedup_reviewers(mut self) -> Self {
        dedup_reviewers(&mut self.reviewers);
        self
    }
}

/// Author-initiated replacement of a request's editable fields
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEdit {
    pub title: String,
    pub link: String,
    pub ticket_link: String,
    pub project: String,
    pub kind: ChangeKind,
    pub priority: Priority,
    pub merger: User,
    pub reviewers: Vec<Reviewer>,
}

/// Remove repeated reviewer identities in place, keeping the first occurrence
pub fn dedup_reviewers(reviewers: &mut Vec<Reviewer>) {
    let mut seen = std::collections::HashSet::new();
    reviewers.retain(|r| seen.insert(r.user.id.clone()));
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_status_parse_round_trip() {
        assert_eq!("on_hold".parse::<ReviewStatus>().unwrap(), ReviewStatus::OnHold);
        assert_eq!("On Hold".parse::<ReviewStatus>().unwrap(), ReviewStatus::OnHold);
        assert_eq!(" Approved ".parse::<ReviewStatus>().unwrap(), ReviewStatus::Approved);
        assert!("rejected".parse::<ReviewStatus>().is_err());
    }

    #[test]
    fn test_status_classes() {
        assert!(ReviewStatus::Merged.is_merger_only());
        assert!(ReviewStatus::OnHold.is_merger_only());
        assert!(!ReviewStatus::Declined.is_merger_only());
        assert!(ReviewStatus::Declined.is_closed());
        assert!(!ReviewStatus::Approved.is_closed());
        assert!(ReviewStatus::Reviewing.eases_reminders());
        assert!(!ReviewStatus::Approved.eases_reminders());
    }

    #[test]
    fn test_kind_and_priority_parse() {
        assert_eq!("Perf".parse::<ChangeKind>().unwrap(), ChangeKind::Perf);
        assert_eq!(ChangeKind::Ci.label(), "CI :construction_worker:");
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_total_approvals() {
        let pr = request(&[("A", ReviewStatus::Approved), ("B", ReviewStatus::Pending)]);
        assert!(!pr.has_total_approvals());

        let pr = request(&[("A", ReviewStatus::Approved), ("B", ReviewStatus::Approved)]);
        assert!(pr.has_total_approvals());
    }

    #[test]
    fn test_pending_reviewers_exclude_approved_and_merged() {
        let pr = request(&[
            ("A", ReviewStatus::Approved),
            ("B", ReviewStatus::Merged),
            ("C", ReviewStatus::Reviewing),
            ("D", ReviewStatus::Declined),
        ]);
        let pending: Vec<&str> = pr
            .pending_reviewers()
            .iter()
            .map(|r| r.user.id.as_str())
            .collect();
        assert_eq!(pending, vec!["C", "D"]);
    }

    #[test]
    fn test_pending_comment_from_aggregate_or_reviewer() {
        let mut pr = request(&[("A", ReviewStatus::Pending)]);
        assert!(!pr.has_pending_comment());

        pr.status = ReviewStatus::Commented;
        assert!(pr.has_pending_comment());

        let pr = request(&[("A", ReviewStatus::Commented)]);
        assert!(pr.has_pending_comment());
    }

    #[test]
    fn test_dedup_reviewers_keeps_first() {
        let mut reviewers = vec![
            Reviewer::pending(user("A")),
            Reviewer::pending(user("B")),
            Reviewer {
                user: user("A"),
                status: ReviewStatus::Approved,
            },
        ];
        dedup_reviewers(&mut reviewers);
        assert_eq!(reviewers.len(), 2);
        assert_eq!(reviewers[0].status, ReviewStatus::Pending);
    }

    #[test]
    fn test_display_title() {
        let mut pr = request(&[]);
        assert_eq!(pr.display_title(), "Payment integration");
        pr.title = "   ".to_string();
        assert_eq!(pr.display_title(), "Untitled PR");
    }

    #[test]
    fn test_user_handle_prefers_display_name() {
        let user = User::new("U1", "jdoe");
        assert_eq!(user.handle(), "jdoe");
        let user = user.with_display_name("Jane");
        assert_eq!(user.handle(), "Jane");
        assert_eq!(user.mention(), "<@U1>");
    }
}
