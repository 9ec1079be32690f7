//! Request persistence
//!
//! Updates are field-scoped: the aggregate fields and a single reviewer's
//! status are written independently, so concurrent actions on different
//! reviewers never overwrite each other.

mod memory;

pub use memory::InMemoryRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::request::{
    MessageHandle, NewReviewRequest, PublishedMessage, RequestEdit, RequestId, ReviewRequest,
    ReviewStatus,
};
use crate::Result;

/// Default size of "recent requests" listings
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Changes to the aggregate fields; `None` leaves a field untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateUpdate {
    pub status: Option<ReviewStatus>,
    pub reminder_count: Option<u32>,
}

impl AggregateUpdate {
    pub fn status(status: ReviewStatus) -> Self {
        Self {
            status: Some(status),
            reminder_count: None,
        }
    }

    pub fn with_reminder_count(mut self, count: Option<u32>) -> Self {
        self.reminder_count = count;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.reminder_count.is_none()
    }
}

/// Persistent store of review requests
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: RequestId) -> Result<Option<ReviewRequest>>;

    /// Find the request whose channel card has this handle
    async fn find_by_message(&self, handle: &MessageHandle) -> Result<Option<ReviewRequest>>;

    /// Most recently created requests, newest first
    async fn find_recent(&self, limit: usize) -> Result<Vec<ReviewRequest>>;

    async fn create(&self, request: NewReviewRequest) -> Result<ReviewRequest>;

    /// Write the aggregate status and/or reminder counter
    async fn update_aggregate(&self, id: RequestId, update: AggregateUpdate)
        -> Result<ReviewRequest>;

    /// Write one reviewer's status, and optionally the reminder counter
    async fn update_reviewer_status(
        &self,
        id: RequestId,
        user_id: &str,
        status: ReviewStatus,
        reminder_count: Option<u32>,
    ) -> Result<ReviewRequest>;

    /// Add one to the reminder counter
    async fn increment_reminder_count(&self, id: RequestId) -> Result<ReviewRequest>;

    /// Record where the request was published
    async fn set_message(&self, id: RequestId, message: PublishedMessage)
        -> Result<ReviewRequest>;

    /// Replace the editable fields and the reviewer list
    async fn apply_edit(&self, id: RequestId, edit: RequestEdit) -> Result<ReviewRequest>;

    /// Requests not merged, declined or on hold, created at or after `cutoff`, newest first
    async fn find_open_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReviewRequest>>;

    /// Requests created within `[start, end]`, restricted to `projects` when non-empty
    async fn find_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        projects: &[String],
    ) -> Result<Vec<ReviewRequest>>;
}

/// Project allow-list match, case-insensitive on trimmed names
pub fn project_allowed(project: &str, projects: &[String]) -> bool {
    if projects.is_empty() {
        return true;
    }
    let project = crate::config::normalize_project(project);
    projects
        .iter()
        .any(|p| crate::config::normalize_project(p) == project)
}
