//! In-memory implementation of `RequestRepository`.
//!
//! All requests are held in memory and lost on restart. Used by tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{project_allowed, AggregateUpdate, RequestRepository};
use crate::request::{
    dedup_reviewers, MessageHandle, NewReviewRequest, PublishedMessage, RequestEdit, RequestId,
    ReviewRequest, ReviewStatus,
};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    next_id: i64,
    requests: BTreeMap<RequestId, ReviewRequest>,
}

/// In-memory request repository.
///
/// Stores requests in a map protected by a `RwLock`; every update takes the
/// write lock, so each field-scoped update is atomic.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: RwLock<Inner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed request, keeping its id and timestamps
    pub async fn insert(&self, request: ReviewRequest) {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(request.id.0);
        inner.requests.insert(request.id, request);
    }

    async fn modify<F>(&self, id: RequestId, f: F) -> Result<ReviewRequest>
    where
        F: FnOnce(&mut ReviewRequest) -> Result<()> + Send,
    {
        let mut inner = self.inner.write().await;
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("request {}", id)))?;
        f(request)?;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }
}

fn newest_first(mut requests: Vec<ReviewRequest>) -> Vec<ReviewRequest> {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    requests
}

#[async_trait]
impl RequestRepository for InMemoryRepository {
    async fn find_by_id(&self, id: RequestId) -> Result<Option<ReviewRequest>> {
        let inner = self.inner.read().await;
        Ok(inner.requests.get(&id).cloned())
    }

    async fn find_by_message(&self, handle: &MessageHandle) -> Result<Option<ReviewRequest>> {
        let inner = self.inner.read().await;
        Ok(inner
            .requests
            .values()
            .find(|r| r.message_handle() == Some(handle))
            .cloned())
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<ReviewRequest>> {
        let inner = self.inner.read().await;
        let mut recent = newest_first(inner.requests.values().cloned().collect());
        recent.truncate(limit);
        Ok(recent)
    }

    async fn create(&self, request: NewReviewRequest) -> Result<ReviewRequest> {
        let request = request.dedup_reviewers();
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let now = Utc::now();
        let stored = ReviewRequest {
            id: RequestId(inner.next_id),
            title: request.title,
            link: request.link,
            ticket_link: request.ticket_link,
            project: request.project,
            kind: request.kind,
            priority: request.priority,
            author: request.author,
            merger: request.merger,
            reviewers: request.reviewers,
            status: ReviewStatus::Pending,
            reminder_count: 0,
            message: None,
            created_at: now,
            updated_at: now,
        };
        inner.requests.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_aggregate(
        &self,
        id: RequestId,
        update: AggregateUpdate,
    ) -> Result<ReviewRequest> {
        self.modify(id, |request| {
            if let Some(status) = update.status {
                request.status = status;
            }
            if let Some(count) = update.reminder_count {
                request.reminder_count = count;
            }
            Ok(())
        })
        .await
    }

    async fn update_reviewer_status(
        &self,
        id: RequestId,
        user_id: &str,
        status: ReviewStatus,
        reminder_count: Option<u32>,
    ) -> Result<ReviewRequest> {
        self.modify(id, |request| {
            let reviewer = request
                .reviewers
                .iter_mut()
                .find(|r| r.user.id == user_id)
                .ok_or_else(|| {
                    Error::NotFound(format!("reviewer {} on request {}", user_id, id))
                })?;
            reviewer.status = status;
            if let Some(count) = reminder_count {
                request.reminder_count = count;
            }
            Ok(())
        })
        .await
    }

    async fn increment_reminder_count(&self, id: RequestId) -> Result<ReviewRequest> {
        self.modify(id, |request| {
            request.reminder_count = request.reminder_count.saturating_add(1);
            Ok(())
        })
        .await
    }

    async fn set_message(
        &self,
        id: RequestId,
        message: PublishedMessage,
    ) -> Result<ReviewRequest> {
        self.modify(id, |request| {
            request.message = Some(message);
            Ok(())
        })
        .await
    }

    async fn apply_edit(&self, id: RequestId, edit: RequestEdit) -> Result<ReviewRequest> {
        self.modify(id, |request| {
            let mut reviewers = edit.reviewers;
            dedup_reviewers(&mut reviewers);
            request.title = edit.title;
            request.link = edit.link;
            request.ticket_link = edit.ticket_link;
            request.project = edit.project;
            request.kind = edit.kind;
            request.priority = edit.priority;
            request.merger = edit.merger;
            request.reviewers = reviewers;
            Ok(())
        })
        .await
    }

    async fn find_open_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReviewRequest>> {
        let inner = self.inner.read().await;
        Ok(newest_first(
            inner
                .requests
                .values()
                .filter(|r| !r.status.is_closed() && r.created_at >= cutoff)
                .cloned()
                .collect(),
        ))
    }

    async fn find_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        projects: &[String],
    ) -> Result<Vec<ReviewRequest>> {
        let inner = self.inner.read().await;
        Ok(newest_first(
            inner
                .requests
                .values()
                .filter(|r| r.created_at >= start && r.created_at <= end)
                .filter(|r| project_allowed(&r.project, projects))
                .cloned()
                .collect(),
        ))
    }
}
