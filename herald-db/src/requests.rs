//! Repository for review requests
//!
//! Reviewers live in their own table, one row each, so a reviewer's status
//! change is a single-row update. Counters are incremented in SQL.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use herald_core::store::{AggregateUpdate, RequestRepository};
use herald_core::{
    MessageHandle, NewReviewRequest, PublishedMessage, RequestEdit, RequestId, ReviewRequest,
    ReviewStatus, Reviewer, User,
};

use crate::{Error, Result};

const REQUEST_COLUMNS: &str = "id, title, link, ticket_link, project, kind, priority, \
     author_id, author_name, author_display_name, \
     merger_id, merger_name, merger_display_name, \
     status, reminder_count, message_ts, success_ts, dm_channel, permalink, \
     created_at, updated_at";

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::InvalidData(format!("timestamp out of range: {}", ms)))
}

fn parse<T: FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidData(format!("invalid {}: {}", what, value)))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// SQLite-backed `RequestRepository`
#[derive(Clone)]
pub struct SqliteRequestRepository {
    pool: SqlitePool,
}

impl SqliteRequestRepository {
    /// Create a new repository instance
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> Result<ReviewRequest> {
        let user = |prefix: &str| -> Result<User> {
            Ok(User {
                id: row.try_get(format!("{}_id", prefix).as_str())?,
                name: row.try_get(format!("{}_name", prefix).as_str())?,
                display_name: row.try_get(format!("{}_display_name", prefix).as_str())?,
            })
        };

        let message_ts: Option<String> = row.try_get("message_ts")?;
        let success_ts: Option<String> = row.try_get("success_ts")?;
        let message = message_ts.map(|ts| -> Result<PublishedMessage> {
            Ok(PublishedMessage {
                handle: MessageHandle::new(ts),
                success_handle: success_ts.map(MessageHandle::new),
                dm_channel: row.try_get("dm_channel")?,
                permalink: row.try_get("permalink")?,
            })
        });

        let reminder_count: i64 = row.try_get("reminder_count")?;

        Ok(ReviewRequest {
            id: RequestId(row.try_get("id")?),
            title: row.try_get("title")?,
            link: row.try_get("link")?,
            ticket_link: row.try_get("ticket_link")?,
            project: row.try_get("project")?,
            kind: parse(row.try_get::<&str, _>("kind")?, "change type")?,
            priority: parse(row.try_get::<&str, _>("priority")?, "priority")?,
            author: user("author")?,
            merger: user("merger")?,
            reviewers: Vec::new(),
            status: parse(row.try_get::<&str, _>("status")?, "status")?,
            reminder_count: u32::try_from(reminder_count)
                .map_err(|_| Error::InvalidData(format!("reminder count {}", reminder_count)))?,
            message: message.transpose()?,
            created_at: from_millis(row.try_get("created_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
        })
    }

    async fn load_reviewers(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<Reviewer>>> {
        let mut reviewers: HashMap<i64, Vec<Reviewer>> = HashMap::new();
        if ids.is_empty() {
            return Ok(reviewers);
        }

        let sql = format!(
            "SELECT request_id, user_id, name, display_name, status
             FROM request_reviewers
             WHERE request_id IN ({})
             ORDER BY request_id, position",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        for row in query.fetch_all(&self.pool).await? {
            let request_id: i64 = row.try_get("request_id")?;
            reviewers.entry(request_id).or_default().push(Reviewer {
                user: User {
                    id: row.try_get("user_id")?,
                    name: row.try_get("name")?,
                    display_name: row.try_get("display_name")?,
                },
                status: parse(row.try_get::<&str, _>("status")?, "reviewer status")?,
            });
        }

        Ok(reviewers)
    }

    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<ReviewRequest>> {
        let mut requests = rows
            .iter()
            .map(Self::map_row)
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<i64> = requests.iter().map(|r| r.id.0).collect();
        let mut reviewers = self.load_reviewers(&ids).await?;
        for request in &mut requests {
            request.reviewers = reviewers.remove(&request.id.0).unwrap_or_default();
        }

        Ok(requests)
    }

    /// Find a request by id
    pub async fn find(&self, id: RequestId) -> Result<Option<ReviewRequest>> {
        let sql = format!("SELECT {} FROM requests WHERE id = ?", REQUEST_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(self.hydrate(row.into_iter().collect()).await?.pop())
    }

    /// Get a request by id, failing when it does not exist
    pub async fn get(&self, id: RequestId) -> Result<ReviewRequest> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("request {}", id)))
    }

    /// Find the request published as this message
    pub async fn find_by_message_ts(&self, ts: &str) -> Result<Option<ReviewRequest>> {
        let sql = format!(
            "SELECT {} FROM requests WHERE message_ts = ? LIMIT 1",
            REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql).bind(ts).fetch_optional(&self.pool).await?;
        Ok(self.hydrate(row.into_iter().collect()).await?.pop())
    }

    /// Most recent requests, newest first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<ReviewRequest>> {
        let sql = format!(
            "SELECT {} FROM requests ORDER BY created_at DESC, id DESC LIMIT ?",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }

    /// Insert a request and its reviewers in one transaction
    pub async fn insert(&self, request: NewReviewRequest) -> Result<ReviewRequest> {
        let request = request.dedup_reviewers();
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO requests (
                title, link, ticket_link, project, kind, priority,
                author_id, author_name, author_display_name,
                merger_id, merger_name, merger_display_name,
                status, reminder_count, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&request.title)
        .bind(&request.link)
        .bind(&request.ticket_link)
        .bind(&request.project)
        .bind(request.kind.as_str())
        .bind(request.priority.as_str())
        .bind(&request.author.id)
        .bind(&request.author.name)
        .bind(&request.author.display_name)
        .bind(&request.merger.id)
        .bind(&request.merger.name)
        .bind(&request.merger.display_name)
        .bind(ReviewStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        for (position, reviewer) in request.reviewers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO request_reviewers (request_id, position, user_id, name, display_name, status)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(position as i64)
            .bind(&reviewer.user.id)
            .bind(&reviewer.user.name)
            .bind(&reviewer.user.display_name)
            .bind(reviewer.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(request_id = id, "Inserted review request");

        self.get(RequestId(id)).await
    }

    /// Write the aggregate status and/or counter
    pub async fn update_fields(
        &self,
        id: RequestId,
        update: AggregateUpdate,
    ) -> Result<ReviewRequest> {
        let mut sql = String::from("UPDATE requests SET updated_at = ?");
        if update.status.is_some() {
            sql.push_str(", status = ?");
        }
        if update.reminder_count.is_some() {
            sql.push_str(", reminder_count = ?");
        }
        sql.push_str(" WHERE id = ?");

        let mut query = sqlx::query(&sql).bind(to_millis(Utc::now()));
        if let Some(status) = update.status {
            query = query.bind(status.as_str());
        }
        if let Some(count) = update.reminder_count {
            query = query.bind(i64::from(count));
        }

        let affected = query.bind(id.0).execute(&self.pool).await?.rows_affected();
        if affected == 0 {
            return Err(Error::NotFound(format!("request {}", id)));
        }

        self.get(id).await
    }

    /// Write one reviewer's status, plus the counter when given
    pub async fn update_reviewer(
        &self,
        id: RequestId,
        user_id: &str,
        status: ReviewStatus,
        reminder_count: Option<u32>,
    ) -> Result<ReviewRequest> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            "UPDATE request_reviewers SET status = ? WHERE request_id = ? AND user_id = ?",
        )
        .bind(status.as_str())
        .bind(id.0)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::NotFound(format!(
                "reviewer {} on request {}",
                user_id, id
            )));
        }

        let now = to_millis(Utc::now());
        match reminder_count {
            Some(count) => {
                sqlx::query("UPDATE requests SET reminder_count = ?, updated_at = ? WHERE id = ?")
                    .bind(i64::from(count))
                    .bind(now)
                    .bind(id.0)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE requests SET updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(id.0)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        self.get(id).await
    }

    /// Add one to the reminder counter
    pub async fn increment(&self, id: RequestId) -> Result<ReviewRequest> {
        let affected = sqlx::query(
            "UPDATE requests SET reminder_count = reminder_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(to_millis(Utc::now()))
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::NotFound(format!("request {}", id)));
        }

        self.get(id).await
    }

    /// Record the published message handles
    pub async fn update_message(
        &self,
        id: RequestId,
        message: PublishedMessage,
    ) -> Result<ReviewRequest> {
        let affected = sqlx::query(
            r#"
            UPDATE requests
            SET message_ts = ?, success_ts = ?, dm_channel = ?, permalink = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(message.handle.as_str())
        .bind(message.success_handle.as_ref().map(|h| h.as_str()))
        .bind(&message.dm_channel)
        .bind(&message.permalink)
        .bind(to_millis(Utc::now()))
        .bind(id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::NotFound(format!("request {}", id)));
        }

        self.get(id).await
    }

    /// Replace editable fields and the reviewer list in one transaction
    pub async fn update_edit(&self, id: RequestId, edit: RequestEdit) -> Result<ReviewRequest> {
        let mut reviewers = edit.reviewers;
        herald_core::request::dedup_reviewers(&mut reviewers);

        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            r#"
            UPDATE requests
            SET title = ?, link = ?, ticket_link = ?, project = ?, kind = ?, priority = ?,
                merger_id = ?, merger_name = ?, merger_display_name = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&edit.title)
        .bind(&edit.link)
        .bind(&edit.ticket_link)
        .bind(&edit.project)
        .bind(edit.kind.as_str())
        .bind(edit.priority.as_str())
        .bind(&edit.merger.id)
        .bind(&edit.merger.name)
        .bind(&edit.merger.display_name)
        .bind(to_millis(Utc::now()))
        .bind(id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::NotFound(format!("request {}", id)));
        }

        sqlx::query("DELETE FROM request_reviewers WHERE request_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        for (position, reviewer) in reviewers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO request_reviewers (request_id, position, user_id, name, display_name, status)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.0)
            .bind(position as i64)
            .bind(&reviewer.user.id)
            .bind(&reviewer.user.name)
            .bind(&reviewer.user.display_name)
            .bind(reviewer.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get(id).await
    }

    /// Open requests created at or after the cutoff, newest first
    pub async fn list_open_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReviewRequest>> {
        let sql = format!(
            "SELECT {} FROM requests
             WHERE status NOT IN (?, ?, ?) AND created_at >= ?
             ORDER BY created_at DESC, id DESC",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(ReviewStatus::Merged.as_str())
            .bind(ReviewStatus::Declined.as_str())
            .bind(ReviewStatus::OnHold.as_str())
            .bind(to_millis(cutoff))
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }

    /// Requests created within `[start, end]`, optionally restricted by project
    pub async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        projects: &[String],
    ) -> Result<Vec<ReviewRequest>> {
        let projects: Vec<String> = projects
            .iter()
            .map(|p| herald_core::config::normalize_project(p))
            .collect();

        let filter = if projects.is_empty() {
            String::new()
        } else {
            format!(
                " AND LOWER(TRIM(project)) IN ({})",
                placeholders(projects.len())
            )
        };
        let sql = format!(
            "SELECT {} FROM requests
             WHERE created_at >= ? AND created_at <= ?{}
             ORDER BY created_at DESC, id DESC",
            REQUEST_COLUMNS, filter
        );

        let mut query = sqlx::query(&sql)
            .bind(to_millis(start))
            .bind(to_millis(end));
        for project in &projects {
            query = query.bind(project.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }
}

#[async_trait]
impl RequestRepository for SqliteRequestRepository {
    async fn find_by_id(&self, id: RequestId) -> herald_core::Result<Option<ReviewRequest>> {
        Ok(self.find(id).await?)
    }

    async fn find_by_message(
        &self,
        handle: &MessageHandle,
    ) -> herald_core::Result<Option<ReviewRequest>> {
        Ok(self.find_by_message_ts(handle.as_str()).await?)
    }

    async fn find_recent(&self, limit: usize) -> herald_core::Result<Vec<ReviewRequest>> {
        Ok(self.list_recent(limit).await?)
    }

    async fn create(&self, request: NewReviewRequest) -> herald_core::Result<ReviewRequest> {
        Ok(self.insert(request).await?)
    }

    async fn update_aggregate(
        &self,
        id: RequestId,
        update: AggregateUpdate,
    ) -> herald_core::Result<ReviewRequest> {
        Ok(self.update_fields(id, update).await?)
    }

    async fn update_reviewer_status(
        &self,
        id: RequestId,
        user_id: &str,
        status: ReviewStatus,
        reminder_count: Option<u32>,
    ) -> herald_core::Result<ReviewRequest> {
        Ok(self
            .update_reviewer(id, user_id, status, reminder_count)
            .await?)
    }

    async fn increment_reminder_count(&self, id: RequestId) -> herald_core::Result<ReviewRequest> {
        Ok(self.increment(id).await?)
    }

    async fn set_message(
        &self,
        id: RequestId,
        message: PublishedMessage,
    ) -> herald_core::Result<ReviewRequest> {
        Ok(self.update_message(id, message).await?)
    }

    async fn apply_edit(
        &self,
        id: RequestId,
        edit: RequestEdit,
    ) -> herald_core::Result<ReviewRequest> {
        Ok(self.update_edit(id, edit).await?)
    }

    async fn find_open_created_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> herald_core::Result<Vec<ReviewRequest>> {
        Ok(self.list_open_since(cutoff).await?)
    }

    async fn find_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        projects: &[String],
    ) -> herald_core::Result<Vec<ReviewRequest>> {
        Ok(self.list_created_between(start, end, projects).await?)
    }
}
