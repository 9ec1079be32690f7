//! Submitting and editing review requests

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::ReviewDesk;
use crate::gateway::{FormView, MessageContent};
use crate::request::{
    ChangeKind, NewReviewRequest, Priority, PublishedMessage, RequestEdit, RequestId,
    ReviewRequest, Reviewer, User,
};
use crate::{Error, Result, ValidationErrors};

/// Shown when someone other than the author tries to edit
pub const NOT_THE_AUTHOR: &str = "Only the author of this pull request can edit it.";

/// Raw values from the submission or edit form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionForm {
    pub project: String,
    pub title: String,
    pub link: String,
    pub ticket: String,
    pub kind: String,
    pub priority: String,
    pub reviewers: Vec<String>,
    pub merger: Option<String>,
}

/// A form that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub project: String,
    pub title: String,
    pub link: String,
    pub ticket: String,
    pub kind: ChangeKind,
    pub priority: Priority,
    /// Reviewer ids, duplicates collapsed in first-seen order
    pub reviewers: Vec<String>,
    pub merger: String,
}

fn required(errors: &mut ValidationErrors, field: &'static str, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, "This field is required.");
        None
    } else {
        Some(value.to_string())
    }
}

fn web_url(errors: &mut ValidationErrors, field: &'static str, value: &str) -> Option<String> {
    let value = required(errors, field, value)?;
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
            Some(value)
        }
        _ => {
            errors.add(field, "Enter a valid http(s) link.");
            None
        }
    }
}

impl SubmissionForm {
    /// Check every field, collecting one error per offending field
    pub fn validate(&self) -> Result<ValidSubmission> {
        let mut errors = ValidationErrors::new();

        let project = required(&mut errors, "project", &self.project);
        let title = required(&mut errors, "title", &self.title);
        let link = web_url(&mut errors, "link", &self.link);
        let ticket = web_url(&mut errors, "ticket", &self.ticket);

        let kind = required(&mut errors, "kind", &self.kind).and_then(|k| match k.parse() {
            Ok(kind) => Some(kind),
            Err(_) => {
                errors.add("kind", "Select a valid change type.");
                None
            }
        });

        let priority = required(&mut errors, "priority", &self.priority).and_then(|p| {
            match p.parse() {
                Ok(priority) => Some(priority),
                Err(_) => {
                    errors.add("priority", "Select a valid priority.");
                    None
                }
            }
        });

        let mut reviewers: Vec<String> = Vec::new();
        for id in self.reviewers.iter().map(|r| r.trim()) {
            if !id.is_empty() && !reviewers.iter().any(|r| r == id) {
                reviewers.push(id.to_string());
            }
        }
        if reviewers.is_empty() {
            errors.add("reviewers", "Select at least one reviewer.");
        }

        let merger = required(&mut errors, "merger", self.merger.as_deref().unwrap_or(""));

        match (project, title, link, ticket, kind, priority, merger) {
            (
                Some(project),
                Some(title),
                Some(link),
                Some(ticket),
                Some(kind),
                Some(priority),
                Some(merger),
            ) if errors.is_empty() => Ok(ValidSubmission {
                project,
                title,
                link,
                ticket,
                kind,
                priority,
                reviewers,
                merger,
            }),
            _ => Err(Error::Validation(errors)),
        }
    }

    /// Pre-fill the form from a stored request
    pub fn from_request(request: &ReviewRequest) -> Self {
        Self {
            project: request.project.clone(),
            title: request.title.clone(),
            link: request.link.clone(),
            ticket: request.ticket_link.clone(),
            kind: request.kind.as_str().to_string(),
            priority: request.priority.as_str().to_string(),
            reviewers: request.reviewers.iter().map(|r| r.user.id.clone()).collect(),
            merger: Some(request.merger.id.clone()),
        }
    }
}

/// Result of asking to open a form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormOutcome {
    Opened,
    NotFound,
    NotTheAuthor,
}

impl ReviewDesk {
    async fn resolve_users(&self, ids: &[String]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            users.push(self.identities.resolve_user(id).await?);
        }
        Ok(users)
    }

    /// Validate, store and publish a new request
    pub async fn submit(&self, author_id: &str, form: &SubmissionForm) -> Result<ReviewRequest> {
        let valid = form.validate()?;

        let author = self.identities.resolve_user(author_id).await?;
        let merger = self.identities.resolve_user(&valid.merger).await?;
        let reviewers = self.resolve_users(&valid.reviewers).await?;

        let created = self
            .repository()
            .create(NewReviewRequest {
                title: valid.title,
                link: valid.link,
                ticket_link: valid.ticket,
                project: valid.project,
                kind: valid.kind,
                priority: valid.priority,
                author,
                merger,
                reviewers: reviewers.into_iter().map(Reviewer::pending).collect(),
            })
            .await?;

        info!(request_id = %created.id, author = author_id, reviewers = created.reviewers.len(), "Review request created");

        let card = self
            .gateway()
            .publish(self.channel(), &MessageContent::RequestCard(created.clone()), None)
            .await?;

        let permalink = match self.gateway().permalink(&card.channel, &card.handle).await {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(request_id = %created.id, error = %e, "Failed to fetch permalink");
                None
            }
        };

        let receipt = MessageContent::SubmissionReceipt {
            request: created.clone(),
            permalink: permalink.clone(),
            updated: false,
        };
        let receipt = match self.gateway().publish(&created.author.id, &receipt, None).await {
            Ok(posted) => Some(posted),
            Err(e) => {
                warn!(request_id = %created.id, error = %e, "Failed to send submission receipt");
                None
            }
        };

        let message = PublishedMessage {
            handle: card.handle,
            success_handle: receipt.as_ref().map(|r| r.handle.clone()),
            dm_channel: receipt.map(|r| r.channel),
            permalink,
        };

        self.repository().set_message(created.id, message).await
    }

    /// Replace a request's editable fields on behalf of its author
    pub async fn edit(
        &self,
        id: RequestId,
        editor_id: &str,
        form: &SubmissionForm,
    ) -> Result<ReviewRequest> {
        let valid = form.validate()?;

        let existing = self
            .repository()
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("request {}", id)))?;

        if existing.author.id != editor_id {
            warn!(request_id = %id, editor = editor_id, "Edit rejected: not the author");
            return Err(Error::Other(NOT_THE_AUTHOR.to_string()));
        }

        let merger = if valid.merger == existing.merger.id {
            existing.merger.clone()
        } else {
            self.identities.resolve_user(&valid.merger).await?
        };

        let unchanged = valid
            .reviewers
            .iter()
            .eq(existing.reviewers.iter().map(|r| &r.user.id));

        let reviewers = if unchanged {
            existing.reviewers.clone()
        } else {
            let mut reviewers = Vec::with_capacity(valid.reviewers.len());
            for reviewer_id in &valid.reviewers {
                match existing.reviewer(reviewer_id) {
                    Some(kept) => reviewers.push(kept.clone()),
                    None => {
                        let user = self.identities.resolve_user(reviewer_id).await?;
                        reviewers.push(Reviewer::pending(user));
                    }
                }
            }
            reviewers
        };

        let updated = self
            .repository()
            .apply_edit(
                id,
                RequestEdit {
                    title: valid.title,
                    link: valid.link,
                    ticket_link: valid.ticket,
                    project: valid.project,
                    kind: valid.kind,
                    priority: valid.priority,
                    merger,
                    reviewers,
                },
            )
            .await?;

        info!(request_id = %id, reviewers_changed = !unchanged, "Review request edited");

        let Some(message) = &updated.message else {
            debug!(request_id = %id, "Edited request was never published");
            return Ok(updated);
        };

        if let Err(e) = self
            .gateway()
            .update_message(
                self.channel(),
                &message.handle,
                &MessageContent::RequestCard(updated.clone()),
            )
            .await
        {
            warn!(request_id = %id, error = %e, "Failed to update request card");
        }

        if let (Some(dm), Some(receipt)) = (&message.dm_channel, &message.success_handle) {
            let content = MessageContent::SubmissionReceipt {
                request: updated.clone(),
                permalink: message.permalink.clone(),
                updated: true,
            };
            if let Err(e) = self.gateway().update_message(dm, receipt, &content).await {
                warn!(request_id = %id, error = %e, "Failed to update submission receipt");
            }
        }

        Ok(updated)
    }

    /// Open the empty submission form
    pub async fn open_submit_form(&self, user_id: &str, trigger_id: &str) -> Result<()> {
        self.gateway()
            .open_form(
                trigger_id,
                &FormView::Submit {
                    user_id: user_id.to_string(),
                },
            )
            .await
    }

    /// Open the edit form, pre-filled, for the request's author
    pub async fn open_edit_form(
        &self,
        id: RequestId,
        user_id: &str,
        trigger_id: &str,
    ) -> Result<FormOutcome> {
        let Some(request) = self.repository().find_by_id(id).await? else {
            warn!(request_id = %id, "Edit requested for unknown request");
            return Ok(FormOutcome::NotFound);
        };

        if request.author.id != user_id {
            self.gateway()
                .post_ephemeral(
                    self.channel(),
                    user_id,
                    NOT_THE_AUTHOR,
                    request.message_handle(),
                )
                .await?;
            return Ok(FormOutcome::NotTheAuthor);
        }

        self.gateway()
            .open_form(trigger_id, &FormView::Edit(request))
            .await?;
        Ok(FormOutcome::Opened)
    }
}
