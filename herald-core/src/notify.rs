//! Notification dispatch resolver
//!
//! Maps a status transition to the stakeholder that must hear about it and the
//! message they receive. Reminder texts for the scheduled sweep live here too.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::request::{mention, ReviewStatus, User};

/// What a transition needs to tell a stakeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationIntent {
    AllApproved,
    NewComment,
    Declined,
    Merged,
}

impl fmt::Display for NotificationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationIntent::AllApproved => "all_approved",
            NotificationIntent::NewComment => "new_comment",
            NotificationIntent::Declined => "declined",
            NotificationIntent::Merged => "merged",
        };
        f.write_str(s)
    }
}

/// Decide which notification, if any, a requested status produces
pub fn resolve_intent(
    requested: ReviewStatus,
    has_total_approvals: bool,
) -> Option<NotificationIntent> {
    match requested {
        ReviewStatus::Approved if has_total_approvals => Some(NotificationIntent::AllApproved),
        ReviewStatus::Commented => Some(NotificationIntent::NewComment),
        ReviewStatus::Declined => Some(NotificationIntent::Declined),
        ReviewStatus::Merged => Some(NotificationIntent::Merged),
        _ => None,
    }
}

/// People a notification can be addressed to
#[derive(Debug, Clone, Copy)]
pub struct Stakeholders<'a> {
    pub author: &'a User,
    pub merger: &'a User,
    /// The user whose action triggered the notification
    pub actor: &'a User,
}

/// A rendered stakeholder notification, posted in the request's thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub intent: NotificationIntent,
    /// User id the notification is addressed to
    pub recipient: String,
    /// Plain text, used for push notifications and fallbacks
    pub text: String,
    /// Rich body with a mention header and quoted lines
    pub body: String,
    /// Ticket link attached to merge notifications
    pub ticket_link: Option<String>,
    /// Reviewer who can mark the comment as resolved
    pub resolvable_by: Option<String>,
}

/// Render the message for an intent
pub fn render_notification(
    intent: NotificationIntent,
    stakeholders: Stakeholders<'_>,
    ticket_link: &str,
) -> Notification {
    let author = stakeholders.author.mention();
    let merger = stakeholders.merger.mention();
    let reviewer = stakeholders.actor.handle();

    let (recipient, header, lines): (&User, String, Vec<String>) = match intent {
        NotificationIntent::AllApproved => (
            stakeholders.merger,
            merger,
            vec![
                "All reviewers have approved this pull request.".to_string(),
                "Please merge it if it looks good to you. Thanks Boss! :saluting_face:".to_string(),
            ],
        ),
        NotificationIntent::NewComment => (
            stakeholders.author,
            author,
            vec![
                format!("@{} has left a comment on your pull request.", reviewer),
                "Please attend to it. Thanks!".to_string(),
            ],
        ),
        NotificationIntent::Declined => (
            stakeholders.author,
            author,
            vec![
                "Unfortunately, your pull request has been declined. :pensive:".to_string(),
                "Please review the feedback and make the necessary changes. Thanks!".to_string(),
            ],
        ),
        NotificationIntent::Merged => (
            stakeholders.author,
            author,
            vec![
                "Your pull request has been merged. :rocket:".to_string(),
                "Don't forget to update the ticket status. Thanks!".to_string(),
            ],
        ),
    };

    let separator = if intent == NotificationIntent::NewComment {
        ", "
    } else {
        " "
    };
    let text = format!("{}{}{}", header, separator, lines.join(" "));

    Notification {
        intent,
        recipient: recipient.id.clone(),
        text,
        body: quoted(&header, &lines),
        ticket_link: (intent == NotificationIntent::Merged).then(|| ticket_link.to_string()),
        resolvable_by: (intent == NotificationIntent::NewComment)
            .then(|| stakeholders.actor.id.clone()),
    }
}

/// Rewrite a comment notification once the reviewer marks it resolved
pub fn render_resolved_comment(author: &User, reviewer: &User) -> Notification {
    let mut notification = render_notification(
        NotificationIntent::NewComment,
        Stakeholders {
            author,
            merger: author,
            actor: reviewer,
        },
        "",
    );
    let header = format!("{} - (Resolved :heavy_check_mark:)", author.mention());
    notification.body = quoted(
        &header,
        &[
            format!("@{} has left a comment on your pull request.", reviewer.handle()),
            "Please attend to it. Thanks!".to_string(),
        ],
    );
    notification.resolvable_by = None;
    notification
}

fn quoted(header: &str, lines: &[String]) -> String {
    let quoted: Vec<String> = lines.iter().map(|l| format!(">{}", l)).collect();
    format!("{}\n\n{}", header, quoted.join("\n"))
}

/// Who a reminder nudges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Comments are waiting on the author
    Author,
    /// Some reviewers have not approved yet
    Reviewers,
    /// Everyone approved; the merger should merge
    Merger,
}

impl ReminderKind {
    /// Merger reminders are never escalated
    pub fn can_escalate(&self) -> bool {
        !matches!(self, ReminderKind::Merger)
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReminderKind::Author => "author",
            ReminderKind::Reviewers => "reviewers",
            ReminderKind::Merger => "merger",
        };
        f.write_str(s)
    }
}

/// A rendered reminder, posted in the request's thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub kind: ReminderKind,
    pub recipients: Vec<String>,
    pub text: String,
    pub body: String,
    /// Escalation contact tagged on this reminder
    pub escalated_to: Option<String>,
}

/// Render a reminder; `escalate_to` is appended as a `cc:` mention
pub fn render_reminder(
    kind: ReminderKind,
    recipients: Vec<String>,
    escalate_to: Option<&str>,
) -> Reminder {
    let mentions = recipients
        .iter()
        .map(|id| mention(id))
        .collect::<Vec<_>>()
        .join(", ");

    let line = match kind {
        ReminderKind::Merger => "This is a soft reminder to review/merge the above pull request, as all reviewers have approved. Thanks!  :pray:",
        ReminderKind::Reviewers => "This is a soft reminder to review and update the above pull request. Thanks!  :pray:",
        ReminderKind::Author => "This is a soft reminder to attend to the comment(s) on your pull request. Thanks!  :pray:",
    };

    let mut text = format!("{} {}", mentions, line);
    let mut body = format!("{}\n\n>{}", mentions, line);

    let escalated_to = escalate_to.map(str::to_string);
    if let Some(contact) = &escalated_to {
        text.push_str(&format!(" cc: {}", mention(contact)));
        body.push_str(&format!("\n\n cc: {}", mention(contact)));
    }

    Reminder {
        kind,
        recipients,
        text,
        body,
        escalated_to,
    }
}
