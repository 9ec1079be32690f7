//! Block Kit rendering
//!
//! Turns `MessageContent` and `FormView` into the JSON bodies Slack expects.
//! Action and block ids defined here are what `interaction` parses back.

use serde_json::{json, Value};

use herald_core::workflow::SubmissionForm;
use herald_core::{
    ChangeKind, FormView, MessageContent, Notification, Priority, ReviewRequest, ReviewStatus,
};

/// Overflow menu on the request card
pub const STATUS_ACTION: &str = "update_review_status";
/// Edit button on the request card
pub const EDIT_ACTION: &str = "edit_submission";
/// "Mark as resolved" button on a comment notification
pub const COMMENT_RESOLVED_ACTION: &str = "comment_resolved";
/// Button that opens the submission form from a message
pub const SUBMIT_ACTION: &str = "submit_pull_request";
/// Link buttons; acknowledged and otherwise ignored
pub const VIEW_SUBMISSION_ACTION: &str = "view_submission";
pub const VIEW_TICKET_ACTION: &str = "view_ticket";

/// Modal callback ids
pub const SUBMIT_CALLBACK: &str = "submit_pr_modal";
pub const EDIT_CALLBACK: &str = "update_pr_modal";

/// Form block ids; each input uses the same id for its block and its action
pub mod fields {
    pub const PROJECT: &str = "project";
    pub const TITLE: &str = "title";
    pub const LINK: &str = "link";
    pub const TICKET: &str = "ticket";
    pub const KIND: &str = "kind";
    pub const PRIORITY: &str = "priority";
    pub const REVIEWERS: &str = "reviewers";
    pub const MERGER: &str = "merger";
}

/// Statuses offered in the card's overflow menu
pub const STATUS_CHOICES: [ReviewStatus; 6] = [
    ReviewStatus::Reviewing,
    ReviewStatus::Commented,
    ReviewStatus::Approved,
    ReviewStatus::Declined,
    ReviewStatus::Merged,
    ReviewStatus::OnHold,
];

fn mrkdwn(text: &str) -> Value {
    json!({ "type": "mrkdwn", "text": text })
}

fn plain(text: &str) -> Value {
    json!({ "type": "plain_text", "text": text, "emoji": true })
}

fn section(text: &str) -> Value {
    json!({ "type": "section", "text": mrkdwn(text) })
}

fn status_text(status: ReviewStatus) -> String {
    match status.emoji() {
        "" => status.label().to_string(),
        emoji => format!("{}  {}", emoji, status.label()),
    }
}

fn card_color(status: ReviewStatus) -> &'static str {
    match status {
        ReviewStatus::Approved | ReviewStatus::Merged => "#33a12f",
        ReviewStatus::Declined => "#e01e5a",
        ReviewStatus::Commented => "#ecb22e",
        ReviewStatus::OnHold => "#868686",
        ReviewStatus::Pending | ReviewStatus::Reviewing => "#1d9bd1",
    }
}

/// Short label for a ticket link: its last path segment
pub fn ticket_label(link: &str) -> &str {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(link)
}

fn reviewer_list(request: &ReviewRequest) -> String {
    request
        .reviewers
        .iter()
        .map(|r| match r.status.emoji() {
            "" => format!("`@{}`", r.user.handle()),
            emoji => format!("`@{}` {}", r.user.handle(), emoji),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// The request card, sent as an attachment so it carries a status color
pub fn request_card(request: &ReviewRequest) -> Value {
    let options: Vec<Value> = STATUS_CHOICES
        .iter()
        .map(|status| json!({ "text": plain(&status_text(*status)), "value": status.as_str() }))
        .collect();

    let header = format!(
        "@{} submitted a new pull request:\n*<{}|{}>*",
        request.author.handle(),
        request.link,
        request.display_title()
    );

    json!({
        "color": card_color(request.status),
        "fallback": MessageContent::RequestCard(request.clone()).fallback_text(),
        "blocks": [
            {
                "type": "section",
                "text": mrkdwn(&header),
                "accessory": {
                    "type": "overflow",
                    "action_id": STATUS_ACTION,
                    "options": options,
                }
            },
            {
                "type": "section",
                "fields": [
                    mrkdwn(&format!("*Project*\n{}", request.project)),
                    mrkdwn(&format!("*Type*\n{}", request.kind.label())),
                    mrkdwn(&format!("*Priority*\n{}", request.priority.label())),
                    mrkdwn(&format!("*Status*\n`{}`", request.status.label())),
                    mrkdwn(&format!(
                        "*Task*\n<{}|{}>",
                        request.ticket_link,
                        ticket_label(&request.ticket_link)
                    )),
                    mrkdwn(&format!("*Reviewers*\n{}", reviewer_list(request))),
                ]
            },
            {
                "type": "actions",
                "elements": [{
                    "type": "button",
                    "text": plain("Edit"),
                    "action_id": EDIT_ACTION,
                    "value": request.id.to_string(),
                }]
            },
            { "type": "divider" }
        ]
    })
}

fn receipt_blocks(request: &ReviewRequest, permalink: Option<&str>, updated: bool) -> Vec<Value> {
    let headline = if updated {
        "Your pull request has been successfully updated!"
    } else {
        "Your pull request has been successfully submitted!  :tada:"
    };

    let mut blocks = vec![
        section(headline),
        json!({
            "type": "rich_text",
            "elements": [{
                "type": "rich_text_quote",
                "elements": [{
                    "type": "text",
                    "text": request.display_title(),
                    "style": { "bold": true }
                }]
            }]
        }),
        section(
            "You'll receive updates on your pull request's progress as I follow up for you. \nHappy hacking! :star-struck:",
        ),
        json!({ "type": "divider" }),
    ];

    if let Some(url) = permalink {
        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": plain("View Pull Request"),
                "url": url,
                "action_id": VIEW_SUBMISSION_ACTION,
            }]
        }));
    }

    blocks
}

fn notification_blocks(notification: &Notification) -> Vec<Value> {
    let mut blocks = vec![section(&notification.body)];
    let mut buttons = Vec::new();

    if let Some(ticket) = &notification.ticket_link {
        buttons.push(json!({
            "type": "button",
            "text": plain("View Ticket"),
            "url": ticket,
            "action_id": VIEW_TICKET_ACTION,
        }));
    }
    if let Some(reviewer) = &notification.resolvable_by {
        buttons.push(json!({
            "type": "button",
            "text": plain("Mark as resolved"),
            "style": "primary",
            "action_id": COMMENT_RESOLVED_ACTION,
            "value": reviewer,
        }));
    }

    if !buttons.is_empty() {
        blocks.push(json!({ "type": "actions", "elements": buttons }));
    }
    blocks
}

/// Message body (without channel or thread) for a piece of content
pub fn message_payload(content: &MessageContent) -> Value {
    let text = content.fallback_text();
    match content {
        MessageContent::RequestCard(request) => json!({
            "text": text,
            "attachments": [request_card(request)],
        }),
        MessageContent::SubmissionReceipt {
            request,
            permalink,
            updated,
        } => json!({
            "text": text,
            "blocks": receipt_blocks(request, permalink.as_deref(), *updated),
        }),
        MessageContent::Notification(notification) => json!({
            "text": text,
            "blocks": notification_blocks(notification),
        }),
        MessageContent::Reminder(reminder) => json!({
            "text": text,
            "blocks": [section(&reminder.body)],
        }),
        MessageContent::ReportSummary(summary) => json!({
            "text": text,
            "blocks": [section(&summary.text())],
        }),
        MessageContent::ReportGroup(group) => json!({
            "text": text,
            "blocks": [section(&group.text())],
        }),
        MessageContent::Help { user_id } => json!({
            "text": text,
            "blocks": [section(&help_text(user_id))],
        }),
        MessageContent::SubmitPrompt => json!({
            "text": text,
            "blocks": submit_prompt_blocks(),
        }),
    }
}

fn submit_prompt_blocks() -> Vec<Value> {
    vec![
        section("Ready for review? Open the form to submit your pull request."),
        json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": plain("Submit a Pull Request"),
                "style": "primary",
                "action_id": SUBMIT_ACTION,
            }]
        }),
    ]
}

fn input(block_id: &str, label: &str, element: Value) -> Value {
    let mut element = element;
    element["action_id"] = json!(block_id);
    json!({
        "type": "input",
        "block_id": block_id,
        "label": plain(label),
        "element": element,
    })
}

fn text_input(kind: &str, placeholder: Option<&str>, initial: &str) -> Value {
    let mut element = json!({ "type": kind });
    if let Some(placeholder) = placeholder {
        element["placeholder"] = plain(placeholder);
    }
    if !initial.trim().is_empty() {
        element["initial_value"] = json!(initial);
    }
    element
}

fn select(placeholder: &str, options: Vec<(&str, &str)>, initial: Option<&str>) -> Value {
    let options: Vec<Value> = options
        .into_iter()
        .map(|(value, label)| json!({ "text": plain(label), "value": value }))
        .collect();
    let initial = initial.and_then(|value| {
        options
            .iter()
            .find(|option| option["value"] == json!(value))
            .cloned()
    });

    let mut element = json!({
        "type": "static_select",
        "placeholder": plain(placeholder),
        "options": options,
    });
    if let Some(option) = initial {
        element["initial_option"] = option;
    }
    element
}

fn form_blocks(user_id: &str, form: &SubmissionForm) -> Vec<Value> {
    let kind = form.kind.parse::<ChangeKind>().ok().map(|k| k.as_str());
    let priority = form.priority.parse::<Priority>().ok().map(|p| p.as_str());

    let mut reviewers = json!({
        "type": "multi_users_select",
        "placeholder": plain("Who will review this PR?"),
    });
    if !form.reviewers.is_empty() {
        reviewers["initial_users"] = json!(form.reviewers);
    }

    let mut merger = json!({
        "type": "users_select",
        "placeholder": plain("Who will merge this PR?"),
    });
    if let Some(id) = form.merger.as_deref().filter(|id| !id.is_empty()) {
        merger["initial_user"] = json!(id);
    }

    vec![
        section(&format!(
            ":wave:  Hey <@{}>,\n\nFill in the form below to submit a PR.",
            user_id
        )),
        input(
            fields::PROJECT,
            "Project",
            text_input("plain_text_input", Some("Ex: web"), &form.project),
        ),
        input(
            fields::TITLE,
            "Title",
            text_input(
                "plain_text_input",
                Some("Ex: Payment Integration..."),
                &form.title,
            ),
        ),
        input(fields::LINK, "Link", text_input("url_text_input", None, &form.link)),
        input(
            fields::TICKET,
            "Task Link (Jira)",
            text_input("url_text_input", None, &form.ticket),
        ),
        input(
            fields::KIND,
            "Type",
            select(
                "Select type...",
                ChangeKind::ALL.iter().map(|k| (k.as_str(), k.label())).collect(),
                kind,
            ),
        ),
        input(
            fields::PRIORITY,
            "Priority",
            select(
                "Select priority...",
                Priority::ALL.iter().map(|p| (p.as_str(), p.label())).collect(),
                priority,
            ),
        ),
        input(fields::REVIEWERS, "Reviewers", reviewers),
        input(fields::MERGER, "Merge manager", merger),
    ]
}

/// Modal view for a form
pub fn form_view(form: &FormView) -> Value {
    match form {
        FormView::Submit { user_id } => json!({
            "type": "modal",
            "callback_id": SUBMIT_CALLBACK,
            "title": plain("Herald"),
            "submit": plain("Submit"),
            "blocks": form_blocks(user_id, &SubmissionForm::default()),
        }),
        FormView::Edit(request) => json!({
            "type": "modal",
            "callback_id": EDIT_CALLBACK,
            "private_metadata": request.id.to_string(),
            "title": plain("Herald"),
            "submit": plain("Update"),
            "blocks": form_blocks(&request.author.id, &SubmissionForm::from_request(request)),
        }),
    }
}

/// Reply to a help request
pub fn help_text(user_id: &str) -> String {
    format!(
        "Hello <@{}> :sunglasses: I'm Herald, your pull request management assistant.\n\
         Use the submit command to open the submission form, then pick a status from the \
         card's menu as the review moves along.",
        user_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use herald_core::notify::{render_notification, render_reminder, ReminderKind, Stakeholders};
    use herald_core::{NotificationIntent, RequestId, Reviewer, User};

    fn request() -> ReviewRequest {
        let now = Utc::now();
        ReviewRequest {
            id: RequestId(42),
            title: "payment integration".to_string(),
            link: "https://git.example.com/mr/7".to_string(),
            ticket_link: "https://jira.example.com/browse/PAY-12/".to_string(),
            project: "web".to_string(),
            kind: ChangeKind::Feature,
            priority: Priority::High,
            author: User::new("UAUTHOR", "ada").with_display_name("Ada"),
            merger: User::new("UMERGER", "grace"),
            reviewers: vec![
                Reviewer {
                    user: User::new("UR1", "linus"),
                    status: ReviewStatus::Approved,
                },
                Reviewer::pending(User::new("UR2", "ken")),
            ],
            status: ReviewStatus::Pending,
            reminder_count: 0,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_ticket_label() {
        assert_eq!(ticket_label("https://jira.example.com/browse/PAY-12/"), "PAY-12");
        assert_eq!(ticket_label("PAY-1"), "PAY-1");
    }

    #[test]
    fn test_request_card_layout() {
        let payload = message_payload(&MessageContent::RequestCard(request()));
        assert_eq!(
            payload["text"],
            "@Ada submitted a new pull request: Payment integration"
        );

        let card = &payload["attachments"][0];
        assert_eq!(card["color"], "#1d9bd1");
        let header = &card["blocks"][0];
        assert_eq!(
            header["text"]["text"],
            "@Ada submitted a new pull request:\n*<https://git.example.com/mr/7|Payment integration>*"
        );
        assert_eq!(header["accessory"]["action_id"], STATUS_ACTION);
        assert_eq!(
            header["accessory"]["options"].as_array().unwrap().len(),
            STATUS_CHOICES.len()
        );

        let fields = &card["blocks"][1]["fields"];
        assert_eq!(fields[1]["text"], "*Type*\nFeature :sparkles:");
        assert_eq!(fields[3]["text"], "*Status*\n`Pending`");
        assert_eq!(
            fields[4]["text"],
            "*Task*\n<https://jira.example.com/browse/PAY-12/|PAY-12>"
        );
        assert_eq!(
            fields[5]["text"],
            "*Reviewers*\n`@linus` :white_check_mark:, `@ken`"
        );

        let edit = &card["blocks"][2]["elements"][0];
        assert_eq!(edit["action_id"], EDIT_ACTION);
        assert_eq!(edit["value"], "42");
    }

    #[test]
    fn test_comment_notification_has_resolve_button() {
        let pr = request();
        let reviewer = pr.reviewers[1].user.clone();
        let notification = render_notification(
            NotificationIntent::NewComment,
            Stakeholders {
                author: &pr.author,
                merger: &pr.merger,
                actor: &reviewer,
            },
            &pr.ticket_link,
        );
        let payload = message_payload(&MessageContent::Notification(notification.clone()));

        assert_eq!(payload["text"], notification.text.as_str());
        assert_eq!(payload["blocks"][0]["text"]["text"], notification.body.as_str());
        let button = &payload["blocks"][1]["elements"][0];
        assert_eq!(button["action_id"], COMMENT_RESOLVED_ACTION);
        assert_eq!(button["value"], "UR2");
    }

    #[test]
    fn test_merged_notification_links_ticket() {
        let pr = request();
        let notification = render_notification(
            NotificationIntent::Merged,
            Stakeholders {
                author: &pr.author,
                merger: &pr.merger,
                actor: &pr.merger,
            },
            &pr.ticket_link,
        );
        let payload = message_payload(&MessageContent::Notification(notification));
        let buttons = payload["blocks"][1]["elements"].as_array().unwrap();
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0]["url"], "https://jira.example.com/browse/PAY-12/");
    }

    #[test]
    fn test_reminder_is_a_single_section() {
        let reminder = render_reminder(ReminderKind::Merger, vec!["UMERGER".to_string()], None);
        let payload = message_payload(&MessageContent::Reminder(reminder.clone()));
        assert_eq!(payload["blocks"].as_array().unwrap().len(), 1);
        assert_eq!(payload["blocks"][0]["text"]["text"], reminder.body.as_str());
    }

    #[test]
    fn test_receipt_without_permalink_has_no_button() {
        let payload = message_payload(&MessageContent::SubmissionReceipt {
            request: request(),
            permalink: None,
            updated: true,
        });
        assert_eq!(payload["text"], "Your pull request has been successfully updated!");
        let blocks = payload["blocks"].as_array().unwrap();
        assert!(blocks.iter().all(|b| b["type"] != "actions"));
    }

    #[test]
    fn test_edit_form_is_prefilled() {
        let view = form_view(&FormView::Edit(request()));
        assert_eq!(view["callback_id"], EDIT_CALLBACK);
        assert_eq!(view["private_metadata"], "42");

        let blocks = view["blocks"].as_array().unwrap();
        let block = |id: &str| {
            blocks
                .iter()
                .find(|b| b["block_id"] == id)
                .cloned()
                .unwrap()
        };
        assert_eq!(block(fields::TITLE)["element"]["initial_value"], "payment integration");
        assert_eq!(block(fields::TITLE)["element"]["action_id"], fields::TITLE);
        assert_eq!(
            block(fields::KIND)["element"]["initial_option"]["value"],
            "feature"
        );
        assert_eq!(
            block(fields::REVIEWERS)["element"]["initial_users"],
            json!(["UR1", "UR2"])
        );
        assert_eq!(block(fields::MERGER)["element"]["initial_user"], "UMERGER");
    }

    #[test]
    fn test_submit_form_is_empty() {
        let view = form_view(&FormView::Submit {
            user_id: "UAUTHOR".to_string(),
        });
        assert_eq!(view["callback_id"], SUBMIT_CALLBACK);
        assert!(view.get("private_metadata").is_none());

        let blocks = view["blocks"].as_array().unwrap();
        assert!(blocks[0]["text"]["text"]
            .as_str()
            .unwrap()
            .contains("<@UAUTHOR>"));
        assert!(blocks
            .iter()
            .filter(|b| b["type"] == "input")
            .all(|b| b["element"].get("initial_value").is_none()
                && b["element"].get("initial_option").is_none()));
    }

    #[test]
    fn test_submit_prompt_carries_submit_button() {
        let payload = message_payload(&MessageContent::SubmitPrompt);
        assert_eq!(payload["text"], "Submit a Pull Request");
        let button = &payload["blocks"][1]["elements"][0];
        assert_eq!(button["type"], "button");
        assert_eq!(button["action_id"], SUBMIT_ACTION);
    }

    #[test]
    fn test_help_payload_mentions_user() {
        let payload = message_payload(&MessageContent::Help {
            user_id: "U1".to_string(),
        });
        assert!(payload["text"].as_str().unwrap().contains("<@U1>"));
        assert!(payload["blocks"][0]["text"]["text"]
            .as_str()
            .unwrap()
            .contains("<@U1>"));
    }
}
