//! Inbound interaction payloads
//!
//! Slack posts block actions and view submissions as a form field named
//! `payload` holding JSON, and slash commands as plain form fields. Both are
//! parsed into `InteractionEvent`s here so the server never touches raw JSON.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value};

use herald_core::workflow::SubmissionForm;
use herald_core::{MessageHandle, RequestId, ReviewStatus, ValidationErrors};

use crate::blocks::{
    fields, COMMENT_RESOLVED_ACTION, EDIT_ACTION, EDIT_CALLBACK, STATUS_ACTION, SUBMIT_ACTION,
    SUBMIT_CALLBACK, VIEW_SUBMISSION_ACTION, VIEW_TICKET_ACTION,
};
use crate::{Error, Result};

/// Something a user did in Slack
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionEvent {
    /// A status was picked from a request card's menu
    StatusUpdate {
        user_id: String,
        card: MessageHandle,
        status: ReviewStatus,
    },
    /// "Mark as resolved" was pressed on a comment notification
    CommentResolved {
        user_id: String,
        card: MessageHandle,
        notification: MessageHandle,
        reviewer_id: String,
    },
    /// The edit button on a request card
    EditRequested {
        user_id: String,
        request_id: RequestId,
        trigger_id: String,
    },
    /// The user asked for the submission form
    SubmitRequested { user_id: String, trigger_id: String },
    /// A submission or edit form was sent; `edit_of` is set for edits
    FormSubmitted {
        user_id: String,
        form: SubmissionForm,
        edit_of: Option<RequestId>,
    },
    /// The user asked for help
    HelpRequested { user_id: String, channel_id: String },
    /// Acknowledged with no further work (link buttons, unknown actions)
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action_id: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    selected_option: Option<RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInput {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    selected_option: Option<RawOption>,
    #[serde(default)]
    selected_user: Option<String>,
    #[serde(default)]
    selected_users: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawState {
    #[serde(default)]
    values: HashMap<String, HashMap<String, RawInput>>,
}

#[derive(Debug, Deserialize)]
struct RawView {
    callback_id: String,
    #[serde(default)]
    private_metadata: String,
    #[serde(default)]
    state: RawState,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(rename = "type")]
    kind: String,
    user: RawUser,
    #[serde(default)]
    trigger_id: Option<String>,
    #[serde(default)]
    actions: Vec<RawAction>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    view: Option<RawView>,
}

impl RawState {
    fn input(&self, block_id: &str) -> Option<&RawInput> {
        self.values
            .get(block_id)
            .and_then(|actions| actions.get(block_id).or_else(|| actions.values().next()))
    }

    fn text(&self, block_id: &str) -> String {
        self.input(block_id)
            .and_then(|input| {
                input
                    .value
                    .clone()
                    .or_else(|| input.selected_option.as_ref().map(|o| o.value.clone()))
            })
            .unwrap_or_default()
    }

    fn to_form(&self) -> SubmissionForm {
        SubmissionForm {
            project: self.text(fields::PROJECT),
            title: self.text(fields::TITLE),
            link: self.text(fields::LINK),
            ticket: self.text(fields::TICKET),
            kind: self.text(fields::KIND),
            priority: self.text(fields::PRIORITY),
            reviewers: self
                .input(fields::REVIEWERS)
                .and_then(|input| input.selected_users.clone())
                .unwrap_or_default(),
            merger: self
                .input(fields::MERGER)
                .and_then(|input| input.selected_user.clone()),
        }
    }
}

fn require<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| Error::Payload(format!("missing {}", what)))
}

/// Parse the JSON carried in an interaction's `payload` field
pub fn parse_interaction(payload: &str) -> Result<InteractionEvent> {
    let raw: RawPayload = serde_json::from_str(payload)?;
    let user_id = raw.user.id;

    match raw.kind.as_str() {
        "block_actions" => {
            let Some(action) = raw.actions.into_iter().next() else {
                return Ok(InteractionEvent::Ignored("block action without actions".to_string()));
            };

            match action.action_id.as_str() {
                STATUS_ACTION => {
                    let message = require(raw.message, "message")?;
                    let selected = require(action.selected_option, "selected option")?;
                    let status = selected
                        .value
                        .parse()
                        .map_err(|_| Error::Payload(format!("unknown status: {}", selected.value)))?;
                    Ok(InteractionEvent::StatusUpdate {
                        user_id,
                        card: MessageHandle::new(message.ts),
                        status,
                    })
                }
                COMMENT_RESOLVED_ACTION => {
                    let message = require(raw.message, "message")?;
                    let card = require(message.thread_ts, "thread of the notification")?;
                    Ok(InteractionEvent::CommentResolved {
                        user_id,
                        card: MessageHandle::new(card),
                        notification: MessageHandle::new(message.ts),
                        reviewer_id: require(action.value, "reviewer id")?,
                    })
                }
                EDIT_ACTION => {
                    let value = require(action.value, "request id")?;
                    let request_id = value
                        .parse()
                        .map_err(|_| Error::Payload(format!("invalid request id: {}", value)))?;
                    Ok(InteractionEvent::EditRequested {
                        user_id,
                        request_id,
                        trigger_id: require(raw.trigger_id, "trigger id")?,
                    })
                }
                SUBMIT_ACTION => Ok(InteractionEvent::SubmitRequested {
                    user_id,
                    trigger_id: require(raw.trigger_id, "trigger id")?,
                }),
                VIEW_SUBMISSION_ACTION | VIEW_TICKET_ACTION => {
                    Ok(InteractionEvent::Ignored(action.action_id))
                }
                other => Ok(InteractionEvent::Ignored(format!("unknown action {}", other))),
            }
        }
        "view_submission" => {
            let view = require(raw.view, "view")?;
            let edit_of = match view.callback_id.as_str() {
                SUBMIT_CALLBACK => None,
                EDIT_CALLBACK => Some(view.private_metadata.trim().parse().map_err(|_| {
                    Error::Payload(format!(
                        "invalid request id in edit form: {:?}",
                        view.private_metadata
                    ))
                })?),
                other => {
                    return Ok(InteractionEvent::Ignored(format!("unknown view {}", other)))
                }
            };

            Ok(InteractionEvent::FormSubmitted {
                user_id,
                form: view.state.to_form(),
                edit_of,
            })
        }
        other => Ok(InteractionEvent::Ignored(format!("unhandled payload {}", other))),
    }
}

/// Form fields of a slash command request
#[derive(Debug, Clone, Deserialize)]
pub struct SlashCommand {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub trigger_id: String,
}

impl SlashCommand {
    /// `help` asks for help; anything else opens the submission form
    pub fn into_event(self) -> InteractionEvent {
        if self.text.trim().eq_ignore_ascii_case("help") {
            InteractionEvent::HelpRequested {
                user_id: self.user_id,
                channel_id: self.channel_id,
            }
        } else {
            InteractionEvent::SubmitRequested {
                user_id: self.user_id,
                trigger_id: self.trigger_id,
            }
        }
    }
}

/// `response_action: errors` body for a rejected form
///
/// Field names double as block ids, so each error lands under its input.
pub fn validation_response(errors: &ValidationErrors) -> Value {
    let errors: serde_json::Map<String, Value> = errors
        .iter()
        .map(|e| (e.field.to_string(), json!(e.message)))
        .collect();
    json!({ "response_action": "errors", "errors": errors })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_payload(value: &str) -> String {
        json!({
            "type": "block_actions",
            "user": { "id": "UR1", "name": "linus" },
            "trigger_id": "trigger-1",
            "message": { "ts": "1700000000.000100" },
            "actions": [{
                "action_id": STATUS_ACTION,
                "type": "overflow",
                "selected_option": { "value": value, "text": { "type": "plain_text", "text": "x" } }
            }]
        })
        .to_string()
    }

    #[test]
    fn test_parse_status_update() {
        let event = parse_interaction(&status_payload("on_hold")).unwrap();
        assert_eq!(
            event,
            InteractionEvent::StatusUpdate {
                user_id: "UR1".to_string(),
                card: MessageHandle::new("1700000000.000100"),
                status: ReviewStatus::OnHold,
            }
        );
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(matches!(
            parse_interaction(&status_payload("shipped")),
            Err(Error::Payload(_))
        ));
    }

    #[test]
    fn test_parse_comment_resolved() {
        let payload = json!({
            "type": "block_actions",
            "user": { "id": "UAUTHOR" },
            "message": { "ts": "1700000000.000300", "thread_ts": "1700000000.000100" },
            "actions": [{ "action_id": COMMENT_RESOLVED_ACTION, "value": "UR2" }]
        });
        let event = parse_interaction(&payload.to_string()).unwrap();
        assert_eq!(
            event,
            InteractionEvent::CommentResolved {
                user_id: "UAUTHOR".to_string(),
                card: MessageHandle::new("1700000000.000100"),
                notification: MessageHandle::new("1700000000.000300"),
                reviewer_id: "UR2".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_edit_requested() {
        let payload = json!({
            "type": "block_actions",
            "user": { "id": "UAUTHOR" },
            "trigger_id": "trigger-9",
            "message": { "ts": "1700000000.000100" },
            "actions": [{ "action_id": EDIT_ACTION, "value": "17" }]
        });
        assert_eq!(
            parse_interaction(&payload.to_string()).unwrap(),
            InteractionEvent::EditRequested {
                user_id: "UAUTHOR".to_string(),
                request_id: RequestId(17),
                trigger_id: "trigger-9".to_string(),
            }
        );
    }

    #[test]
    fn test_link_buttons_are_ignored() {
        let payload = json!({
            "type": "block_actions",
            "user": { "id": "U1" },
            "actions": [{ "action_id": VIEW_TICKET_ACTION }]
        });
        assert!(matches!(
            parse_interaction(&payload.to_string()).unwrap(),
            InteractionEvent::Ignored(_)
        ));
    }

    fn form_state() -> Value {
        json!({
            "values": {
                "project": { "project": { "type": "plain_text_input", "value": "web" } },
                "title": { "title": { "type": "plain_text_input", "value": "Payment integration" } },
                "link": { "link": { "type": "url_text_input", "value": "https://git.example.com/mr/1" } },
                "ticket": { "ticket": { "type": "url_text_input", "value": null } },
                "kind": { "kind": { "type": "static_select", "selected_option": { "value": "bugfix" } } },
                "priority": { "priority": { "type": "static_select", "selected_option": null } },
                "reviewers": { "reviewers": { "type": "multi_users_select", "selected_users": ["UR1", "UR2"] } },
                "merger": { "merger": { "type": "users_select", "selected_user": "UMERGER" } }
            }
        })
    }

    #[test]
    fn test_parse_submission_form() {
        let payload = json!({
            "type": "view_submission",
            "user": { "id": "UAUTHOR" },
            "view": { "callback_id": SUBMIT_CALLBACK, "private_metadata": "", "state": form_state() }
        });
        let InteractionEvent::FormSubmitted {
            user_id,
            form,
            edit_of,
        } = parse_interaction(&payload.to_string()).unwrap()
        else {
            panic!("expected a form submission");
        };

        assert_eq!(user_id, "UAUTHOR");
        assert_eq!(edit_of, None);
        assert_eq!(form.project, "web");
        assert_eq!(form.kind, "bugfix");
        assert_eq!(form.ticket, "");
        assert_eq!(form.priority, "");
        assert_eq!(form.reviewers, vec!["UR1".to_string(), "UR2".to_string()]);
        assert_eq!(form.merger.as_deref(), Some("UMERGER"));

        let errors = match form.validate() {
            Err(herald_core::Error::Validation(errors)) => errors,
            other => panic!("expected validation errors, got {:?}", other),
        };
        let response = validation_response(&errors);
        assert_eq!(response["response_action"], "errors");
        assert!(response["errors"]["ticket"].is_string());
        assert!(response["errors"]["priority"].is_string());
        assert!(response["errors"].get("title").is_none());
    }

    #[test]
    fn test_parse_edit_form_requires_request_id() {
        let payload = json!({
            "type": "view_submission",
            "user": { "id": "UAUTHOR" },
            "view": { "callback_id": EDIT_CALLBACK, "private_metadata": "5", "state": form_state() }
        });
        assert!(matches!(
            parse_interaction(&payload.to_string()).unwrap(),
            InteractionEvent::FormSubmitted { edit_of: Some(RequestId(5)), .. }
        ));

        let payload = json!({
            "type": "view_submission",
            "user": { "id": "UAUTHOR" },
            "view": { "callback_id": EDIT_CALLBACK, "private_metadata": "", "state": form_state() }
        });
        assert!(parse_interaction(&payload.to_string()).is_err());
    }

    #[test]
    fn test_slash_command_events() {
        let command = SlashCommand {
            command: "/submit-pr".to_string(),
            text: String::new(),
            user_id: "UAUTHOR".to_string(),
            channel_id: "C1".to_string(),
            trigger_id: "trigger-3".to_string(),
        };
        assert_eq!(
            command.clone().into_event(),
            InteractionEvent::SubmitRequested {
                user_id: "UAUTHOR".to_string(),
                trigger_id: "trigger-3".to_string(),
            }
        );

        let help = SlashCommand {
            text: " Help ".to_string(),
            ..command
        };
        assert!(matches!(
            help.into_event(),
            InteractionEvent::HelpRequested { .. }
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_interaction("{"), Err(Error::Json(_))));
    }
}
