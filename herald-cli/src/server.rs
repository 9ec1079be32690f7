//! Slack webhook server
//!
//! Slack expects an answer within three seconds, so handlers verify and parse
//! the request, reply at once, and run the workflow on a spawned task. Form
//! submissions are the exception: validation runs inline so field errors can
//! be returned in the response body.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use herald_core::{Error, ReviewDesk};
use herald_slack::blocks::help_text;
use herald_slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use herald_slack::{
    parse_event, parse_interaction, validation_response, verify_signature, InteractionEvent,
    SlackEvent, SlashCommand,
};

/// Largest request body read for signature verification
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<ReviewDesk>,
    pub signing_secret: Arc<str>,
}

impl AppState {
    pub fn new(desk: ReviewDesk, signing_secret: impl Into<Arc<str>>) -> Self {
        Self {
            desk: Arc::new(desk),
            signing_secret: signing_secret.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slack/actions", post(actions_handler))
        .route("/slack/commands", post(commands_handler))
        .route("/slack/events", post(events_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_slack_signature,
        ))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reject requests that are not signed with the workspace's signing secret
async fn verify_slack_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let (Some(timestamp), Some(signature)) = (
        header(&parts.headers, TIMESTAMP_HEADER),
        header(&parts.headers, SIGNATURE_HEADER),
    ) else {
        warn!(path = %parts.uri.path(), "Unsigned request rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if let Err(e) = verify_signature(
        &state.signing_secret,
        timestamp,
        &bytes,
        signature,
        Utc::now().timestamp(),
    ) {
        warn!(path = %parts.uri.path(), error = %e, "Request signature rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[derive(Debug, Deserialize)]
struct ActionForm {
    payload: String,
}

async fn actions_handler(State(state): State<AppState>, Form(form): Form<ActionForm>) -> Response {
    let event = match parse_interaction(&form.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Unreadable interaction payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if let InteractionEvent::FormSubmitted { form, .. } = &event {
        match form.validate() {
            Ok(_) => {}
            Err(Error::Validation(errors)) => {
                debug!(errors = %errors, "Form rejected");
                return Json(validation_response(&errors)).into_response();
            }
            Err(e) => {
                error!(error = %e, "Form validation failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    spawn_dispatch(state.desk.clone(), event);
    StatusCode::OK.into_response()
}

async fn commands_handler(
    State(state): State<AppState>,
    Form(command): Form<SlashCommand>,
) -> Response {
    info!(command = %command.command, user = %command.user_id, "Slash command");

    match command.into_event() {
        InteractionEvent::HelpRequested { user_id, .. } => Json(json!({
            "response_type": "ephemeral",
            "text": help_text(&user_id),
        }))
        .into_response(),
        event => {
            spawn_dispatch(state.desk.clone(), event);
            StatusCode::OK.into_response()
        }
    }
}

async fn events_handler(State(state): State<AppState>, body: String) -> Response {
    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Unreadable event callback");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let desk = state.desk.clone();
    match event {
        SlackEvent::UrlVerification { challenge } => {
            info!("Events endpoint verified");
            return Json(json!({ "challenge": challenge })).into_response();
        }
        SlackEvent::Mention {
            user_id,
            channel,
            message,
        } => {
            tokio::spawn(async move {
                if let Err(e) = desk.reply_to_mention(&channel, &user_id, &message).await {
                    error!(error = %e, channel = %channel, "Mention reply failed");
                }
            });
        }
        SlackEvent::DirectMessage {
            user_id,
            channel,
            text,
        } => {
            tokio::spawn(async move {
                if let Err(e) = desk.reply_to_direct_message(&channel, &user_id, &text).await {
                    error!(error = %e, channel = %channel, "Direct message reply failed");
                }
            });
        }
        SlackEvent::Ignored(reason) => {
            debug!(reason = %reason, "Event ignored");
        }
    }

    StatusCode::OK.into_response()
}

fn spawn_dispatch(desk: Arc<ReviewDesk>, event: InteractionEvent) {
    tokio::spawn(async move {
        if let Err(e) = dispatch(&desk, event).await {
            error!(error = %e, "Interaction failed");
        }
    });
}

/// Run the workflow operation an interaction asks for
pub async fn dispatch(desk: &ReviewDesk, event: InteractionEvent) -> herald_core::Result<()> {
    match event {
        InteractionEvent::StatusUpdate {
            user_id,
            card,
            status,
        } => {
            let outcome = desk.handle_status_action(&card, &user_id, status).await?;
            debug!(updated = outcome.is_updated(), "Status action handled");
        }
        InteractionEvent::CommentResolved {
            user_id,
            card,
            notification,
            reviewer_id,
        } => {
            desk.resolve_comment(&card, &notification, &user_id, &reviewer_id)
                .await?;
        }
        InteractionEvent::EditRequested {
            user_id,
            request_id,
            trigger_id,
        } => {
            desk.open_edit_form(request_id, &user_id, &trigger_id)
                .await?;
        }
        InteractionEvent::SubmitRequested {
            user_id,
            trigger_id,
        } => {
            desk.open_submit_form(&user_id, &trigger_id).await?;
        }
        InteractionEvent::FormSubmitted {
            user_id,
            form,
            edit_of: Some(id),
        } => {
            desk.edit(id, &user_id, &form).await?;
        }
        InteractionEvent::FormSubmitted {
            user_id,
            form,
            edit_of: None,
        } => {
            let request = desk.submit(&user_id, &form).await?;
            info!(request_id = %request.id, "Review request submitted");
        }
        InteractionEvent::HelpRequested { user_id, .. } => {
            debug!(user = %user_id, "Help answered inline");
        }
        InteractionEvent::Ignored(reason) => {
            debug!(reason = %reason, "Interaction ignored");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::http::Request as HttpRequest;
    use herald_core::{
        ChangeKind, DeskSettings, FormView, IdentityResolver, InMemoryRepository, MessageContent,
        MessageHandle, NotificationGateway, PostedMessage, Priority, PublishedMessage, RequestId,
        RequestRepository, ReviewRequest, ReviewStatus, Reviewer, User,
    };
    use herald_slack::signature::compute_signature;
    use tower::ServiceExt;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    #[derive(Default)]
    struct QuietSlack {
        forms: Mutex<Vec<String>>,
        published: Mutex<Vec<(String, MessageContent, Option<MessageHandle>)>>,
        ephemerals: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl NotificationGateway for QuietSlack {
        async fn publish(
            &self,
            channel: &str,
            content: &MessageContent,
            thread: Option<&MessageHandle>,
        ) -> herald_core::Result<PostedMessage> {
            self.published.lock().unwrap().push((
                channel.to_string(),
                content.clone(),
                thread.cloned(),
            ));
            Ok(PostedMessage {
                channel: channel.to_string(),
                handle: MessageHandle::new("1700000000.000100"),
            })
        }

        async fn update_message(
            &self,
            _channel: &str,
            _handle: &MessageHandle,
            _content: &MessageContent,
        ) -> herald_core::Result<()> {
            Ok(())
        }

        async fn post_ephemeral(
            &self,
            _channel: &str,
            user_id: &str,
            text: &str,
            _thread: Option<&MessageHandle>,
        ) -> herald_core::Result<()> {
            self.ephemerals
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn permalink(
            &self,
            _channel: &str,
            handle: &MessageHandle,
        ) -> herald_core::Result<String> {
            Ok(format!("https://example.slack.com/archives/C1/p{}", handle))
        }

        async fn open_form(&self, trigger_id: &str, _form: &FormView) -> herald_core::Result<()> {
            self.forms.lock().unwrap().push(trigger_id.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl IdentityResolver for QuietSlack {
        async fn resolve_user(&self, user_id: &str) -> herald_core::Result<User> {
            Ok(User::new(user_id, user_id.to_lowercase()))
        }
    }

    fn test_desk(repo: Arc<InMemoryRepository>) -> (ReviewDesk, Arc<QuietSlack>) {
        let slack = Arc::new(QuietSlack::default());
        let desk = ReviewDesk::new(
            repo,
            slack.clone(),
            slack.clone(),
            DeskSettings::new("C-REVIEWS"),
        );
        (desk, slack)
    }

    fn test_app() -> (Router, Arc<QuietSlack>) {
        let (desk, slack) = test_desk(Arc::new(InMemoryRepository::new()));
        (router(AppState::new(desk, SECRET)), slack)
    }

    fn commented_request() -> ReviewRequest {
        let now = Utc::now();
        ReviewRequest {
            id: RequestId(1),
            title: "payment integration".to_string(),
            link: "https://git.example.com/mr/1".to_string(),
            ticket_link: "https://jira.example.com/PAY-1".to_string(),
            project: "web".to_string(),
            kind: ChangeKind::Feature,
            priority: Priority::High,
            author: User::new("AUTHOR", "author"),
            merger: User::new("MERGER", "merger"),
            reviewers: vec![Reviewer {
                user: User::new("R1", "r1"),
                status: ReviewStatus::Commented,
            }],
            status: ReviewStatus::Pending,
            reminder_count: 4,
            message: Some(PublishedMessage {
                handle: MessageHandle::new(CARD_TS),
                success_handle: None,
                dm_channel: None,
                permalink: None,
            }),
            created_at: now,
            updated_at: now,
        }
    }

    const CARD_TS: &str = "1700000000.000100";

    async fn wait_for(slack: &QuietSlack, published: usize) {
        for _ in 0..50 {
            if slack.published.lock().unwrap().len() >= published {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    fn form_body(pairs: &[(&str, &str)]) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
    }

    fn signed_post(path: &str, body: String) -> HttpRequest<Body> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = compute_signature(SECRET, &timestamp, body.as_bytes()).unwrap();
        HttpRequest::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/x-www-form-urlencoded")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), MAX_BODY_BYTES).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_signature() {
        let (app, _) = test_app();
        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unsigned_request_rejected() {
        let (app, _) = test_app();
        let body = form_body(&[("payload", "{}")]);
        let response = app
            .oneshot(
                HttpRequest::post("/slack/actions")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tampered_body_rejected() {
        let (app, _) = test_app();
        let mut request = signed_post("/slack/commands", form_body(&[("text", "help")]));
        *request.body_mut() = Body::from(form_body(&[("text", "other")]));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stale_timestamp_rejected() {
        let (app, _) = test_app();
        let body = form_body(&[("command", "/review"), ("user_id", "U1")]);
        let timestamp = (Utc::now().timestamp() - 600).to_string();
        let signature = compute_signature(SECRET, &timestamp, body.as_bytes()).unwrap();
        let request = HttpRequest::post("/slack/commands")
            .header("content-type", "application/x-www-form-urlencoded")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_help_command_answers_inline() {
        let (app, _) = test_app();
        let body = form_body(&[
            ("command", "/review"),
            ("text", "help"),
            ("user_id", "U1"),
            ("channel_id", "C1"),
        ]);
        let response = app
            .oneshot(signed_post("/slack/commands", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["response_type"], "ephemeral");
        assert!(json["text"].as_str().unwrap().contains("<@U1>"));
    }

    #[tokio::test]
    async fn test_command_opens_submit_form() {
        let (app, slack) = test_app();
        let body = form_body(&[
            ("command", "/review"),
            ("text", ""),
            ("user_id", "U1"),
            ("trigger_id", "trigger-9"),
        ]);
        let response = app
            .oneshot(signed_post("/slack/commands", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        for _ in 0..50 {
            if !slack.forms.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(*slack.forms.lock().unwrap(), vec!["trigger-9".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_form_returns_field_errors() {
        let (app, _) = test_app();
        let payload = json!({
            "type": "view_submission",
            "user": { "id": "U1" },
            "view": {
                "callback_id": herald_slack::blocks::SUBMIT_CALLBACK,
                "private_metadata": "",
                "state": { "values": {
                    "title": { "title": { "value": "Add retries" } },
                    "link": { "link": { "value": "not a link" } }
                } }
            }
        })
        .to_string();
        let response = app
            .oneshot(signed_post(
                "/slack/actions",
                form_body(&[("payload", payload.as_str())]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["response_action"], "errors");
        assert!(json["errors"]["link"].is_string());
        assert!(json["errors"]["project"].is_string());
        assert!(json["errors"].get("title").is_none());
    }

    #[tokio::test]
    async fn test_unreadable_payload_is_bad_request() {
        let (app, _) = test_app();
        let response = app
            .oneshot(signed_post(
                "/slack/actions",
                form_body(&[("payload", "not json")]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_link_button_is_acknowledged() {
        let (app, slack) = test_app();
        let payload = json!({
            "type": "block_actions",
            "user": { "id": "U1" },
            "actions": [{ "action_id": herald_slack::blocks::VIEW_TICKET_ACTION }]
        })
        .to_string();
        let response = app
            .oneshot(signed_post(
                "/slack/actions",
                form_body(&[("payload", payload.as_str())]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(slack.forms.lock().unwrap().is_empty());
    }

    fn comment_resolved(user_id: &str) -> InteractionEvent {
        InteractionEvent::CommentResolved {
            user_id: user_id.to_string(),
            card: MessageHandle::new(CARD_TS),
            notification: MessageHandle::new("1700000001.000200"),
            reviewer_id: "R1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolve_click_by_stranger_changes_nothing() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert(commented_request()).await;
        let (desk, slack) = test_desk(repo.clone());

        dispatch(&desk, comment_resolved("STRANGER")).await.unwrap();

        let stored = repo.find_by_id(RequestId(1)).await.unwrap().unwrap();
        assert_eq!(stored.reviewers[0].status, ReviewStatus::Commented);
        assert_eq!(stored.reminder_count, 4);

        let ephemerals = slack.ephemerals.lock().unwrap().clone();
        assert_eq!(ephemerals.len(), 1);
        assert_eq!(ephemerals[0].0, "STRANGER");
    }

    #[tokio::test]
    async fn test_resolve_click_by_reviewer_eases_counter() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert(commented_request()).await;
        let (desk, slack) = test_desk(repo.clone());

        dispatch(&desk, comment_resolved("R1")).await.unwrap();

        let stored = repo.find_by_id(RequestId(1)).await.unwrap().unwrap();
        assert_eq!(stored.reviewers[0].status, ReviewStatus::Reviewing);
        assert_eq!(stored.reminder_count, 2);
        assert!(slack.ephemerals.lock().unwrap().is_empty());
    }

    fn json_post(path: &str, body: String) -> HttpRequest<Body> {
        let mut request = signed_post(path, body);
        request.headers_mut().insert(
            "content-type",
            axum::http::HeaderValue::from_static("application/json"),
        );
        request
    }

    #[tokio::test]
    async fn test_events_url_verification_echoes_challenge() {
        let (app, _) = test_app();
        let body = json!({ "type": "url_verification", "challenge": "3eZbrw1a" }).to_string();
        let response = app.oneshot(json_post("/slack/events", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["challenge"], "3eZbrw1a");
    }

    #[tokio::test]
    async fn test_events_require_signature() {
        let (app, _) = test_app();
        let body = json!({ "type": "url_verification", "challenge": "x" }).to_string();
        let response = app
            .oneshot(
                HttpRequest::post("/slack/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_direct_message_gets_submit_prompt() {
        let (app, slack) = test_app();
        let body = json!({
            "type": "event_callback",
            "event": {
                "type": "message",
                "channel_type": "im",
                "user": "U1",
                "channel": "D1",
                "text": "can I submit PR here?",
            }
        })
        .to_string();
        let response = app.oneshot(json_post("/slack/events", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        wait_for(&slack, 1).await;
        let published = slack.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "D1");
        assert_eq!(published[0].1, MessageContent::SubmitPrompt);
    }

    #[tokio::test]
    async fn test_mention_gets_threaded_help() {
        let (app, slack) = test_app();
        let body = json!({
            "type": "event_callback",
            "event": {
                "type": "app_mention",
                "user": "U1",
                "channel": "CGENERAL",
                "text": "<@UBOT> what can you do?",
                "ts": "1700000009.000100",
            }
        })
        .to_string();
        let response = app.oneshot(json_post("/slack/events", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        wait_for(&slack, 1).await;
        let published = slack.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].1,
            MessageContent::Help {
                user_id: "U1".to_string()
            }
        );
        assert_eq!(
            published[0].2,
            Some(MessageHandle::new("1700000009.000100"))
        );
    }
}
