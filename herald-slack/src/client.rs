//! Slack Web API client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use herald_core::{
    FormView, IdentityResolver, MessageContent, MessageHandle, NotificationGateway, PostedMessage,
    Secrets, User,
};

use crate::blocks::{form_view, message_payload};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Slack Web API client, authenticated with a bot token
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    name: String,
    #[serde(default)]
    profile: Option<UserProfile>,
}

impl SlackClient {
    /// Create a client for the given bot token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create a client from loaded secrets
    ///
    /// Token is taken from (in priority order):
    /// 1. SLACK_BOT_TOKEN environment variable
    /// 2. ~/.config/herald/secrets.toml
    pub fn from_secrets(secrets: &Secrets) -> Result<Self> {
        let token = secrets.bot_token().ok_or_else(|| {
            Error::Auth(
                "Slack bot token not found. Set SLACK_BOT_TOKEN environment variable \
                 or add bot_token to ~/.config/herald/secrets.toml"
                    .to_string(),
            )
        })?;
        info!("Created Slack client");
        Ok(Self::new(token))
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn read_response(method: &str, response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response".to_string());
            return Err(Error::Api {
                method: method.to_string(),
                error: format!("HTTP {}: {}", status, text),
            });
        }

        let body: Value = response.json().await?;
        if body["ok"].as_bool() != Some(true) {
            return Err(Error::Api {
                method: method.to_string(),
                error: body["error"].as_str().unwrap_or("unknown_error").to_string(),
            });
        }

        Ok(body)
    }

    /// Call a method that takes a JSON body
    async fn post(&self, method: &str, body: &Value) -> Result<Value> {
        debug!(method = method, "Calling Slack API");
        let response = self
            .http
            .post(self.url(method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::read_response(method, response).await
    }

    /// Call a read method that takes query arguments
    async fn get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value> {
        debug!(method = method, "Calling Slack API");
        let response = self
            .http
            .get(self.url(method))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        Self::read_response(method, response).await
    }

    /// Post a message; returns the channel and timestamp Slack assigned
    pub async fn post_message(
        &self,
        channel: &str,
        content: &MessageContent,
        thread: Option<&MessageHandle>,
    ) -> Result<PostedMessage> {
        let mut body = message_payload(content);
        body["channel"] = json!(channel);
        if let Some(thread) = thread {
            body["thread_ts"] = json!(thread.as_str());
        }

        let response = self.post("chat.postMessage", &body).await?;
        let ts = response["ts"]
            .as_str()
            .ok_or_else(|| Error::Payload("chat.postMessage response without ts".to_string()))?;

        Ok(PostedMessage {
            channel: response["channel"].as_str().unwrap_or(channel).to_string(),
            handle: MessageHandle::new(ts),
        })
    }

    pub async fn update(
        &self,
        channel: &str,
        handle: &MessageHandle,
        content: &MessageContent,
    ) -> Result<()> {
        let mut body = message_payload(content);
        body["channel"] = json!(channel);
        body["ts"] = json!(handle.as_str());
        self.post("chat.update", &body).await?;
        Ok(())
    }

    pub async fn post_ephemeral_text(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
        thread: Option<&MessageHandle>,
    ) -> Result<()> {
        let mut body = json!({ "channel": channel, "user": user_id, "text": text });
        if let Some(thread) = thread {
            body["thread_ts"] = json!(thread.as_str());
        }
        self.post("chat.postEphemeral", &body).await?;
        Ok(())
    }

    pub async fn get_permalink(&self, channel: &str, handle: &MessageHandle) -> Result<String> {
        let response = self
            .get(
                "chat.getPermalink",
                &[("channel", channel), ("message_ts", handle.as_str())],
            )
            .await?;
        response["permalink"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Payload("chat.getPermalink response without permalink".to_string()))
    }

    pub async fn open_view(&self, trigger_id: &str, view: Value) -> Result<()> {
        self.post("views.open", &json!({ "trigger_id": trigger_id, "view": view }))
            .await?;
        Ok(())
    }

    /// Look up a workspace user
    pub async fn user_info(&self, user_id: &str) -> Result<User> {
        let response = self.get("users.info", &[("user", user_id)]).await?;
        let user: SlackUser = serde_json::from_value(response["user"].clone())?;

        let display_name = user
            .profile
            .and_then(|p| p.display_name)
            .filter(|name| !name.trim().is_empty());

        Ok(User {
            id: user.id,
            name: user.name,
            display_name,
        })
    }
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NotificationGateway for SlackClient {
    async fn publish(
        &self,
        channel: &str,
        content: &MessageContent,
        thread: Option<&MessageHandle>,
    ) -> herald_core::Result<PostedMessage> {
        Ok(self.post_message(channel, content, thread).await?)
    }

    async fn update_message(
        &self,
        channel: &str,
        handle: &MessageHandle,
        content: &MessageContent,
    ) -> herald_core::Result<()> {
        Ok(self.update(channel, handle, content).await?)
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
        thread: Option<&MessageHandle>,
    ) -> herald_core::Result<()> {
        Ok(self
            .post_ephemeral_text(channel, user_id, text, thread)
            .await?)
    }

    async fn permalink(&self, channel: &str, handle: &MessageHandle) -> herald_core::Result<String> {
        Ok(self.get_permalink(channel, handle).await?)
    }

    async fn open_form(&self, trigger_id: &str, form: &FormView) -> herald_core::Result<()> {
        Ok(self.open_view(trigger_id, form_view(form)).await?)
    }
}

#[async_trait]
impl IdentityResolver for SlackClient {
    async fn resolve_user(&self, user_id: &str) -> herald_core::Result<User> {
        Ok(self.user_info(user_id).await?)
    }
}
