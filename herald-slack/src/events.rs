//! Events API callbacks
//!
//! Slack posts events as a JSON body. The first request after configuring the
//! endpoint is a `url_verification` handshake that must echo its challenge.

use serde::Deserialize;

use herald_core::MessageHandle;

use crate::Result;

/// An Events API callback Herald acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackEvent {
    /// Endpoint handshake; answer with the challenge
    UrlVerification { challenge: String },
    /// The bot was mentioned in a channel
    Mention {
        user_id: String,
        channel: String,
        message: MessageHandle,
    },
    /// Someone wrote to the bot directly
    DirectMessage {
        user_id: String,
        channel: String,
        text: String,
    },
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct RawInner {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event: Option<RawInner>,
}

/// Parse an Events API request body
pub fn parse_event(body: &str) -> Result<SlackEvent> {
    let envelope: RawEnvelope = serde_json::from_str(body)?;

    match envelope.kind.as_str() {
        "url_verification" => Ok(SlackEvent::UrlVerification {
            challenge: envelope.challenge.unwrap_or_default(),
        }),
        "event_callback" => Ok(envelope
            .event
            .map(classify)
            .unwrap_or_else(|| SlackEvent::Ignored("callback without event".to_string()))),
        other => Ok(SlackEvent::Ignored(format!("unhandled envelope {}", other))),
    }
}

fn classify(event: RawInner) -> SlackEvent {
    // Bot posts, edits and deletions echo back as message events
    if event.bot_id.is_some() || event.subtype.is_some() {
        return SlackEvent::Ignored(format!("{} from a bot or with a subtype", event.kind));
    }

    let (Some(user_id), Some(channel)) = (event.user, event.channel) else {
        return SlackEvent::Ignored(format!("{} without user or channel", event.kind));
    };

    match (event.kind.as_str(), event.channel_type.as_deref()) {
        ("app_mention", _) => match event.ts {
            Some(ts) => SlackEvent::Mention {
                user_id,
                channel,
                message: MessageHandle::new(ts),
            },
            None => SlackEvent::Ignored("mention without ts".to_string()),
        },
        ("message", Some("im")) => SlackEvent::DirectMessage {
            user_id,
            channel,
            text: event.text,
        },
        (kind, _) => SlackEvent::Ignored(format!("event {}", kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn callback(event: serde_json::Value) -> String {
        json!({ "type": "event_callback", "event": event }).to_string()
    }

    #[test]
    fn test_url_verification() {
        let body = json!({ "type": "url_verification", "challenge": "3eZbrw1a" }).to_string();
        assert_eq!(
            parse_event(&body).unwrap(),
            SlackEvent::UrlVerification {
                challenge: "3eZbrw1a".to_string()
            }
        );
    }

    #[test]
    fn test_app_mention() {
        let body = callback(json!({
            "type": "app_mention",
            "user": "U1",
            "channel": "CGENERAL",
            "text": "<@UBOT> hi",
            "ts": "1700000005.000100",
        }));
        assert_eq!(
            parse_event(&body).unwrap(),
            SlackEvent::Mention {
                user_id: "U1".to_string(),
                channel: "CGENERAL".to_string(),
                message: MessageHandle::new("1700000005.000100"),
            }
        );
    }

    #[test]
    fn test_direct_message() {
        let body = callback(json!({
            "type": "message",
            "channel_type": "im",
            "user": "U1",
            "channel": "D1",
            "text": "Submit PR",
            "ts": "1700000006.000100",
        }));
        assert_eq!(
            parse_event(&body).unwrap(),
            SlackEvent::DirectMessage {
                user_id: "U1".to_string(),
                channel: "D1".to_string(),
                text: "Submit PR".to_string(),
            }
        );
    }

    #[test]
    fn test_edits_bots_and_channel_messages_are_ignored() {
        let edited = callback(json!({
            "type": "message",
            "subtype": "message_changed",
            "channel_type": "im",
            "channel": "D1",
        }));
        let from_bot = callback(json!({
            "type": "message",
            "channel_type": "im",
            "bot_id": "B1",
            "user": "UBOT",
            "channel": "D1",
            "text": "Submit a Pull Request",
        }));
        let in_channel = callback(json!({
            "type": "message",
            "channel_type": "channel",
            "user": "U1",
            "channel": "CGENERAL",
            "text": "submit pr",
        }));

        for body in [edited, from_bot, in_channel] {
            assert!(matches!(parse_event(&body).unwrap(), SlackEvent::Ignored(_)));
        }
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        assert!(parse_event("not json").is_err());
    }
}
