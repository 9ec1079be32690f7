//! Replies to mentions and direct messages

use tracing::debug;

use super::ReviewDesk;
use crate::gateway::MessageContent;
use crate::request::MessageHandle;
use crate::Result;

/// A direct message containing this phrase gets the submission prompt
pub const SUBMIT_PHRASE: &str = "submit pr";

/// Reply a direct message asks for
pub fn direct_reply(user_id: &str, text: &str) -> MessageContent {
    if text.to_lowercase().contains(SUBMIT_PHRASE) {
        MessageContent::SubmitPrompt
    } else {
        MessageContent::Help {
            user_id: user_id.to_string(),
        }
    }
}

impl ReviewDesk {
    /// Answer a mention with help, threaded under the mentioning message
    pub async fn reply_to_mention(
        &self,
        channel: &str,
        user_id: &str,
        message: &MessageHandle,
    ) -> Result<()> {
        debug!(channel = channel, user = user_id, "Answering mention");
        self.gateway()
            .publish(
                channel,
                &MessageContent::Help {
                    user_id: user_id.to_string(),
                },
                Some(message),
            )
            .await?;
        Ok(())
    }

    /// Answer a direct message with the submission prompt or help
    pub async fn reply_to_direct_message(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
    ) -> Result<()> {
        debug!(channel = channel, user = user_id, "Answering direct message");
        self.gateway()
            .publish(channel, &direct_reply(user_id, text), None)
            .await?;
        Ok(())
    }
}
