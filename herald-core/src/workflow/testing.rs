//! Test doubles for the workflow collaborators

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DeskSettings, ReviewDesk};
use crate::gateway::{FormView, IdentityResolver, MessageContent, NotificationGateway, PostedMessage};
use crate::request::{MessageHandle, User};
use crate::store::InMemoryRepository;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Publish {
        channel: String,
        content: MessageContent,
        thread: Option<MessageHandle>,
    },
    Update {
        channel: String,
        handle: MessageHandle,
        content: MessageContent,
    },
    Ephemeral {
        channel: String,
        user_id: String,
        text: String,
    },
    OpenForm {
        trigger_id: String,
        form: FormView,
    },
}

/// Gateway that records every call; selected operations can be made to fail
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<Call>>,
    seq: AtomicU64,
    fail_updates: Mutex<bool>,
    fail_publish_threads: Mutex<HashSet<String>>,
    fail_publish_all: Mutex<bool>,
}

impl RecordingGateway {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_updates(&self) {
        *self.fail_updates.lock().unwrap() = true;
    }

    pub fn fail_publish_all(&self) {
        *self.fail_publish_all.lock().unwrap() = true;
    }

    /// Fail publishes threaded under this handle
    pub fn fail_thread(&self, handle: &str) {
        self.fail_publish_threads
            .lock()
            .unwrap()
            .insert(handle.to_string());
    }

    pub fn published(&self) -> Vec<(String, MessageContent, Option<MessageHandle>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Publish {
                    channel,
                    content,
                    thread,
                } => Some((channel, content, thread)),
                _ => None,
            })
            .collect()
    }

    pub fn ephemerals(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Ephemeral { user_id, text, .. } => Some((user_id, text)),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, MessageHandle, MessageContent)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update {
                    channel,
                    handle,
                    content,
                } => Some((channel, handle, content)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn publish(
        &self,
        channel: &str,
        content: &MessageContent,
        thread: Option<&MessageHandle>,
    ) -> Result<PostedMessage> {
        self.calls.lock().unwrap().push(Call::Publish {
            channel: channel.to_string(),
            content: content.clone(),
            thread: thread.cloned(),
        });

        if *self.fail_publish_all.lock().unwrap() {
            return Err(Error::Gateway("publish failed".to_string()));
        }
        if let Some(thread) = thread {
            if self.fail_publish_threads.lock().unwrap().contains(thread.as_str()) {
                return Err(Error::Gateway("thread publish failed".to_string()));
            }
        }

        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        // posting to a user id lands in a DM channel
        let channel = if channel.starts_with('U') {
            format!("D{}", channel)
        } else {
            channel.to_string()
        };
        Ok(PostedMessage {
            channel,
            handle: MessageHandle::new(format!("ts-{}", n)),
        })
    }

    async fn update_message(
        &self,
        channel: &str,
        handle: &MessageHandle,
        content: &MessageContent,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Update {
            channel: channel.to_string(),
            handle: handle.clone(),
            content: content.clone(),
        });
        if *self.fail_updates.lock().unwrap() {
            return Err(Error::Gateway("update failed".to_string()));
        }
        Ok(())
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
        _thread: Option<&MessageHandle>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Ephemeral {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn permalink(&self, channel: &str, handle: &MessageHandle) -> Result<String> {
        Ok(format!("https://chat.example.com/{}/{}", channel, handle))
    }

    async fn open_form(&self, trigger_id: &str, form: &FormView) -> Result<()> {
        self.calls.lock().unwrap().push(Call::OpenForm {
            trigger_id: trigger_id.to_string(),
            form: form.clone(),
        });
        Ok(())
    }
}

/// Resolves any `U*` id to a user named after it, counting lookups
#[derive(Default)]
pub struct StaticIdentities {
    lookups: Mutex<HashMap<String, usize>>,
}

impl StaticIdentities {
    pub fn lookups(&self, user_id: &str) -> usize {
        self.lookups
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_lookups(&self) -> usize {
        self.lookups.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentities {
    async fn resolve_user(&self, user_id: &str) -> Result<User> {
        *self
            .lookups
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default() += 1;
        if !user_id.starts_with('U') {
            return Err(Error::Gateway(format!("users.info failed for {}", user_id)));
        }
        Ok(User::new(user_id, user_id.to_lowercase()))
    }
}

pub struct Harness {
    pub desk: ReviewDesk,
    pub repo: Arc<InMemoryRepository>,
    pub gateway: Arc<RecordingGateway>,
    pub identities: Arc<StaticIdentities>,
}

pub const CHANNEL: &str = "C0REVIEW";

pub fn harness() -> Harness {
    harness_with(DeskSettings::new(CHANNEL).with_escalation_contact("USCRUM"))
}

pub fn harness_with(settings: DeskSettings) -> Harness {
    let repo = Arc::new(InMemoryRepository::new());
    let gateway = Arc::new(RecordingGateway::default());
    let identities = Arc::new(StaticIdentities::default());
    let desk = ReviewDesk::new(repo.clone(), gateway.clone(), identities.clone(), settings);
    Harness {
        desk,
        repo,
        gateway,
        identities,
    }
}
