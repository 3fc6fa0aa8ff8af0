//! In-memory chat platform shared by every user's client

use async_trait::async_trait;
use chat_forwarder::platform::InlineKeyboard;
use chat_forwarder::types::ContentSignature;
use chat_forwarder::{
    AccessMode, AccountKind, ChatRef, ClientProvider, Media, MediaKind, Message, PlatformClient,
    PlatformError, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A message as it landed in a destination chat
#[derive(Clone, Debug, PartialEq)]
pub struct Posted {
    /// Id of the source message
    pub source_id: i64,
    /// Whether it arrived through a tagged forward rather than a copy
    pub forwarded: bool,
    /// Caption sent with a copy, if one was rebuilt
    pub caption: Option<String>,
}

/// Source chats to read from and destination chats that record what arrives
#[derive(Default)]
pub struct ChatWorld {
    sources: Mutex<HashMap<ChatRef, BTreeMap<i64, Message>>>,
    destinations: Mutex<HashMap<ChatRef, Vec<Posted>>>,
    read_delay: Mutex<Duration>,
    next_sent_id: AtomicI64,
}

impl ChatWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add messages to a source chat
    pub fn publish(&self, chat: ChatRef, messages: impl IntoIterator<Item = Message>) {
        let mut sources = self.sources.lock().unwrap();
        let history = sources.entry(chat).or_default();
        for message in messages {
            history.insert(message.id, message);
        }
    }

    /// Slow down every history read
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    /// Everything posted to `chat`, in arrival order
    pub fn posted(&self, chat: &ChatRef) -> Vec<Posted> {
        self.destinations
            .lock()
            .unwrap()
            .get(chat)
            .cloned()
            .unwrap_or_default()
    }

    /// Source ids posted to `chat`, in arrival order
    pub fn posted_ids(&self, chat: &ChatRef) -> Vec<i64> {
        self.posted(chat).iter().map(|p| p.source_id).collect()
    }

    fn post(&self, chat: &ChatRef, posted: Posted) {
        self.destinations
            .lock()
            .unwrap()
            .entry(chat.clone())
            .or_default()
            .push(posted);
    }
}

/// One account's session onto the shared world
pub struct WorldClient {
    world: Arc<ChatWorld>,
    account: AccountKind,
}

#[async_trait]
impl PlatformClient for WorldClient {
    fn account_kind(&self) -> AccountKind {
        self.account
    }

    async fn fetch_messages(
        &self,
        chat: &ChatRef,
        ids: &[i64],
    ) -> Result<Vec<Option<Message>>, PlatformError> {
        let delay = *self.world.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let sources = self.world.sources.lock().unwrap();
        let history = sources
            .get(chat)
            .ok_or_else(|| PlatformError::ChatNotFound(chat.to_string()))?;
        Ok(ids.iter().map(|id| history.get(id).cloned()).collect())
    }

    async fn copy_message(
        &self,
        destination: &ChatRef,
        _source: &ChatRef,
        message_id: i64,
        caption: Option<&str>,
        _keyboard: Option<&InlineKeyboard>,
        _protect: bool,
    ) -> Result<(), PlatformError> {
        self.world.post(
            destination,
            Posted {
                source_id: message_id,
                forwarded: false,
                caption: caption.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn forward_messages(
        &self,
        destination: &ChatRef,
        _source: &ChatRef,
        message_ids: &[i64],
        _protect: bool,
    ) -> Result<(), PlatformError> {
        for &id in message_ids {
            self.world.post(
                destination,
                Posted {
                    source_id: id,
                    forwarded: true,
                    caption: None,
                },
            );
        }
        Ok(())
    }

    async fn send_message(&self, _chat: &ChatRef, text: &str) -> Result<Message, PlatformError> {
        Ok(Message {
            id: self.world.next_sent_id.fetch_add(1, Ordering::SeqCst),
            text: Some(text.to_string()),
            ..Default::default()
        })
    }

    async fn verify_access(&self, chat: &ChatRef, mode: AccessMode) -> Result<(), PlatformError> {
        if mode == AccessMode::Read && !self.world.sources.lock().unwrap().contains_key(chat) {
            return Err(PlatformError::ChatNotFound(chat.to_string()));
        }
        Ok(())
    }
}

/// Gives every user a bot session onto the same world
pub struct WorldProvider {
    world: Arc<ChatWorld>,
}

impl WorldProvider {
    pub fn new(world: Arc<ChatWorld>) -> Arc<Self> {
        Arc::new(Self { world })
    }
}

#[async_trait]
impl ClientProvider for WorldProvider {
    async fn client_for(&self, _user_id: UserId) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        Ok(Arc::new(WorldClient {
            world: Arc::clone(&self.world),
            account: AccountKind::Bot,
        }))
    }
}

pub fn text(id: i64) -> Message {
    Message {
        id,
        text: Some(format!("post {id}")),
        ..Default::default()
    }
}

pub fn document(id: i64, file_name: &str, signature: &str) -> Message {
    Message {
        id,
        caption: Some(format!("upload {id}")),
        media: Some(Media {
            kind: MediaKind::Document,
            signature: ContentSignature::from(signature),
            file_name: Some(file_name.to_string()),
            file_size: 2048,
        }),
        ..Default::default()
    }
}

pub fn service(id: i64) -> Message {
    Message {
        id,
        service: true,
        ..Default::default()
    }
}
