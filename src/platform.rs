//! Messaging platform boundary: message model and the client traits the engine consumes.
//!
//! The engine never talks to the platform directly. Embedders implement
//! [`PlatformClient`] over their bot or user-account library and hand a
//! [`ClientProvider`] to [`ChatForwarder::new`](crate::ChatForwarder::new).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::types::{ChatRef, ContentKind, ContentSignature, UserId};

/// Kind of media attached to a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Photo
    Photo,
    /// Video
    Video,
    /// Generic file
    Document,
    /// Audio track
    Audio,
    /// Voice note
    Voice,
    /// GIF animation
    Animation,
    /// Sticker
    Sticker,
}

impl MediaKind {
    /// Content kind this media falls under for coarse filtering
    pub fn content_kind(&self) -> ContentKind {
        match self {
            MediaKind::Photo => ContentKind::Photo,
            MediaKind::Video => ContentKind::Video,
            MediaKind::Document => ContentKind::Document,
            MediaKind::Audio => ContentKind::Audio,
            MediaKind::Voice => ContentKind::Voice,
            MediaKind::Animation => ContentKind::Animation,
            MediaKind::Sticker => ContentKind::Sticker,
        }
    }
}

/// File attached to a message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Media kind
    pub kind: MediaKind,
    /// Content identifier, identical for re-uploads of the same file
    pub signature: ContentSignature,
    /// Original file name, when the platform keeps one
    pub file_name: Option<String>,
    /// File size in bytes
    pub file_size: u64,
}

/// A source message as returned by the platform
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message id, which is also its index in the chat
    pub id: i64,
    /// The slot exists but carries no content
    #[serde(default)]
    pub empty: bool,
    /// Join/leave/pin and other service notices
    #[serde(default)]
    pub service: bool,
    /// Text body
    #[serde(default)]
    pub text: Option<String>,
    /// Media caption
    #[serde(default)]
    pub caption: Option<String>,
    /// Attached file
    #[serde(default)]
    pub media: Option<Media>,
    /// The message is a poll
    #[serde(default)]
    pub poll: bool,
    /// Text or caption contains URL or text-link entities
    #[serde(default)]
    pub has_links: bool,
}

impl Message {
    /// Whether any coarse content kind of this message is switched off
    pub fn matches_disabled(&self, disabled: &[ContentKind]) -> bool {
        if disabled.is_empty() {
            return false;
        }
        let mut kinds = Vec::with_capacity(2);
        if let Some(media) = &self.media {
            kinds.push(media.kind.content_kind());
        } else if self.poll {
            kinds.push(ContentKind::Poll);
        } else if self.text.is_some() {
            kinds.push(ContentKind::Text);
        }
        if self.has_links {
            kinds.push(ContentKind::Link);
        }
        kinds.iter().any(|kind| disabled.contains(kind))
    }

    /// Whether the message has nothing to forward
    pub fn is_unusable(&self) -> bool {
        self.empty || self.service
    }
}

/// Kind of account behind a client, which decides copy pacing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Bot token
    Bot,
    /// User session
    User,
}

/// Access a task needs on a chat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Read message history
    Read,
    /// Post messages
    Write,
}

/// One inline URL button
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    /// Button label
    pub text: String,
    /// Target URL
    pub url: String,
}

/// Rows of inline buttons attached to a copied message
pub type InlineKeyboard = Vec<Vec<InlineButton>>;

/// A started platform session acting on behalf of one user's account.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Account type of this session
    fn account_kind(&self) -> AccountKind;

    /// Fetch messages by id; missing or deleted ids come back as `None`.
    ///
    /// The result is aligned with `ids`.
    async fn fetch_messages(
        &self,
        chat: &ChatRef,
        ids: &[i64],
    ) -> Result<Vec<Option<Message>>, PlatformError>;

    /// Copy one message without the forward tag
    async fn copy_message(
        &self,
        destination: &ChatRef,
        source: &ChatRef,
        message_id: i64,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
        protect: bool,
    ) -> Result<(), PlatformError>;

    /// Forward a batch of messages keeping the forward tag
    async fn forward_messages(
        &self,
        destination: &ChatRef,
        source: &ChatRef,
        message_ids: &[i64],
        protect: bool,
    ) -> Result<(), PlatformError>;

    /// Post a text message
    async fn send_message(&self, chat: &ChatRef, text: &str) -> Result<Message, PlatformError>;

    /// Check that the account can read or post in a chat
    async fn verify_access(&self, chat: &ChatRef, mode: AccessMode) -> Result<(), PlatformError>;

    /// Release the session
    async fn stop(&self) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Acquires a started client for a user's configured account.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Connect the account the user configured for forwarding
    async fn client_for(&self, user_id: UserId) -> Result<Arc<dyn PlatformClient>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(name: &str) -> Media {
        Media {
            kind: MediaKind::Document,
            signature: ContentSignature::from("sig"),
            file_name: Some(name.to_string()),
            file_size: 10,
        }
    }

    #[test]
    fn nothing_disabled_matches_nothing() {
        let msg = Message {
            id: 1,
            text: Some("hi".into()),
            has_links: true,
            ..Default::default()
        };
        assert!(!msg.matches_disabled(&[]));
    }

    #[test]
    fn text_and_link_rules_apply_to_text_messages() {
        let msg = Message {
            id: 1,
            text: Some("see https://example.com".into()),
            has_links: true,
            ..Default::default()
        };
        assert!(msg.matches_disabled(&[ContentKind::Text]));
        assert!(msg.matches_disabled(&[ContentKind::Link]));
        assert!(!msg.matches_disabled(&[ContentKind::Photo]));
    }

    #[test]
    fn media_rules_use_media_kind_not_caption() {
        let msg = Message {
            id: 2,
            caption: Some("caption".into()),
            media: Some(document("a.pdf")),
            ..Default::default()
        };
        assert!(msg.matches_disabled(&[ContentKind::Document]));
        assert!(!msg.matches_disabled(&[ContentKind::Text]));
    }

    #[test]
    fn polls_match_poll_rule() {
        let msg = Message {
            id: 3,
            poll: true,
            ..Default::default()
        };
        assert!(msg.matches_disabled(&[ContentKind::Poll]));
    }

    #[test]
    fn empty_and_service_messages_are_unusable() {
        let empty = Message {
            id: 4,
            empty: true,
            ..Default::default()
        };
        let service = Message {
            id: 5,
            service: true,
            ..Default::default()
        };
        assert!(empty.is_unusable());
        assert!(service.is_unusable());
        assert!(!Message { id: 6, ..Default::default() }.is_unusable());
    }
}
