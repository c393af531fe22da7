//! Chat messages and outbound content validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChatId, IdentityId, MessageId};
use crate::error::RealtimeError;

/// Local persistence state of a message.
///
/// Messages loaded from history or received live are `Confirmed`. A
/// message sent from this client starts `Pending` and settles once the
/// remote store answers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeliveryState {
    /// Known to the remote store.
    #[default]
    Confirmed,
    /// Appended optimistically, persistence still in flight.
    Pending,
    /// Persistence failed; the entry is visible but may not be durable.
    Unconfirmed {
        /// Why persistence failed.
        reason: String,
    },
}

/// One message of a conversation.
///
/// Field names follow the backend document (`_id`, `chatId`, `sender`,
/// `createdAt`). The broadcast form (`senderId`, `message`) is accepted as
/// an alias so live echoes decode into the same type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Id assigned by the remote store; absent on an optimistic entry.
    #[serde(
        rename = "_id",
        alias = "id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<MessageId>,

    /// Conversation the message belongs to, when the payload carries it.
    #[serde(
        alias = "conversationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub chat_id: Option<ChatId>,

    /// Author of the message.
    #[serde(alias = "senderId")]
    pub sender: IdentityId,

    /// Non-empty message text.
    #[serde(alias = "message")]
    pub content: String,

    /// Creation time; defaults to arrival time when the payload omits it.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Whether the recipient has seen the message.
    #[serde(default)]
    pub read: bool,

    /// Client-side handle of an optimistic entry.
    #[serde(skip)]
    pub local_id: Option<Uuid>,

    /// Local persistence state.
    #[serde(skip)]
    pub delivery: DeliveryState,
}

impl ChatMessage {
    /// Builds an optimistic, not-yet-persisted message.
    #[must_use]
    pub fn optimistic(chat_id: ChatId, sender: IdentityId, content: MessageContent) -> Self {
        Self {
            id: None,
            chat_id: Some(chat_id),
            sender,
            content: content.into_inner(),
            created_at: Utc::now(),
            read: false,
            local_id: Some(Uuid::new_v4()),
            delivery: DeliveryState::Pending,
        }
    }

    /// Returns `true` if the message was authored by `identity`.
    #[must_use]
    pub fn is_from(&self, identity: &IdentityId) -> bool {
        &self.sender == identity
    }

    /// Returns `true` while the remote store has not acknowledged the entry.
    #[must_use]
    pub fn is_unacknowledged(&self) -> bool {
        self.id.is_none() && self.local_id.is_some()
    }

    /// Flips `read` to true. Never flips it back.
    pub fn mark_read(&mut self) -> bool {
        let changed = !self.read;
        self.read = true;
        changed
    }
}

/// Outbound message text, guaranteed not to be blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    /// Validates outbound text.
    ///
    /// The text is kept as typed; only the emptiness check trims.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::EmptyMessage`] if the text is empty or
    /// whitespace-only.
    pub fn parse(raw: &str) -> Result<Self, RealtimeError> {
        if raw.trim().is_empty() {
            return Err(RealtimeError::EmptyMessage);
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn blank_content_is_rejected() {
        assert_eq!(MessageContent::parse(""), Err(RealtimeError::EmptyMessage));
        assert_eq!(
            MessageContent::parse("   \n\t"),
            Err(RealtimeError::EmptyMessage)
        );
    }

    #[test]
    fn content_keeps_surrounding_whitespace() {
        let Ok(content) = MessageContent::parse("  hi ") else {
            panic!("valid content");
        };
        assert_eq!(content.as_str(), "  hi ");
    }

    #[test]
    fn decodes_backend_document() {
        let json = r#"{
            "_id": "m1",
            "chatId": "c1",
            "sender": "u1",
            "content": "Hello",
            "createdAt": "2024-05-01T10:00:00Z",
            "read": true
        }"#;
        let Ok(msg) = serde_json::from_str::<ChatMessage>(json) else {
            panic!("document must decode");
        };
        assert_eq!(msg.id, Some(MessageId::from("m1")));
        assert_eq!(msg.chat_id, Some(ChatId::from("c1")));
        assert!(msg.read);
        assert_eq!(msg.delivery, DeliveryState::Confirmed);
    }

    #[test]
    fn decodes_broadcast_form() {
        let json = r#"{"chatId": "c1", "message": "Hi", "senderId": "v1", "vendorId": "v1"}"#;
        let Ok(msg) = serde_json::from_str::<ChatMessage>(json) else {
            panic!("broadcast must decode");
        };
        assert_eq!(msg.id, None);
        assert_eq!(msg.content, "Hi");
        assert_eq!(msg.sender, IdentityId::from("v1"));
        assert!(!msg.read);
    }

    #[test]
    fn optimistic_entry_is_pending() {
        let Ok(content) = MessageContent::parse("Hi") else {
            panic!("valid content");
        };
        let msg = ChatMessage::optimistic(ChatId::from("c1"), IdentityId::from("u1"), content);
        assert!(msg.is_unacknowledged());
        assert_eq!(msg.delivery, DeliveryState::Pending);
        assert!(msg.is_from(&IdentityId::from("u1")));
    }

    #[test]
    fn mark_read_is_one_way() {
        let Ok(content) = MessageContent::parse("Hi") else {
            panic!("valid content");
        };
        let mut msg = ChatMessage::optimistic(ChatId::from("c1"), IdentityId::from("u1"), content);
        assert!(msg.mark_read());
        assert!(!msg.mark_read());
        assert!(msg.read);
    }
}
