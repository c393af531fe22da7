//! REST collaborators: the durable store behind chat and notifications.
//!
//! The real-time core only talks to the backend's REST surface through
//! the [`ChatApi`] and [`NotificationApi`] traits, so sessions and
//! aggregators can be driven by in-memory fakes. [`RestClient`] is the
//! `reqwest` implementation of both.
//!
//! | Method | Path | Trait method |
//! |---|---|---|
//! | `GET`  | `/api/chat/{chatId}/messages` | [`ChatApi::fetch_messages`] |
//! | `POST` | `/api/chat/{chatId}/message` | [`ChatApi::post_message`] |
//! | `GET`  | `/api/chat/{user\|vendor}/{id}` | [`ChatApi::list_conversations`] |
//! | `GET`  | `/api/notifications/{id}/{User\|Vendor}` | [`NotificationApi::fetch_notifications`] |
//! | `PUT`  | `/api/notifications/mark-read/{id}` | [`NotificationApi::mark_read`] |

pub mod dto;
pub mod rest;

use std::fmt;

use async_trait::async_trait;

pub use dto::NewMessage;
pub use rest::RestClient;

use crate::domain::{ChatId, ChatMessage, ConversationSummary, Identity, Notification, NotificationId};
use crate::error::RealtimeError;

/// Chat persistence and listing.
#[async_trait]
pub trait ChatApi: Send + Sync + fmt::Debug {
    /// Fetches the ordered history of a conversation.
    ///
    /// # Errors
    ///
    /// Returns a transport, status, or decode [`RealtimeError`].
    async fn fetch_messages(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, RealtimeError>;

    /// Persists one message. Returns the stored document when the backend
    /// answers with one.
    ///
    /// # Errors
    ///
    /// Returns a transport or status [`RealtimeError`].
    async fn post_message(&self, message: &NewMessage)
    -> Result<Option<ChatMessage>, RealtimeError>;

    /// Lists the conversations of an identity.
    ///
    /// # Errors
    ///
    /// Returns a transport, status, or decode [`RealtimeError`].
    async fn list_conversations(
        &self,
        identity: &Identity,
    ) -> Result<Vec<ConversationSummary>, RealtimeError>;
}

/// Notification source of truth.
#[async_trait]
pub trait NotificationApi: Send + Sync + fmt::Debug {
    /// Fetches the current notification list of an identity.
    ///
    /// # Errors
    ///
    /// Returns a transport, status, or decode [`RealtimeError`].
    async fn fetch_notifications(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Notification>, RealtimeError>;

    /// Acknowledges one notification as read.
    ///
    /// # Errors
    ///
    /// Returns a transport or status [`RealtimeError`].
    async fn mark_read(&self, id: &NotificationId) -> Result<(), RealtimeError>;
}
