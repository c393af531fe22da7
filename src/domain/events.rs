//! Named real-time events exchanged with the backend.
//!
//! Outbound events are built as [`ClientEvent`] and inbound payloads are
//! decoded into [`ServerEvent`]. Event names match the backend's handlers
//! exactly (see [`names`]).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Booking, BookingId, ChatId, ChatMessage, IdentityId, IdentityType, Notification};
use crate::error::RealtimeError;

/// Wire names of every event.
pub mod names {
    /// Client → server: join a conversation room.
    pub const JOIN_ROOM: &str = "joinRoom";
    /// Client → server: broadcast a message to the room.
    pub const SEND_MESSAGE: &str = "sendMessage";
    /// Both directions: composer activity.
    pub const TYPING: &str = "typing";
    /// Client → server: read receipt for a conversation.
    pub const MARK_SEEN: &str = "markSeen";
    /// Client → server: register a user identity channel.
    pub const REGISTER_USER: &str = "registerUser";
    /// Client → server: register a vendor identity channel.
    pub const REGISTER_VENDOR: &str = "registerVendor";
    /// Client → server: a user cancelled a booking.
    pub const BOOKING_CANCELLED_BY_USER: &str = "bookingCancelledByUser";
    /// Server → client: a message was posted to a joined room.
    pub const RECEIVE_MESSAGE: &str = "receiveMessage";
    /// Server → client: a notification for a registered identity.
    pub const NEW_NOTIFICATION: &str = "newNotification";
    /// Server → client: a booking changed status.
    pub const BOOKING_UPDATED: &str = "bookingUpdated";
}

/// Events this client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Request membership in a conversation room.
    JoinRoom {
        /// Room to join.
        chat_id: ChatId,
    },
    /// Broadcast a message to the other participant.
    SendMessage {
        /// Target room.
        chat_id: ChatId,
        /// Message text.
        message: String,
        /// Author.
        sender_id: IdentityId,
        /// Vendor side of the conversation.
        vendor_id: IdentityId,
    },
    /// Announce composer activity.
    Typing {
        /// Target room.
        chat_id: ChatId,
        /// Who is typing.
        sender: IdentityId,
    },
    /// Acknowledge that the viewer has seen the conversation.
    MarkSeen {
        /// Conversation seen.
        chat_id: ChatId,
        /// Viewer.
        user_id: IdentityId,
    },
    /// Ask to receive notification events for an identity.
    Register {
        /// Identity to register.
        identity_id: IdentityId,
        /// Kind of identity; selects the event name.
        kind: IdentityType,
    },
    /// Tell the vendor side a user cancelled a booking.
    BookingCancelledByUser {
        /// Cancelling user.
        user_id: IdentityId,
        /// Vendor of the booking.
        vendor_id: IdentityId,
        /// Cancelled booking.
        booking_id: BookingId,
    },
}

impl ClientEvent {
    /// Returns the wire event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => names::JOIN_ROOM,
            Self::SendMessage { .. } => names::SEND_MESSAGE,
            Self::Typing { .. } => names::TYPING,
            Self::MarkSeen { .. } => names::MARK_SEEN,
            Self::Register {
                kind: IdentityType::User,
                ..
            } => names::REGISTER_USER,
            Self::Register {
                kind: IdentityType::Vendor,
                ..
            } => names::REGISTER_VENDOR,
            Self::BookingCancelledByUser { .. } => names::BOOKING_CANCELLED_BY_USER,
        }
    }

    /// Returns the JSON payload sent with the event.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::JoinRoom { chat_id } => json!({ "chatId": chat_id }),
            Self::SendMessage {
                chat_id,
                message,
                sender_id,
                vendor_id,
            } => json!({
                "chatId": chat_id,
                "message": message,
                "senderId": sender_id,
                "vendorId": vendor_id,
            }),
            Self::Typing { chat_id, sender } => json!({ "chatId": chat_id, "sender": sender }),
            Self::MarkSeen { chat_id, user_id } => json!({ "chatId": chat_id, "userId": user_id }),
            Self::Register {
                identity_id,
                kind: IdentityType::User,
            } => json!({ "userId": identity_id }),
            Self::Register {
                identity_id,
                kind: IdentityType::Vendor,
            } => json!({ "vendorId": identity_id }),
            Self::BookingCancelledByUser {
                user_id,
                vendor_id,
                booking_id,
            } => json!({
                "userId": user_id,
                "vendorId": vendor_id,
                "bookingId": booking_id,
            }),
        }
    }
}

/// Payload of an inbound `typing` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    /// Who is typing.
    pub sender: IdentityId,
    /// Room the signal belongs to, when the backend includes it.
    #[serde(default)]
    pub chat_id: Option<ChatId>,
}

/// Events this client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A message was posted to a joined room.
    ReceiveMessage(ChatMessage),
    /// The peer is typing.
    Typing(TypingSignal),
    /// A notification for a registered identity.
    NewNotification(Notification),
    /// A booking changed.
    BookingUpdated(Booking),
}

impl ServerEvent {
    /// Decodes an inbound payload by event name.
    ///
    /// Returns `Ok(None)` for event names this client does not handle.
    /// Payloads may be wrapped (`{"message": {...}}`) or bare.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Decode`] if a known event carries a
    /// malformed payload.
    pub fn decode(event: &str, data: &Value) -> Result<Option<Self>, RealtimeError> {
        let decoded = match event {
            names::RECEIVE_MESSAGE => Self::ReceiveMessage(unwrap_payload(data, "message")?),
            names::TYPING => Self::Typing(serde_json::from_value(data.clone())?),
            names::NEW_NOTIFICATION => {
                Self::NewNotification(unwrap_payload(data, "notification")?)
            }
            names::BOOKING_UPDATED => Self::BookingUpdated(unwrap_payload(data, "booking")?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

/// Decodes `data[key]` when it is an object, otherwise `data` itself.
pub(crate) fn unwrap_payload<T: DeserializeOwned>(
    data: &Value,
    key: &str,
) -> Result<T, RealtimeError> {
    let inner = match data.get(key) {
        Some(wrapped @ Value::Object(_)) => wrapped,
        _ => data,
    };
    T::deserialize(inner).map_err(|e| RealtimeError::Decode(format!("{key}: {e}")))
}
