//! Transport frame envelope.
//!
//! Every WebSocket text message carries exactly one frame:
//!
//! ```json
//! { "event": "receiveMessage", "data": { "_id": "m1", "content": "Hi" } }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::ClientEvent;
use crate::error::RealtimeError;

/// One named event with its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name (e.g. `"joinRoom"`).
    pub event: String,
    /// Event-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    /// Creates a frame from a name and payload.
    #[must_use]
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Encodes the frame as a JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Decode`] if the payload cannot be
    /// serialized.
    pub fn encode(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a JSON text message into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Decode`] on malformed JSON or a missing
    /// `event` field.
    pub fn decode(text: &str) -> Result<Self, RealtimeError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl From<&ClientEvent> for Frame {
    fn from(event: &ClientEvent) -> Self {
        Self::new(event.name(), event.payload())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::ChatId;

    #[test]
    fn client_event_becomes_frame() {
        let frame = Frame::from(&ClientEvent::JoinRoom {
            chat_id: ChatId::from("c1"),
        });
        assert_eq!(frame.event, "joinRoom");
        assert_eq!(frame.data, json!({ "chatId": "c1" }));
    }

    #[test]
    fn encode_uses_envelope_keys() {
        let frame = Frame::new("typing", json!({ "sender": "u1" }));
        let text = frame.encode().unwrap_or_default();
        assert!(text.contains("\"event\":\"typing\""));
        assert!(text.contains("\"data\""));
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let Ok(frame) = Frame::decode(r#"{"event":"ping"}"#) else {
            panic!("frame must decode");
        };
        assert_eq!(frame.data, serde_json::Value::Null);
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert!(matches!(
            Frame::decode("not json"),
            Err(RealtimeError::Decode(_))
        ));
        assert!(matches!(
            Frame::decode(r#"{"data":{}}"#),
            Err(RealtimeError::Decode(_))
        ));
    }
}
