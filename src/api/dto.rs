//! Request bodies sent to the REST collaborators.

use serde::Serialize;

use crate::domain::{ChatId, IdentityId, MessageContent};

/// Body of `POST /api/chat/{chatId}/message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    /// Target conversation.
    pub chat_id: ChatId,
    /// Author.
    pub sender: IdentityId,
    /// Validated, non-empty text.
    pub content: String,
    /// Vendor side of the conversation.
    pub vendor_id: IdentityId,
}

impl NewMessage {
    /// Builds the body from validated content.
    #[must_use]
    pub fn new(
        chat_id: ChatId,
        sender: IdentityId,
        content: &MessageContent,
        vendor_id: IdentityId,
    ) -> Self {
        Self {
            chat_id,
            sender,
            content: content.as_str().to_string(),
            vendor_id,
        }
    }
}
