//! Conversation list of an identity.

use std::cmp::Reverse;

use crate::api::ChatApi;
use crate::domain::{ConversationSummary, Identity};
use crate::error::RealtimeError;

/// Fetches the conversations of `identity`, most recently active first.
///
/// Activity is the last message time, falling back to the last update of
/// the conversation document. Entries with neither sort last.
///
/// # Errors
///
/// Returns the collaborator's error unchanged.
pub async fn load_conversations(
    api: &dyn ChatApi,
    identity: &Identity,
) -> Result<Vec<ConversationSummary>, RealtimeError> {
    let mut conversations = api.list_conversations(identity).await?;
    sort_by_activity(&mut conversations);
    tracing::debug!(%identity, count = conversations.len(), "conversations loaded");
    Ok(conversations)
}

/// Orders conversations newest activity first. Stable for ties.
pub fn sort_by_activity(conversations: &mut [ConversationSummary]) {
    conversations.sort_by_key(|c| Reverse(c.activity_at()));
}
