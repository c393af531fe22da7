//! Conversation list entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChatId, IdentityId};

/// Reference to a participant, either a bare id or a populated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParticipantRef {
    /// Only the id is known.
    Id(IdentityId),
    /// The backend populated the account document.
    Populated {
        /// Account id.
        #[serde(rename = "_id")]
        id: IdentityId,
        /// Display name (`fullName` for users, `ownerName` for vendors).
        #[serde(
            default,
            alias = "fullName",
            alias = "ownerName",
            skip_serializing_if = "Option::is_none"
        )]
        name: Option<String>,
    },
}

impl ParticipantRef {
    /// Returns the participant id.
    #[must_use]
    pub fn id(&self) -> &IdentityId {
        match self {
            Self::Id(id) | Self::Populated { id, .. } => id,
        }
    }

    /// Returns the display name, when populated.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Populated { name, .. } => name.as_deref(),
        }
    }
}

/// One two-party conversation as listed for an identity.
///
/// A conversation always has exactly one user and one vendor, fixed when
/// the backend created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation id.
    #[serde(rename = "_id", alias = "id")]
    pub id: ChatId,
    /// The user participant.
    pub user_id: ParticipantRef,
    /// The vendor participant.
    pub vendor_id: ParticipantRef,
    /// Preview of the most recent message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Time of the most recent message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_date: Option<DateTime<Utc>>,
    /// Last modification of the conversation document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationSummary {
    /// Activity time used for ordering: last message, else last update.
    #[must_use]
    pub fn activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_message_date.or(self.updated_at)
    }

    /// Returns the participant that is not `viewer`, if `viewer` takes part.
    #[must_use]
    pub fn counterpart(&self, viewer: &IdentityId) -> Option<&ParticipantRef> {
        if self.user_id.id() == viewer {
            Some(&self.vendor_id)
        } else if self.vendor_id.id() == viewer {
            Some(&self.user_id)
        } else {
            None
        }
    }
}
