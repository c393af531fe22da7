//! Notifications addressed to a user or vendor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Identity, IdentityId, IdentityType, NotificationId};

/// Category of a notification.
///
/// Unknown categories decode into [`NotificationKind::Other`] so a new
/// backend type never breaks the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A new chat message arrived.
    Message,
    /// A booking was created or changed.
    Booking,
    /// Any other category, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

/// A single notification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-issued id; unique within a recipient's list.
    #[serde(rename = "_id", alias = "id")]
    pub id: NotificationId,

    /// Account the notification is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<IdentityId>,

    /// Kind of the recipient account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_type: Option<IdentityType>,

    /// Human-readable text.
    pub message: String,

    /// Navigation target, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Category.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: NotificationKind,

    /// Creation time on the server.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Read flag; only ever flips false to true locally.
    #[serde(default)]
    pub is_read: bool,
}

fn default_kind() -> NotificationKind {
    NotificationKind::Other(String::new())
}

/// Where a click on a notification should take the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    /// The conversation list of the viewing identity.
    ChatList(IdentityType),
    /// The bookings view of the viewing identity.
    Bookings(IdentityType),
    /// An explicit link carried by the notification.
    Link(String),
    /// Landing page.
    Home,
}

impl NavigationTarget {
    /// Returns the route string the navigation collaborator expects.
    #[must_use]
    pub fn route(&self) -> &str {
        match self {
            Self::ChatList(IdentityType::User) => "/user-chats",
            Self::ChatList(IdentityType::Vendor) => "/vendor-chats",
            Self::Bookings(IdentityType::User) => "/my-bookings",
            Self::Bookings(IdentityType::Vendor) => "/vendor-bookings",
            Self::Link(link) => link,
            Self::Home => "/",
        }
    }
}

impl Notification {
    /// Returns `false` when the document names a different recipient.
    ///
    /// Missing recipient fields match any identity, since pushes on an
    /// identity channel often omit them.
    #[must_use]
    pub fn is_addressed_to(&self, identity: &Identity) -> bool {
        self.recipient_id.as_ref().is_none_or(|id| *id == identity.id)
            && self.recipient_type.is_none_or(|kind| kind == identity.kind)
    }

    /// Resolves the click target for a viewer of the given kind.
    ///
    /// Message notifications always open the chat list; otherwise an
    /// explicit link wins, then the booking view, then home.
    #[must_use]
    pub fn navigation_target(&self, viewer: IdentityType) -> NavigationTarget {
        if self.kind == NotificationKind::Message {
            return NavigationTarget::ChatList(viewer);
        }
        if let Some(link) = self.link.as_deref().filter(|l| !l.is_empty()) {
            return NavigationTarget::Link(link.to_string());
        }
        match self.kind {
            NotificationKind::Booking => NavigationTarget::Bookings(viewer),
            _ => NavigationTarget::Home,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Notification {
        let Ok(n) = serde_json::from_str::<Notification>(json) else {
            panic!("notification must decode: {json}");
        };
        n
    }

    #[test]
    fn decodes_backend_document() {
        let n = decode(
            r#"{"_id":"n1","recipientId":"v1","recipientType":"Vendor",
                "message":"New booking","link":"/vendor-bookings","type":"booking",
                "createdAt":"2024-05-01T10:00:00Z","isRead":false}"#,
        );
        assert_eq!(n.id, NotificationId::from("n1"));
        assert_eq!(n.recipient_type, Some(IdentityType::Vendor));
        assert_eq!(n.kind, NotificationKind::Booking);
        assert!(!n.is_read);
    }

    #[test]
    fn recipient_fields_select_the_identity() {
        let vendor = decode(r#"{"_id":"n1","recipientId":"v1","recipientType":"Vendor","message":"m"}"#);
        assert!(vendor.is_addressed_to(&Identity::vendor("v1")));
        assert!(!vendor.is_addressed_to(&Identity::user("u1")));
        assert!(!vendor.is_addressed_to(&Identity::user("v1")));

        let bare = decode(r#"{"_id":"n2","message":"m"}"#);
        assert!(bare.is_addressed_to(&Identity::user("u1")));
    }

    #[test]
    fn unknown_kind_is_kept() {
        let n = decode(r#"{"_id":"n2","message":"Review posted","type":"review"}"#);
        assert_eq!(n.kind, NotificationKind::Other("review".to_string()));
    }

    #[test]
    fn message_kind_routes_to_chat_list() {
        let n = decode(r#"{"_id":"n3","message":"Hi","type":"message","link":"/x"}"#);
        assert_eq!(
            n.navigation_target(IdentityType::Vendor).route(),
            "/vendor-chats"
        );
    }

    #[test]
    fn link_wins_over_booking_default() {
        let n = decode(r#"{"_id":"n4","message":"Confirmed","type":"booking","link":"/b/7"}"#);
        assert_eq!(
            n.navigation_target(IdentityType::User),
            NavigationTarget::Link("/b/7".to_string())
        );

        let bare = decode(r#"{"_id":"n5","message":"Confirmed","type":"booking"}"#);
        assert_eq!(bare.navigation_target(IdentityType::User).route(), "/my-bookings");
    }

    #[test]
    fn unknown_without_link_goes_home() {
        let n = decode(r#"{"_id":"n6","message":"?"}"#);
        assert_eq!(n.navigation_target(IdentityType::User), NavigationTarget::Home);
    }
}
