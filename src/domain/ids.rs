//! Type-safe identifiers.
//!
//! Backend documents are keyed by opaque string ids (`_id`). Each id kind
//! gets its own newtype so a chat id can never be passed where a
//! notification id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing id string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Identifier of a two-party conversation (chat room).
    ChatId
}

string_id! {
    /// Identifier of a user or vendor account.
    IdentityId
}

string_id! {
    /// Identifier assigned to a message by the remote store.
    MessageId
}

string_id! {
    /// Identifier assigned to a notification by the remote store.
    NotificationId
}

string_id! {
    /// Identifier of a booking.
    BookingId
}
