//! Account identities: the unit of notification addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::IdentityId;

/// Kind of account on the marketplace.
///
/// Serialized as `"User"` / `"Vendor"`, which is also the path segment the
/// notification endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityType {
    /// A customer browsing and booking services.
    User,
    /// A vendor listing services and packages.
    Vendor,
}

impl IdentityType {
    /// Returns the wire representation (`"User"` or `"Vendor"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Vendor => "Vendor",
        }
    }

    /// Returns the path segment of the conversation list endpoint.
    #[must_use]
    pub const fn chat_list_segment(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Vendor => "vendor",
        }
    }

    /// Parses the wire form, case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("user") {
            Some(Self::User)
        } else if raw.eq_ignore_ascii_case("vendor") {
            Some(Self::Vendor)
        } else {
            None
        }
    }
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user or vendor account that can receive events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Account id.
    pub id: IdentityId,
    /// Account kind.
    pub kind: IdentityType,
}

impl Identity {
    /// Creates a user identity.
    #[must_use]
    pub fn user(id: impl Into<IdentityId>) -> Self {
        Self {
            id: id.into(),
            kind: IdentityType::User,
        }
    }

    /// Creates a vendor identity.
    #[must_use]
    pub fn vendor(id: impl Into<IdentityId>) -> Self {
        Self {
            id: id.into(),
            kind: IdentityType::Vendor,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
