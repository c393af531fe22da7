//! Booking documents as pushed by `bookingUpdated`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::BookingId;

/// Booking lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Awaiting vendor confirmation.
    Pending,
    /// Accepted by the vendor.
    Confirmed,
    /// Cancelled by either side.
    Cancelled,
    /// Service delivered.
    Completed,
    /// Any other status, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Confirmed => f.write_str("confirmed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Completed => f.write_str("completed"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// A booking document. Only the id and status are interpreted; every
/// other field is carried through untouched for the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id.
    #[serde(rename = "_id", alias = "id")]
    pub id: BookingId,
    /// Current status.
    pub status: BookingStatus,
    /// Remaining document fields.
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn keeps_unknown_fields() {
        let json = r#"{"_id":"b1","status":"confirmed","eventDate":"2024-09-01","price":1200}"#;
        let Ok(booking) = serde_json::from_str::<Booking>(json) else {
            panic!("booking must decode");
        };
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(
            booking.details.get("price"),
            Some(&serde_json::Value::from(1200))
        );
    }

    #[test]
    fn unknown_status_displays_verbatim() {
        let status: BookingStatus =
            serde_json::from_str("\"rescheduled\"").unwrap_or(BookingStatus::Pending);
        assert_eq!(status.to_string(), "rescheduled");
    }
}
