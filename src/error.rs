//! Client error taxonomy with stable numeric codes.
//!
//! [`RealtimeError`] is the single error type of the crate. Every variant
//! carries owned text rather than a foreign error, so the type is `Clone`
//! and a view can keep the last failure around as its error flag.

/// Client-side error enum with stable numeric codes.
///
/// # Error Code Ranges
///
/// | Range     | Category     | Retryable |
/// |-----------|--------------|-----------|
/// | 1000–1999 | Validation   | no        |
/// | 2000–2999 | Transport    | yes       |
/// | 3000–3999 | Remote store | mostly    |
/// | 4000–4999 | Internal     | no        |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    /// Outbound message content was empty or whitespace-only.
    #[error("message content must not be empty")]
    EmptyMessage,

    /// The conversation history has not finished loading.
    #[error("conversation is not ready: {0}")]
    NotReady(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The real-time transport could not be reached or was closed.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The REST request failed before a response arrived.
    #[error("http error: {0}")]
    Http(String),

    /// The REST endpoint answered with a non-success status.
    #[error("remote store answered {status}: {body}")]
    Status {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// A payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Internal invariant failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::EmptyMessage => 1001,
            Self::NotReady(_) => 1002,
            Self::InvalidConfig(_) => 1003,
            Self::TransportUnavailable(_) => 2001,
            Self::Http(_) => 3001,
            Self::Status { .. } => 3002,
            Self::Decode(_) => 3003,
            Self::Internal(_) => 4000,
        }
    }

    /// Returns `true` if repeating the same operation may succeed.
    ///
    /// Client errors (4xx) from the remote store are not retryable; every
    /// other network-side failure is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::TransportUnavailable(_) | Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::EmptyMessage
            | Self::NotReady(_)
            | Self::InvalidConfig(_)
            | Self::Decode(_)
            | Self::Internal(_) => false,
        }
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
