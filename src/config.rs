//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). A single base URL feeds both the REST
//! collaborators and the real-time transport endpoint.

use std::time::Duration;

use reqwest::Url;

use crate::error::RealtimeError;

/// Top-level client configuration.
///
/// Loaded once at startup via [`RealtimeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Base URL of the marketplace backend (e.g. `http://localhost:5000`).
    pub api_base_url: Url,

    /// Path of the WebSocket endpoint on the backend host.
    pub socket_path: String,

    /// Per-request timeout for REST calls.
    pub http_timeout: Duration,

    /// Quiet window after which the peer typing flag clears.
    pub typing_quiet_window: Duration,

    /// Delay before the first reconnect attempt.
    pub reconnect_delay: Duration,

    /// Upper bound for the reconnect backoff.
    pub reconnect_max_delay: Duration,

    /// Maximum reconnect attempts per link loss (0 = unlimited).
    pub reconnect_max_attempts: u32,

    /// Capacity of the outbound transport queue.
    pub outbound_queue_capacity: usize,

    /// How long a toast stays visible on the delivery surface.
    pub toast_auto_close: Duration,
}

impl RealtimeConfig {
    /// Builds a configuration with default tuning for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidConfig`] if `api_base_url` is not an
    /// absolute `http` or `https` URL.
    pub fn new(api_base_url: &str) -> Result<Self, RealtimeError> {
        Self::from_lookup(|key| (key == "API_BASE_URL").then(|| api_base_url.to_string()))
    }

    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidConfig`] if `API_BASE_URL` is set
    /// but is not an absolute `http` or `https` URL.
    pub fn from_env() -> Result<Self, RealtimeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidConfig`] if the base URL is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RealtimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_base = lookup("API_BASE_URL").unwrap_or_else(|| "http://localhost:5000".to_string());
        let api_base_url = Url::parse(&raw_base)
            .map_err(|e| RealtimeError::InvalidConfig(format!("API_BASE_URL {raw_base}: {e}")))?;
        if !matches!(api_base_url.scheme(), "http" | "https") {
            return Err(RealtimeError::InvalidConfig(format!(
                "API_BASE_URL must use http or https, got {}",
                api_base_url.scheme()
            )));
        }

        let socket_path = lookup("SOCKET_PATH").unwrap_or_else(|| "/ws".to_string());

        Ok(Self {
            api_base_url,
            socket_path,
            http_timeout: Duration::from_secs(parse_with(&lookup, "HTTP_TIMEOUT_SECS", 10)),
            typing_quiet_window: Duration::from_millis(parse_with(&lookup, "TYPING_QUIET_MS", 1_500)),
            reconnect_delay: Duration::from_millis(parse_with(&lookup, "RECONNECT_DELAY_MS", 1_000)),
            reconnect_max_delay: Duration::from_millis(parse_with(
                &lookup,
                "RECONNECT_MAX_DELAY_MS",
                5_000,
            )),
            reconnect_max_attempts: parse_with(&lookup, "RECONNECT_MAX_ATTEMPTS", 0),
            outbound_queue_capacity: parse_with(&lookup, "OUTBOUND_QUEUE_CAPACITY", 256).max(1),
            toast_auto_close: Duration::from_millis(parse_with(&lookup, "TOAST_AUTO_CLOSE_MS", 5_000)),
        })
    }

    /// Returns the WebSocket endpoint derived from the base URL.
    ///
    /// `http` becomes `ws`, `https` becomes `wss`, and the socket path is
    /// appended to whatever path prefix the base URL carried.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidConfig`] if the scheme cannot be
    /// rewritten.
    pub fn socket_endpoint(&self) -> Result<String, RealtimeError> {
        let mut url = self.rest_url(&self.socket_path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| RealtimeError::InvalidConfig(format!("cannot derive {scheme} endpoint")))?;
        Ok(url.to_string())
    }

    /// Appends a REST path (e.g. `/api/chat/1/messages`) to the base URL,
    /// keeping any path prefix the base carries.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidConfig`] if the result is not a
    /// valid URL.
    pub fn rest_url(&self, path: &str) -> Result<Url, RealtimeError> {
        let mut base = self.api_base_url.clone();
        base.set_query(None);
        base.set_fragment(None);
        if !base.path().ends_with('/') {
            let prefix = format!("{}/", base.path());
            base.set_path(&prefix);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| RealtimeError::InvalidConfig(format!("bad path {path}: {e}")))
    }
}

/// Parses a looked-up value as `T`, returning `default` on missing or
/// invalid values.
fn parse_with<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<RealtimeConfig, RealtimeError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RealtimeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let Ok(cfg) = config_from(&[]) else {
            panic!("default config must load");
        };
        assert_eq!(cfg.api_base_url.as_str(), "http://localhost:5000/");
        assert_eq!(cfg.typing_quiet_window, Duration::from_millis(1_500));
        assert_eq!(cfg.reconnect_max_attempts, 0);
        assert_eq!(cfg.toast_auto_close, Duration::from_secs(5));
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let Ok(cfg) = config_from(&[("TYPING_QUIET_MS", "soon"), ("HTTP_TIMEOUT_SECS", "3")]) else {
            panic!("config must load");
        };
        assert_eq!(cfg.typing_quiet_window, Duration::from_millis(1_500));
        assert_eq!(cfg.http_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_non_http_base() {
        let result = config_from(&[("API_BASE_URL", "ftp://example.com")]);
        assert!(matches!(result, Err(RealtimeError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_garbage_base() {
        let result = config_from(&[("API_BASE_URL", "not a url")]);
        assert!(matches!(result, Err(RealtimeError::InvalidConfig(_))));
    }

    #[test]
    fn socket_endpoint_swaps_scheme() {
        let Ok(cfg) = config_from(&[("API_BASE_URL", "https://api.example.com")]) else {
            panic!("config must load");
        };
        assert_eq!(
            cfg.socket_endpoint().unwrap_or_default(),
            "wss://api.example.com/ws"
        );

        let Ok(plain) = RealtimeConfig::new("http://127.0.0.1:9000") else {
            panic!("config must load");
        };
        assert_eq!(
            plain.socket_endpoint().unwrap_or_default(),
            "ws://127.0.0.1:9000/ws"
        );
    }

    #[test]
    fn rest_url_joins_path() {
        let Ok(cfg) = RealtimeConfig::new("http://localhost:5000") else {
            panic!("config must load");
        };
        let Ok(url) = cfg.rest_url("/api/chat/c1/messages") else {
            panic!("join must succeed");
        };
        assert_eq!(url.as_str(), "http://localhost:5000/api/chat/c1/messages");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        for base in ["https://example.com/backend", "https://example.com/backend/"] {
            let Ok(cfg) = RealtimeConfig::new(base) else {
                panic!("config must load");
            };
            let Ok(url) = cfg.rest_url("/api/chat/c1/messages") else {
                panic!("join must succeed");
            };
            assert_eq!(url.as_str(), "https://example.com/backend/api/chat/c1/messages");
            assert_eq!(
                cfg.socket_endpoint().unwrap_or_default(),
                "wss://example.com/backend/ws"
            );
        }
    }
}
