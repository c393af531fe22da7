//! `reqwest` implementation of the REST collaborators.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ChatApi, NewMessage, NotificationApi};
use crate::config::RealtimeConfig;
use crate::domain::events::unwrap_payload;
use crate::domain::{ChatId, ChatMessage, ConversationSummary, Identity, Notification, NotificationId};
use crate::error::RealtimeError;

/// HTTP client for the marketplace backend.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    config: RealtimeConfig,
}

impl RestClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Internal`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &RealtimeConfig) -> Result<Self, RealtimeError> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| RealtimeError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, RealtimeError> {
        self.config.rest_url(path)
    }

    /// Sends a request and turns non-success statuses into errors.
    async fn execute(request: RequestBuilder) -> Result<Response, RealtimeError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), %body, "remote store rejected request");
        Err(RealtimeError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
    ) -> Result<Vec<T>, RealtimeError> {
        let url = self.url(path)?;
        let response = Self::execute(self.http.get(url)).await?;
        let value: Value = response.json().await?;
        decode_list(value, key)
    }
}

/// Decodes a bare JSON array or an object holding the array under `key`.
fn decode_list<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>, RealtimeError> {
    let list = match value {
        Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
        other => other,
    };
    if !list.is_array() {
        return Err(RealtimeError::Decode(format!("{key}: expected a list")));
    }
    serde_json::from_value(list).map_err(|e| RealtimeError::Decode(format!("{key}: {e}")))
}

#[async_trait]
impl ChatApi for RestClient {
    async fn fetch_messages(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, RealtimeError> {
        self.get_list(&format!("/api/chat/{chat_id}/messages"), "messages")
            .await
    }

    async fn post_message(
        &self,
        message: &NewMessage,
    ) -> Result<Option<ChatMessage>, RealtimeError> {
        let url = self.url(&format!("/api/chat/{}/message", message.chat_id))?;
        let response = Self::execute(self.http.post(url).json(message)).await?;
        let text = response.text().await?;
        let stored = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|value| unwrap_payload::<ChatMessage>(&value, "message").ok());
        Ok(stored)
    }

    async fn list_conversations(
        &self,
        identity: &Identity,
    ) -> Result<Vec<ConversationSummary>, RealtimeError> {
        let path = format!(
            "/api/chat/{}/{}",
            identity.kind.chat_list_segment(),
            identity.id
        );
        self.get_list(&path, "chats").await
    }
}

#[async_trait]
impl NotificationApi for RestClient {
    async fn fetch_notifications(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Notification>, RealtimeError> {
        let path = format!("/api/notifications/{}/{}", identity.id, identity.kind);
        self.get_list(&path, "notifications").await
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), RealtimeError> {
        let url = self.url(&format!("/api/notifications/mark-read/{id}"))?;
        Self::execute(self.http.put(url)).await?;
        Ok(())
    }
}
