//! Pull API client.
//!
//! [`ChatApi`] is the seam the synchronization core talks to; [`HttpChatApi`]
//! implements it over HTTP with `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, header};
use serde::de::DeserializeOwned;
use shared::{
    config::Config,
    models::{
        ConversationDetail, ConversationId, ConversationRecord, CreateMessageRequest,
        ErrorResponse, Fan, FanId, Message, MessageId, PriorityLevel, PriorityUpdateRequest,
    },
};
use thiserror::Error;
use tracing::{debug, instrument};

/// Failures talking to the pull API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, TLS, or body transfer failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The body did not match the expected shape
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status, when the API answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Operations the console needs from the backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /conversations`
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, ApiError>;

    /// `GET /conversation/{id}?before={before}&limit={limit}`; returns the page of messages.
    async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError>;

    /// `POST /message`
    async fn create_message(&self, request: &CreateMessageRequest) -> Result<Message, ApiError>;

    /// `POST /conversation/{id}/mark-read`
    async fn mark_read(&self, conversation_id: ConversationId) -> Result<(), ApiError>;

    /// `PUT /conversation/{id}/priority`
    async fn set_priority(
        &self,
        conversation_id: ConversationId,
        level: PriorityLevel,
    ) -> Result<(), ApiError>;

    /// `GET /fan/{id}`
    async fn fetch_fan(&self, fan_id: FanId) -> Result<Fan, ApiError>;
}

/// HTTP implementation of [`ChatApi`].
#[derive(Clone, Debug)]
pub struct HttpChatApi {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl HttpChatApi {
    /// Create a client for the given API base (e.g. `http://127.0.0.1:8000/api`).
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            token,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.api_base_url, config.api_token.clone())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn prepare(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn checked(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            ErrorResponse::from_body(&body).to_string()
        };
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let bytes = Self::checked(response).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    #[instrument(skip(self))]
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        let request = self.prepare(self.client.get(self.api_url("conversations")));
        Self::decode(request.send().await?).await
    }

    #[instrument(skip(self))]
    async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let mut request = self
            .client
            .get(self.api_url(&format!("conversation/{conversation_id}")))
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            request = request.query(&[("before", before.to_string())]);
        }

        let detail: ConversationDetail = Self::decode(self.prepare(request).send().await?).await?;
        debug!(count = detail.messages.len(), "fetched messages");
        Ok(detail.messages)
    }

    #[instrument(skip(self, request), fields(conversation_id = request.conversation_id))]
    async fn create_message(&self, request: &CreateMessageRequest) -> Result<Message, ApiError> {
        let builder = self
            .prepare(self.client.post(self.api_url("message")))
            .json(request);
        Self::decode(builder.send().await?).await
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        let request = self.prepare(
            self.client
                .post(self.api_url(&format!("conversation/{conversation_id}/mark-read"))),
        );
        Self::checked(request.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_priority(
        &self,
        conversation_id: ConversationId,
        level: PriorityLevel,
    ) -> Result<(), ApiError> {
        let request = self
            .prepare(
                self.client
                    .put(self.api_url(&format!("conversation/{conversation_id}/priority"))),
            )
            .json(&PriorityUpdateRequest {
                priority_level: level,
            });
        Self::checked(request.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_fan(&self, fan_id: FanId) -> Result<Fan, ApiError> {
        let request = self.prepare(self.client.get(self.api_url(&format!("fan/{fan_id}"))));
        Self::decode(request.send().await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_joins_without_double_slashes() {
        let api = HttpChatApi::new("http://127.0.0.1:8000/api/", None);
        assert_eq!(api.base_url(), "http://127.0.0.1:8000/api");
        assert_eq!(
            api.api_url("/conversation/5"),
            "http://127.0.0.1:8000/api/conversation/5"
        );
    }

    #[test]
    fn status_error_exposes_code() {
        let err = ApiError::Status {
            status: 500,
            message: "Error fetching conversation: boom".into(),
        };
        assert_eq!(err.status(), Some(500));
        assert_eq!(
            err.to_string(),
            "API returned 500: Error fetching conversation: boom"
        );
        assert_eq!(ApiError::Decode("x".into()).status(), None);
    }

    #[test]
    fn from_config_uses_configured_base_and_token() {
        let mut config = Config::with_defaults();
        config.api_token = Some("t0k".into());
        let api = HttpChatApi::from_config(&config);
        assert_eq!(api.base_url(), "http://127.0.0.1:8000/api");
        assert_eq!(api.token.as_deref(), Some("t0k"));
    }
}
