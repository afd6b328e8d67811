use async_trait::async_trait;
use thiserror::Error;

use crate::llm::types::ConversationTurn;

/// What a backend can consume and produce. The Decision Client shapes each
/// request from these flags alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub accepts_image: bool,
    pub accepts_element_list: bool,
    pub returns_structured_json: bool,
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub media_type: &'static str,
    pub base64: String,
}

impl EncodedImage {
    pub fn png(base64: String) -> Self {
        Self { media_type: "image/png", base64 }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64)
    }
}

/// One decision request. `turns` is a copy of the history taken before the
/// call; `prompt` and `image` form the new user turn.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub turns: Vec<ConversationTurn>,
    pub prompt: String,
    pub image: Option<EncodedImage>,
}

/// Failure of a single backend attempt.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Worth another attempt after backing off.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout(_) | BackendError::RateLimited(_) | BackendError::Transient(_)
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let msg = format!("{status}: {body}");
        match status.as_u16() {
            401 | 403 => BackendError::Auth(msg),
            408 => BackendError::Transient(msg),
            429 => BackendError::RateLimited(msg),
            500..=599 => BackendError::Transient(msg),
            _ => BackendError::Rejected(msg),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            BackendError::Transient(e.to_string())
        } else if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else {
            BackendError::Rejected(e.to_string())
        }
    }
}

/// A remote reasoning service. Implementations perform exactly one attempt
/// and return the raw text of the reply; retries and timeouts live in the
/// Decision Client.
#[async_trait]
pub trait DecisionBackend: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    async fn complete(&self, request: &DecisionRequest) -> Result<String, BackendError>;
}
