use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when an API or push payload cannot be coerced into a core model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A required field was absent or null
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// Sender was neither `fan` nor `chatter`
    #[error("invalid sender `{0}`")]
    InvalidSender(String),

    /// Timestamp did not match any accepted format
    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),

    /// Priority outside the 0..=3 range
    #[error("invalid priority level {0}")]
    InvalidPriority(i64),

    /// An integer field that was neither a number nor a numeric string
    #[error("invalid integer value for `{field}`: {value}")]
    InvalidInteger { field: &'static str, value: String },

    /// A boolean flag that was not `true`/`false`/`0`/`1`
    #[error("invalid flag value for `{field}`: {value}")]
    InvalidFlag { field: &'static str, value: String },

    /// Push payload body was not valid JSON for its event
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Error body returned by the chatter API.
///
/// The API answers failures either with a JSON `{"message": ...}` body or with
/// plain text; [`ErrorResponse::from_body`] handles both.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// The main error message
    pub message: String,
    /// Optional additional details about the error
    #[serde(default)]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Interpret a raw response body, falling back to the trimmed text.
    #[must_use]
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str::<Self>(body).unwrap_or_else(|_| Self::new(body.trim()))
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ErrorResponse {}
