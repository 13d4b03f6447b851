//! Error types for the admin API client.
//!
//! # Design
//! `SessionExpired` is its own variant because callers must react to it
//! differently from every other failure: credentials are already cleared and
//! the user has to sign in again. All other non-2xx responses land in `Http`
//! with the status, whatever error body could be parsed and a display message.

use serde_json::Value;
use thiserror::Error;

/// Errors returned by `ApiClient` requests.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received at all.
    #[error("network error: {0}")]
    Network(String),

    /// The access token was rejected and could not be refreshed.
    #[error("session expired, sign in again")]
    SessionExpired,

    /// The server answered with a failure status, or with a body that is not JSON.
    #[error("{0}")]
    Http(HttpFailure),

    /// The response body was JSON but not of the expected shape.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Credentials could not be saved or removed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// HTTP status of the failing response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http(failure) => Some(failure.status),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Network(err.0)
    }
}

/// Body attached to an `HttpFailure`.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureBody {
    /// Nothing usable was sent.
    None,
    /// A JSON error document.
    Json(Value),
    /// A success status whose body could not be parsed as JSON.
    Unparsed(String),
}

/// A response the client could not turn into a value.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpFailure {
    pub status: u16,
    pub body: FailureBody,
    pub message: String,
}

impl HttpFailure {
    /// Build a failure from an error response, using `message` from the JSON
    /// body when the server provided one.
    pub fn from_error_body(status: u16, raw: &str) -> Self {
        let body = match serde_json::from_str::<Value>(raw) {
            Ok(value) => FailureBody::Json(value),
            Err(_) => FailureBody::None,
        };
        let message = match &body {
            FailureBody::Json(value) => value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
        .unwrap_or_else(|| status_line(status));
        Self {
            status,
            body,
            message,
        }
    }

    pub(crate) fn unparsed(status: u16, raw: String, reason: &serde_json::Error) -> Self {
        Self {
            status,
            body: FailureBody::Unparsed(raw),
            message: format!("invalid JSON in response body: {reason}"),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

fn status_line(status: u16) -> String {
    let reason = ::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("");
    format!("HTTP Error: {status} {reason}").trim_end().to_string()
}

/// The transport could not complete the round-trip.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A credential store could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Client configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
