//! Unified error handling for the client.

use parsekit_engine::codes;
use serde_json::Value as Json;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Client error type.
///
/// Every variant carries a numeric code and a message through
/// [`Error::code`] and [`Error::message`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] parsekit_engine::Error),

    /// Structured error returned by the backend.
    #[error("Remote error {code}: {message}")]
    Remote {
        code: i32,
        message: String,
        /// HTTP status, when the error came with a response
        status: Option<u16>,
    },

    /// The request never produced a response.
    #[error("Connection failed: {message}")]
    Connectivity { message: String, timeout: bool },

    #[error("Client not initialized: {0}")]
    NotInitialized(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Live query error: {0}")]
    LiveQuery(String),
}

impl Error {
    /// Numeric code in the backend's numbering.
    pub fn code(&self) -> i32 {
        match self {
            Error::Engine(e) => e.code(),
            Error::Remote { code, .. } => *code,
            Error::Connectivity { timeout: true, .. } => codes::TIMEOUT,
            Error::Connectivity { .. } => codes::CONNECTION_FAILED,
            Error::NotInitialized(_) | Error::Config(_) => codes::NOT_INITIALIZED,
            Error::InvalidFileName(_) => codes::INVALID_FILE_NAME,
            Error::Storage(_) | Error::LiveQuery(_) => codes::OTHER_CAUSE,
        }
    }

    /// Human-readable message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Remote { message, .. } | Error::Connectivity { message, .. } => message.clone(),
            Error::Engine(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == codes::OBJECT_NOT_FOUND
    }

    /// Failures worth resubmitting: no response at all, or a 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connectivity { .. } => true,
            Error::Remote {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// Build a remote error from a response with a non-success status.
    ///
    /// Bodies of the form `{"code": n, "error": "..."}` (or `message`) are
    /// surfaced verbatim; anything else falls back to the status line.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        let parsed: Option<Json> = serde_json::from_slice(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|b| b.get("code"))
            .and_then(Json::as_i64)
            .and_then(|c| i32::try_from(c).ok());
        let message = parsed.as_ref().and_then(|b| {
            b.get("error")
                .or_else(|| b.get("message"))
                .and_then(Json::as_str)
                .map(str::to_owned)
        });

        Error::Remote {
            code: code.unwrap_or(if status >= 500 {
                codes::INTERNAL_SERVER_ERROR
            } else {
                codes::OTHER_CAUSE
            }),
            message: message.unwrap_or_else(|| format!("request failed with status {status}")),
            status: Some(status),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Connectivity {
            message: e.message,
            timeout: e.timeout,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
