use std::time::Duration;

use crate::config::ConfigError;

/// Error type shared by request building, transport and response decoding.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Unsupported content: {part}: {reason}")]
    UnsupportedContent { part: String, reason: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("API error: {0}")]
    Api(ApiError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<ConfigError> for AdapterError {
    fn from(err: ConfigError) -> Self {
        AdapterError::Config(err.to_string())
    }
}

impl From<ApiError> for AdapterError {
    fn from(err: ApiError) -> Self {
        AdapterError::Api(err)
    }
}

/// Broad error category derived from the backend HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map a backend HTTP status code to an error category.
#[must_use]
pub fn category_from_status(status: u16) -> ErrorCategory {
    match status {
        400 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        404 => ErrorCategory::NotFound,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

/// Structured error built from a non-2xx backend response.
///
/// The backend envelope is `{ "error": { "message", "type"?, "param"?, "code"? } }`;
/// `retry_after` is only populated from a `Retry-After` header.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("status={status}, message={message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub param: Option<String>,
    pub retry_after: Option<Duration>,
}

impl ApiError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        category_from_status(self.status)
    }

    /// Whether an external retry policy may retry this call. Nothing in this
    /// crate acts on it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::ServerError
        ) || self.status == 408
    }
}

impl AdapterError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            AdapterError::UnsupportedContent { .. } | AdapterError::InvalidRequest(_) => {
                ErrorCategory::InvalidRequest
            }
            AdapterError::Api(api) => api.category(),
            AdapterError::Config(_) | AdapterError::Transport(_) | AdapterError::Decode(_) => {
                ErrorCategory::Unknown
            }
        }
    }

    /// Shorthand used by the request builder.
    pub(crate) fn unsupported(part: impl Into<String>, reason: impl Into<String>) -> Self {
        AdapterError::UnsupportedContent {
            part: part.into(),
            reason: reason.into(),
        }
    }
}
