use std::time::Duration;

use serde::Deserialize;

use crate::error::ApiError;
use crate::util::json_scalar_to_string;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    param: Option<serde_json::Value>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Build an [`ApiError`] from a non-2xx backend body.
///
/// Bodies that are not the `{"error": {...}}` envelope keep their raw text
/// as the message.
#[must_use]
pub(crate) fn api_error_from_body(
    status: u16,
    body: &[u8],
    retry_after: Option<Duration>,
) -> ApiError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => ApiError {
            status,
            message: envelope
                .error
                .message
                .unwrap_or_else(|| format!("HTTP {status}")),
            error_type: envelope.error.error_type,
            code: envelope.error.code.as_ref().and_then(json_scalar_to_string),
            param: envelope.error.param.as_ref().and_then(json_scalar_to_string),
            retry_after,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            ApiError {
                status,
                message: if text.is_empty() {
                    format!("HTTP {status}")
                } else {
                    text
                },
                error_type: None,
                code: None,
                param: None,
                retry_after,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_string_code() {
        let body = br#"{"error":{"message":"Rate limit reached","type":"requests","param":null,"code":"rate_limit_exceeded"}}"#;
        let err = api_error_from_body(429, body, Some(Duration::from_secs(2)));
        assert_eq!(err.message, "Rate limit reached");
        assert_eq!(err.error_type.as_deref(), Some("requests"));
        assert_eq!(err.code.as_deref(), Some("rate_limit_exceeded"));
        assert_eq!(err.param, None);
        assert_eq!(err.retry_after, Some(Duration::from_secs(2)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_envelope_with_numeric_code() {
        let body = br#"{"error":{"message":"bad","code":400,"param":"input"}}"#;
        let err = api_error_from_body(400, body, None);
        assert_eq!(err.code.as_deref(), Some("400"));
        assert_eq!(err.param.as_deref(), Some("input"));
    }

    #[test]
    fn test_non_envelope_body_falls_back_to_text() {
        let err = api_error_from_body(502, b"  upstream connect error ", None);
        assert_eq!(err.message, "upstream connect error");
        assert!(err.code.is_none());

        let err = api_error_from_body(500, b"", None);
        assert_eq!(err.message, "HTTP 500");
    }
}
