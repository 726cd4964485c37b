use crate::error::AdapterError;

use super::ResponsesStreamEvent;

/// Parse one SSE `data:` payload into a [`ResponsesStreamEvent`].
///
/// Returns `Ok(None)` for payloads that carry no event: blank data and the
/// `[DONE]` sentinel. Unknown `type` values parse as
/// [`ResponsesStreamEvent::Unknown`].
///
/// # Errors
///
/// Returns [`AdapterError::Decode`] when the payload is not a valid event.
pub fn parse_responses_stream_event(
    data: &str,
) -> Result<Option<ResponsesStreamEvent>, AdapterError> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| AdapterError::Decode(format!("invalid Responses stream event: {e}")))
}
