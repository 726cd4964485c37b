use serde_json::Value;

use super::canonical::{FinishReason, ProviderMetadata, Usage};
use super::openai_responses::ResponsesUsage;

// ---------------------------------------------------------------------------
// Finish reason
// ---------------------------------------------------------------------------

/// Map a Responses status and incomplete reason into a unified finish reason.
///
/// `has_function_call` promotes an otherwise plain stop (or an unrecognized
/// reason) to `tool-calls`.
#[must_use]
pub fn responses_finish_reason(
    status: Option<&str>,
    incomplete_reason: Option<&str>,
    has_function_call: bool,
) -> FinishReason {
    if status == Some("failed") {
        return FinishReason::Error;
    }
    match incomplete_reason {
        None => {
            if has_function_call {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            }
        }
        Some("max_output_tokens") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(other) => {
            if has_function_call {
                FinishReason::ToolCalls
            } else {
                FinishReason::Other(Some(other.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

/// Convert wire usage into unified usage.
///
/// Sub-splits are derived only when the matching detail is reported. A
/// subcategory larger than its total is kept as reported and the derived
/// split is left absent.
#[must_use]
pub fn responses_usage(usage: &ResponsesUsage) -> Usage {
    let input = usage.input_tokens;
    let output = usage.output_tokens;
    let cached = usage
        .input_tokens_details
        .as_ref()
        .and_then(|d| d.cached_tokens);
    let reasoning = usage
        .output_tokens_details
        .as_ref()
        .and_then(|d| d.reasoning_tokens);

    let no_cache = cached.and_then(|c| {
        let split = input.checked_sub(c);
        if split.is_none() {
            tracing::warn!(
                input_tokens = input,
                cached_tokens = c,
                "cached token count exceeds input tokens"
            );
        }
        split
    });
    let text_output = reasoning.and_then(|r| {
        let split = output.checked_sub(r);
        if split.is_none() {
            tracing::warn!(
                output_tokens = output,
                reasoning_tokens = r,
                "reasoning token count exceeds output tokens"
            );
        }
        split
    });

    Usage {
        input_tokens: Some(input),
        output_tokens: Some(output),
        total_tokens: Some(
            usage
                .total_tokens
                .unwrap_or_else(|| input.saturating_add(output)),
        ),
        cached_input_tokens: cached,
        no_cache_input_tokens: no_cache,
        reasoning_tokens: reasoning,
        text_output_tokens: text_output,
    }
}

// ---------------------------------------------------------------------------
// Provider metadata
// ---------------------------------------------------------------------------

fn wrap(provider_key: &str, inner: serde_json::Map<String, Value>) -> ProviderMetadata {
    let mut metadata = ProviderMetadata::new();
    metadata.insert(provider_key.to_string(), Value::Object(inner));
    metadata
}

/// `{provider: {itemId}}`, attached to text and tool-call items.
#[must_use]
pub fn item_metadata(provider_key: &str, item_id: &str) -> ProviderMetadata {
    let mut inner = serde_json::Map::new();
    inner.insert("itemId".into(), Value::String(item_id.to_string()));
    wrap(provider_key, inner)
}

/// `{provider: {itemId, reasoningEncryptedContent}}`; the encrypted content
/// is carried verbatim and serialized as `null` when absent.
#[must_use]
pub fn reasoning_metadata(
    provider_key: &str,
    item_id: &str,
    encrypted_content: Option<&str>,
) -> ProviderMetadata {
    let mut inner = serde_json::Map::new();
    inner.insert("itemId".into(), Value::String(item_id.to_string()));
    inner.insert(
        "reasoningEncryptedContent".into(),
        encrypted_content.map_or(Value::Null, |c| Value::String(c.to_string())),
    );
    wrap(provider_key, inner)
}

/// `{provider: {responseId?, serviceTier?}}`, attached to the finish event.
/// Empty when neither value was seen.
#[must_use]
pub fn response_metadata(
    provider_key: &str,
    response_id: Option<&str>,
    service_tier: Option<&str>,
) -> ProviderMetadata {
    let mut inner = serde_json::Map::new();
    if let Some(id) = response_id {
        inner.insert("responseId".into(), Value::String(id.to_string()));
    }
    if let Some(tier) = service_tier {
        inner.insert("serviceTier".into(), Value::String(tier.to_string()));
    }
    if inner.is_empty() {
        return ProviderMetadata::new();
    }
    wrap(provider_key, inner)
}

/// Read the backend item id back out of caller-supplied provider metadata.
#[must_use]
pub fn metadata_item_id<'a>(
    metadata: Option<&'a ProviderMetadata>,
    provider_key: &str,
) -> Option<&'a str> {
    metadata?.get(provider_key)?.get("itemId")?.as_str()
}

/// Read the encrypted reasoning blob back out of caller-supplied provider metadata.
#[must_use]
pub fn metadata_encrypted_content<'a>(
    metadata: Option<&'a ProviderMetadata>,
    provider_key: &str,
) -> Option<&'a str> {
    metadata?
        .get(provider_key)?
        .get("reasoningEncryptedContent")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_responses::{
        ResponsesInputTokensDetails, ResponsesOutputTokensDetails,
    };

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(responses_finish_reason(None, None, false), FinishReason::Stop);
        assert_eq!(
            responses_finish_reason(None, None, true),
            FinishReason::ToolCalls
        );
        assert_eq!(
            responses_finish_reason(Some("incomplete"), Some("max_output_tokens"), true),
            FinishReason::Length
        );
        assert_eq!(
            responses_finish_reason(Some("incomplete"), Some("content_filter"), false),
            FinishReason::ContentFilter
        );
        assert_eq!(
            responses_finish_reason(Some("incomplete"), Some("paused"), false),
            FinishReason::Other(Some("paused".into()))
        );
        assert_eq!(
            responses_finish_reason(Some("failed"), None, true),
            FinishReason::Error
        );
    }

    #[test]
    fn test_usage_with_details() {
        let usage = responses_usage(&ResponsesUsage {
            input_tokens: 100,
            output_tokens: 40,
            total_tokens: Some(140),
            input_tokens_details: Some(ResponsesInputTokensDetails {
                cached_tokens: Some(30),
            }),
            output_tokens_details: Some(ResponsesOutputTokensDetails {
                reasoning_tokens: Some(10),
            }),
        });
        assert_eq!(usage.cached_input_tokens, Some(30));
        assert_eq!(usage.no_cache_input_tokens, Some(70));
        assert_eq!(usage.reasoning_tokens, Some(10));
        assert_eq!(usage.text_output_tokens, Some(30));
        assert_eq!(usage.total_tokens, Some(140));
    }

    #[test]
    fn test_usage_without_details_leaves_splits_absent() {
        let usage = responses_usage(&ResponsesUsage {
            input_tokens: 5,
            output_tokens: 2,
            ..ResponsesUsage::default()
        });
        assert_eq!(usage.input_tokens, Some(5));
        assert_eq!(usage.output_tokens, Some(2));
        assert_eq!(usage.total_tokens, Some(7));
        assert_eq!(usage.cached_input_tokens, None);
        assert_eq!(usage.no_cache_input_tokens, None);
        assert_eq!(usage.text_output_tokens, None);
    }

    #[test]
    fn test_inconsistent_split_is_not_clamped() {
        let usage = responses_usage(&ResponsesUsage {
            input_tokens: 5,
            output_tokens: 2,
            total_tokens: Some(7),
            input_tokens_details: Some(ResponsesInputTokensDetails {
                cached_tokens: Some(9),
            }),
            output_tokens_details: None,
        });
        assert_eq!(usage.input_tokens, Some(5));
        assert_eq!(usage.cached_input_tokens, Some(9));
        assert_eq!(usage.no_cache_input_tokens, None);
    }

    #[test]
    fn test_reasoning_metadata_null_encrypted_content() {
        let metadata = reasoning_metadata("openai", "rs_1", None);
        assert_eq!(
            Value::Object(metadata.clone()),
            serde_json::json!({"openai": {"itemId": "rs_1", "reasoningEncryptedContent": null}})
        );
        assert_eq!(metadata_item_id(Some(&metadata), "openai"), Some("rs_1"));
        assert_eq!(metadata_encrypted_content(Some(&metadata), "openai"), None);
    }

    #[test]
    fn test_response_metadata_omits_empty_provider_entry() {
        assert!(response_metadata("openai", None, None).is_empty());
        assert_eq!(
            Value::Object(response_metadata("openai", Some("resp_1"), None)),
            serde_json::json!({"openai": {"responseId": "resp_1"}})
        );
    }
}
