use crate::error::{AdapterError, ApiError};
use crate::protocol::canonical::{ContentItem, FinishReason, ProviderMetadata, ResponseInfo, Usage};
use crate::protocol::mapping::{
    item_metadata, reasoning_metadata, response_metadata, responses_finish_reason,
    responses_usage,
};
use crate::util::json_scalar_to_string;

use super::{ResponsesContentPart, ResponsesOutput, ResponsesOutputItem};

/// A complete Responses output mapped into caller-facing parts.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    pub content: Vec<ContentItem>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub provider_metadata: ProviderMetadata,
    pub response: ResponseInfo,
}

/// Decode an `OpenAI` Responses API output object.
///
/// # Errors
///
/// Returns [`AdapterError::Api`] when the response body carries an `error`
/// object (the backend reports some failures with a 2xx status).
pub fn decode_responses_output(
    output: &ResponsesOutput,
    provider_key: &str,
) -> Result<DecodedResponse, AdapterError> {
    if let Some(error) = &output.error {
        return Err(AdapterError::Api(ApiError {
            status: 400,
            message: error.message.clone(),
            error_type: None,
            code: error.code.as_ref().and_then(json_scalar_to_string),
            param: None,
            retry_after: None,
        }));
    }

    let mut content = Vec::with_capacity(output.output.len());
    let mut has_function_call = false;

    for item in &output.output {
        match item {
            ResponsesOutputItem::Message { id, content: parts } => {
                for part in parts {
                    let text = match part {
                        ResponsesContentPart::OutputText { text } => text,
                        ResponsesContentPart::Refusal { refusal } => refusal,
                        ResponsesContentPart::ReasoningText { .. }
                        | ResponsesContentPart::Unknown => continue,
                    };
                    content.push(ContentItem::Text {
                        text: text.clone(),
                        provider_metadata: Some(item_metadata(provider_key, id)),
                    });
                }
            }
            ResponsesOutputItem::Reasoning {
                id,
                encrypted_content,
                summary,
            } => {
                let metadata = reasoning_metadata(provider_key, id, encrypted_content.as_deref());
                if summary.is_empty() {
                    content.push(ContentItem::Reasoning {
                        text: String::new(),
                        provider_metadata: Some(metadata),
                    });
                } else {
                    for part in summary {
                        content.push(ContentItem::Reasoning {
                            text: part.text.clone(),
                            provider_metadata: Some(metadata.clone()),
                        });
                    }
                }
            }
            ResponsesOutputItem::FunctionCall {
                id,
                call_id,
                name,
                arguments,
            } => {
                has_function_call = true;
                content.push(ContentItem::ToolCall {
                    tool_call_id: call_id.clone(),
                    tool_name: name.clone(),
                    input: arguments.clone(),
                    provider_metadata: Some(item_metadata(provider_key, id)),
                });
            }
            ResponsesOutputItem::ImageGenerationCall { result, .. } => {
                if let Some(data) = result {
                    content.push(ContentItem::File {
                        media_type: "image/png".to_string(),
                        data: data.clone(),
                    });
                }
            }
            ResponsesOutputItem::Unknown => {}
        }
    }

    let finish_reason = responses_finish_reason(
        output.status.as_deref(),
        output
            .incomplete_details
            .as_ref()
            .and_then(|details| details.reason.as_deref()),
        has_function_call,
    );

    Ok(DecodedResponse {
        content,
        finish_reason,
        usage: output.usage.as_ref().map(responses_usage).unwrap_or_default(),
        provider_metadata: response_metadata(
            provider_key,
            (!output.id.is_empty()).then_some(output.id.as_str()),
            output.service_tier.as_deref(),
        ),
        response: ResponseInfo {
            id: (!output.id.is_empty()).then(|| output.id.clone()),
            model_id: (!output.model.is_empty()).then(|| output.model.clone()),
            timestamp: output.created_at,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> DecodedResponse {
        let output: ResponsesOutput = serde_json::from_str(body).unwrap();
        decode_responses_output(&output, "openai").unwrap()
    }

    #[test]
    fn test_message_and_refusal_become_text() {
        let decoded = decode(
            r#"{"id":"resp_1","model":"gpt-4.1","created_at":10,"status":"completed","output":[
                {"type":"message","id":"msg_1","role":"assistant","content":[
                    {"type":"output_text","text":"Hi","annotations":[]},
                    {"type":"refusal","refusal":"I can't help with that."}
                ]}
            ],"usage":{"input_tokens":3,"output_tokens":4,"total_tokens":7}}"#,
        );
        assert_eq!(decoded.content.len(), 2);
        assert!(matches!(&decoded.content[1], ContentItem::Text { text, .. } if text == "I can't help with that."));
        assert_eq!(decoded.finish_reason, FinishReason::Stop);
        assert_eq!(decoded.usage.total_tokens, Some(7));
        assert_eq!(decoded.response.id.as_deref(), Some("resp_1"));
        assert_eq!(decoded.provider_metadata["openai"]["responseId"], "resp_1");
    }

    #[test]
    fn test_reasoning_with_empty_summary_yields_one_item() {
        let decoded = decode(
            r#"{"id":"resp_2","output":[{"type":"reasoning","id":"rs_1","encrypted_content":"enc","summary":[]}]}"#,
        );
        match &decoded.content[..] {
            [ContentItem::Reasoning {
                text,
                provider_metadata: Some(metadata),
            }] => {
                assert!(text.is_empty());
                assert_eq!(metadata["openai"]["reasoningEncryptedContent"], "enc");
            }
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn test_function_call_sets_tool_calls_reason() {
        let decoded = decode(
            r#"{"id":"resp_3","status":"completed","output":[
                {"type":"function_call","id":"fc_1","call_id":"call_1","name":"getWeather","arguments":"{\"loc\":\"SF\"}"},
                {"type":"web_search_call","id":"ws_1","status":"completed"}
            ]}"#,
        );
        assert_eq!(decoded.content.len(), 1);
        assert_eq!(decoded.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn test_incomplete_max_tokens_is_length() {
        let decoded = decode(
            r#"{"id":"resp_4","status":"incomplete","incomplete_details":{"reason":"max_output_tokens"},"output":[]}"#,
        );
        assert_eq!(decoded.finish_reason, FinishReason::Length);
        assert_eq!(decoded.usage, Usage::default());
    }

    #[test]
    fn test_body_error_is_api_error() {
        let output: ResponsesOutput = serde_json::from_str(
            r#"{"id":"resp_5","status":"failed","error":{"code":"server_error","message":"boom"},"output":[]}"#,
        )
        .unwrap();
        let err = decode_responses_output(&output, "openai").unwrap_err();
        match err {
            AdapterError::Api(api) => {
                assert_eq!(api.message, "boom");
                assert_eq!(api.code.as_deref(), Some("server_error"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
