use rustc_hash::FxHashMap;
use serde_json::{json, Value};

use crate::error::AdapterError;
use crate::protocol::canonical::{
    AssistantPart, CallOptions, FileData, Message, ResponseFormat, ToolResultOutput, UserPart,
    Warning,
};
use crate::protocol::mapping::{metadata_encrypted_content, metadata_item_id};
use crate::util::data_url;

use super::tools::prepare_tools;
use super::{ResponsesReasoningConfig, ResponsesRequest, ResponsesStreamOptions};

const ENCRYPTED_REASONING_INCLUDE: &str = "reasoning.encrypted_content";

/// A wire request plus the advisory warnings produced while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub body: ResponsesRequest,
    pub warnings: Vec<Warning>,
}

/// Build the Responses request body for `options`.
///
/// System messages become `instructions`; settings the backend does not
/// support are dropped with a warning.
///
/// # Errors
///
/// Returns [`AdapterError::UnsupportedContent`] for file parts the backend
/// cannot represent, and [`AdapterError::InvalidRequest`] when the prompt has
/// no input besides system messages.
pub fn build_request(
    model_id: &str,
    options: &CallOptions,
    stream: bool,
    provider_key: &str,
) -> Result<BuiltRequest, AdapterError> {
    let mut warnings = unsupported_setting_warnings(options);
    let provider = &options.provider_options;
    let store = provider.store.unwrap_or(true);

    let (system, input) = encode_prompt(options, store, provider_key, &mut warnings)?;
    if input.is_empty() {
        return Err(AdapterError::InvalidRequest(
            "prompt contains no user, assistant or tool messages".to_string(),
        ));
    }

    let mut instructions = system;
    if let Some(extra) = provider.instructions.as_deref() {
        instructions.push(extra.to_string());
    }
    let instructions = (!instructions.is_empty()).then(|| instructions.join("\n\n"));

    let strict = provider.strict_json_schema.unwrap_or(true);
    let text = encode_text_config(options.response_format.as_ref(), provider.text_verbosity.as_deref(), strict);

    let reasoning = if provider.reasoning_effort.is_some() || provider.reasoning_summary.is_some() {
        Some(ResponsesReasoningConfig {
            effort: provider.reasoning_effort.clone(),
            summary: provider.reasoning_summary.clone(),
        })
    } else {
        None
    };

    let mut include = provider.include.clone();
    if reasoning.is_some()
        && provider.store == Some(false)
        && !include.iter().any(|i| i == ENCRYPTED_REASONING_INCLUDE)
    {
        include.push(ENCRYPTED_REASONING_INCLUDE.to_string());
    }

    let prepared = prepare_tools(&options.tools, options.tool_choice.as_ref(), strict);
    warnings.extend(prepared.warnings);

    let body = ResponsesRequest {
        model: model_id.to_string(),
        input: Value::Array(input),
        instructions,
        max_output_tokens: options.max_output_tokens,
        temperature: options.temperature,
        top_p: options.top_p,
        text,
        reasoning,
        tools: prepared.tools,
        tool_choice: prepared.tool_choice,
        previous_response_id: provider.previous_response_id.clone(),
        store: provider.store,
        parallel_tool_calls: provider.parallel_tool_calls,
        service_tier: provider.service_tier.clone(),
        user: provider.user.clone(),
        metadata: provider.metadata.clone(),
        include: (!include.is_empty()).then_some(include),
        max_tool_calls: provider.max_tool_calls,
        stream: stream.then_some(true),
        stream_options: stream.then_some(ResponsesStreamOptions {
            include_usage: true,
        }),
    };

    Ok(BuiltRequest { body, warnings })
}

fn unsupported_setting_warnings(options: &CallOptions) -> Vec<Warning> {
    let mut warnings = Vec::new();
    if options.top_k.is_some() {
        warnings.push(Warning::unsupported_setting("top_k"));
    }
    if options.seed.is_some() {
        warnings.push(Warning::unsupported_setting("seed"));
    }
    if options.presence_penalty.is_some() {
        warnings.push(Warning::unsupported_setting("presence_penalty"));
    }
    if options.frequency_penalty.is_some() {
        warnings.push(Warning::unsupported_setting("frequency_penalty"));
    }
    if !options.stop_sequences.is_empty() {
        warnings.push(Warning::unsupported_setting("stop_sequences"));
    }
    warnings
}

fn encode_text_config(
    format: Option<&ResponseFormat>,
    verbosity: Option<&str>,
    strict: bool,
) -> Option<Value> {
    let mut text = serde_json::Map::new();
    if let Some(ResponseFormat::Json {
        schema,
        name,
        description,
    }) = format
    {
        let encoded = match schema {
            Some(schema) => {
                let mut object = serde_json::Map::new();
                object.insert("type".into(), json!("json_schema"));
                object.insert("strict".into(), json!(strict));
                object.insert(
                    "name".into(),
                    json!(name.as_deref().unwrap_or("response")),
                );
                if let Some(description) = description {
                    object.insert("description".into(), json!(description));
                }
                object.insert("schema".into(), schema.clone());
                Value::Object(object)
            }
            None => json!({ "type": "json_object" }),
        };
        text.insert("format".into(), encoded);
    }
    if let Some(verbosity) = verbosity {
        text.insert("verbosity".into(), json!(verbosity));
    }
    (!text.is_empty()).then_some(Value::Object(text))
}

/// Encode the prompt into `(system texts, input items)`.
fn encode_prompt(
    options: &CallOptions,
    store: bool,
    provider_key: &str,
    warnings: &mut Vec<Warning>,
) -> Result<(Vec<String>, Vec<Value>), AdapterError> {
    let mut system = Vec::new();
    let mut input = Vec::with_capacity(options.prompt.len());
    // Reasoning item id -> index in `input`, so summary parts of one item merge.
    let mut reasoning_items: FxHashMap<String, usize> = FxHashMap::default();

    for message in &options.prompt {
        match message {
            Message::System { content } => system.push(content.clone()),
            Message::User { parts } => {
                let content = parts
                    .iter()
                    .enumerate()
                    .map(|(index, part)| encode_user_part(index, part))
                    .collect::<Result<Vec<_>, _>>()?;
                input.push(json!({ "role": "user", "content": content }));
            }
            Message::Assistant { parts } => {
                for part in parts {
                    encode_assistant_part(
                        part,
                        store,
                        provider_key,
                        &mut input,
                        &mut reasoning_items,
                        warnings,
                    );
                }
            }
            Message::Tool { results } => {
                for result in results {
                    let output = match &result.output {
                        ToolResultOutput::Text(text) | ToolResultOutput::ErrorText(text) => {
                            text.clone()
                        }
                        ToolResultOutput::Json(value) | ToolResultOutput::ErrorJson(value) => {
                            value.to_string()
                        }
                    };
                    input.push(json!({
                        "type": "function_call_output",
                        "call_id": result.tool_call_id,
                        "output": output,
                    }));
                }
            }
        }
    }

    Ok((system, input))
}

fn encode_user_part(index: usize, part: &UserPart) -> Result<Value, AdapterError> {
    let (media_type, data, filename) = match part {
        UserPart::Text(text) => return Ok(json!({ "type": "input_text", "text": text })),
        UserPart::File {
            media_type,
            data,
            filename,
        } => (media_type.as_str(), data, filename.as_deref()),
    };

    if media_type.starts_with("image/") {
        let media_type = if media_type == "image/*" {
            "image/jpeg"
        } else {
            media_type
        };
        let image_url = match data {
            FileData::Base64(b64) => data_url(media_type, b64),
            FileData::Url(url) => url.to_string(),
        };
        return Ok(json!({ "type": "input_image", "image_url": image_url }));
    }

    if media_type == "application/pdf" {
        return Ok(match data {
            FileData::Base64(b64) => json!({
                "type": "input_file",
                "filename": filename.map_or_else(|| format!("part-{index}.pdf"), str::to_string),
                "file_data": data_url(media_type, b64),
            }),
            FileData::Url(url) => json!({ "type": "input_file", "file_url": url.as_str() }),
        });
    }

    if media_type.starts_with("audio/") {
        let format = match media_type {
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/mp3" | "audio/mpeg" => "mp3",
            other => {
                return Err(AdapterError::unsupported(
                    format!("audio file with media type {other}"),
                    "only wav and mp3 audio are supported",
                ))
            }
        };
        return match data {
            FileData::Base64(b64) => Ok(json!({
                "type": "input_audio",
                "input_audio": { "data": b64, "format": format },
            })),
            FileData::Url(_) => Err(AdapterError::unsupported(
                "audio file",
                "remote audio URLs are not supported; embed the audio as base64",
            )),
        };
    }

    Err(AdapterError::unsupported(
        format!("file part with media type {media_type}"),
        "only image, PDF and audio files are supported",
    ))
}

fn encode_assistant_part(
    part: &AssistantPart,
    store: bool,
    provider_key: &str,
    input: &mut Vec<Value>,
    reasoning_items: &mut FxHashMap<String, usize>,
    warnings: &mut Vec<Warning>,
) {
    match part {
        AssistantPart::Text(text) => input.push(json!({
            "role": "assistant",
            "content": [{ "type": "output_text", "text": text }],
        })),
        AssistantPart::ToolCall {
            tool_call_id,
            tool_name,
            input: arguments,
        } => input.push(json!({
            "type": "function_call",
            "call_id": tool_call_id,
            "name": tool_name,
            "arguments": arguments,
        })),
        AssistantPart::Reasoning {
            text,
            provider_metadata,
        } => {
            let Some(item_id) = metadata_item_id(provider_metadata.as_ref(), provider_key) else {
                warnings.push(Warning::Other {
                    message: "reasoning part without an item id was skipped".to_string(),
                });
                return;
            };
            if let Some(&index) = reasoning_items.get(item_id) {
                if !store && !text.is_empty() {
                    if let Some(summary) = input[index]
                        .get_mut("summary")
                        .and_then(Value::as_array_mut)
                    {
                        summary.push(json!({ "type": "summary_text", "text": text }));
                    }
                }
                return;
            }
            reasoning_items.insert(item_id.to_string(), input.len());
            if store {
                input.push(json!({ "type": "item_reference", "id": item_id }));
            } else {
                let summary: Vec<Value> = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![json!({ "type": "summary_text", "text": text })]
                };
                input.push(json!({
                    "type": "reasoning",
                    "id": item_id,
                    "encrypted_content": metadata_encrypted_content(provider_metadata.as_ref(), provider_key),
                    "summary": summary,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::ResponsesProviderOptions;

    fn user(text: &str) -> Message {
        Message::User {
            parts: vec![UserPart::Text(text.into())],
        }
    }

    #[test]
    fn test_user_text_and_system_instructions() {
        let options = CallOptions {
            prompt: vec![
                Message::System {
                    content: "Be brief.".into(),
                },
                Message::System {
                    content: "Answer in French.".into(),
                },
                user("Hello"),
            ],
            ..CallOptions::default()
        };
        let built = build_request("gpt-4.1", &options, false, "openai").unwrap();
        assert_eq!(
            built.body.instructions.as_deref(),
            Some("Be brief.\n\nAnswer in French.")
        );
        assert_eq!(
            built.body.input,
            json!([{ "role": "user", "content": [{ "type": "input_text", "text": "Hello" }] }])
        );
        assert!(built.body.stream.is_none());
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_only_system_messages_is_invalid() {
        let options = CallOptions {
            prompt: vec![Message::System {
                content: "x".into(),
            }],
            ..CallOptions::default()
        };
        let err = build_request("gpt-4.1", &options, false, "openai").unwrap_err();
        assert!(matches!(err, AdapterError::InvalidRequest(_)));
    }

    #[test]
    fn test_pdf_default_filename() {
        let part = UserPart::File {
            media_type: "application/pdf".into(),
            data: FileData::Base64("JVBERi0=".into()),
            filename: None,
        };
        assert_eq!(
            encode_user_part(2, &part).unwrap(),
            json!({
                "type": "input_file",
                "filename": "part-2.pdf",
                "file_data": "data:application/pdf;base64,JVBERi0=",
            })
        );
    }

    #[test]
    fn test_remote_audio_is_unsupported() {
        let part = UserPart::File {
            media_type: "audio/wav".into(),
            data: FileData::Url(url::Url::parse("https://example.com/a.wav").unwrap()),
            filename: None,
        };
        let err = encode_user_part(0, &part).unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedContent { .. }));
    }

    #[test]
    fn test_encrypted_include_added_when_not_stored() {
        let options = CallOptions {
            prompt: vec![user("think")],
            provider_options: ResponsesProviderOptions {
                store: Some(false),
                reasoning_effort: Some("low".into()),
                ..ResponsesProviderOptions::default()
            },
            ..CallOptions::default()
        };
        let built = build_request("o4-mini", &options, true, "openai").unwrap();
        assert_eq!(
            built.body.include,
            Some(vec![ENCRYPTED_REASONING_INCLUDE.to_string()])
        );
        assert_eq!(built.body.store, Some(false));
        assert_eq!(built.body.stream, Some(true));
        assert_eq!(
            built.body.stream_options,
            Some(ResponsesStreamOptions {
                include_usage: true
            })
        );
    }
}
