use serde::{Deserialize, Serialize};

/// Opaque backend-defined metadata, keyed by provider name
/// (e.g. `{"openai": {"itemId": "..."}}`). Never interpreted by this crate.
pub type ProviderMetadata = serde_json::Map<String, serde_json::Value>;

/// The ordered conversation sent to the model.
pub type Prompt = Vec<Message>;

/// A role-tagged prompt message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    System { content: String },
    User { parts: Vec<UserPart> },
    Assistant { parts: Vec<AssistantPart> },
    Tool { results: Vec<ToolResultPart> },
}

/// Payload of a file part: inline base64 or a remote URL.
#[derive(Debug, Clone, PartialEq)]
pub enum FileData {
    Base64(String),
    Url(url::Url),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserPart {
    Text(String),
    File {
        media_type: String,
        data: FileData,
        filename: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantPart {
    Text(String),
    Reasoning {
        text: String,
        provider_metadata: Option<ProviderMetadata>,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: ToolResultOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolResultOutput {
    Text(String),
    Json(serde_json::Value),
    ErrorText(String),
    ErrorJson(serde_json::Value),
}

/// A function tool the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// A backend-executed tool, identified as `<provider>.<tool>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDefinedTool {
    pub id: String,
    pub name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolSpec {
    Function(FunctionTool),
    ProviderDefined(ProviderDefinedTool),
}

impl ToolSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ToolSpec::Function(tool) => &tool.name,
            ToolSpec::ProviderDefined(tool) => &tool.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    Tool(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    Json {
        schema: Option<serde_json::Value>,
        name: Option<String>,
        description: Option<String>,
    },
}

/// Backend-specific options carried alongside the generic call options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponsesProviderOptions {
    /// Whether the backend persists this turn. Defaults to `true` on the wire.
    pub store: Option<bool>,
    pub previous_response_id: Option<String>,
    pub parallel_tool_calls: Option<bool>,
    pub reasoning_effort: Option<String>,
    pub reasoning_summary: Option<String>,
    pub service_tier: Option<String>,
    pub user: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    pub include: Vec<String>,
    pub strict_json_schema: Option<bool>,
    pub instructions: Option<String>,
    pub text_verbosity: Option<String>,
    pub max_tool_calls: Option<u32>,
}

/// Everything the caller supplies for one generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    pub prompt: Prompt,
    pub max_output_tokens: Option<u64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub stop_sequences: Vec<String>,
    pub seed: Option<u64>,
    pub response_format: Option<ResponseFormat>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: Option<ToolChoice>,
    pub provider_options: ResponsesProviderOptions,
}

/// Advisory notice produced while building a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Warning {
    UnsupportedSetting {
        setting: String,
        details: Option<String>,
    },
    UnsupportedTool {
        tool_name: String,
        details: Option<String>,
    },
    Other {
        message: String,
    },
}

impl Warning {
    pub(crate) fn unsupported_setting(setting: &str) -> Self {
        Warning::UnsupportedSetting {
            setting: setting.to_string(),
            details: None,
        }
    }
}

/// Why generation stopped. `Other` keeps the raw backend value when one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unified", content = "raw", rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other(Option<String>),
}

impl FinishReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content-filter",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::Error => "error",
            FinishReason::Other(_) => "other",
        }
    }
}

/// Token usage. Sub-splits are only present when the backend reports the
/// matching detail field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cached_input_tokens: Option<u64>,
    pub no_cache_input_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
    pub text_output_tokens: Option<u64>,
}

/// One structured content item of a non-streaming result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentItem {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    Reasoning {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    File {
        media_type: String,
        data: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
}

/// Identifying data of the backend response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseInfo {
    pub id: Option<String>,
    pub model_id: Option<String>,
    pub timestamp: Option<i64>,
}

/// One event of the caller-facing stream.
///
/// Text and reasoning events are correlated by `id`; tool input events use
/// the caller-visible tool call id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    StreamStart {
        warnings: Vec<Warning>,
    },
    ResponseMetadata {
        id: Option<String>,
        model_id: Option<String>,
        timestamp: Option<i64>,
    },
    TextStart {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    ReasoningStart {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    ReasoningDelta {
        id: String,
        delta: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    ReasoningEnd {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    ToolInputStart {
        id: String,
        tool_name: String,
    },
    ToolInputDelta {
        id: String,
        delta: String,
    },
    ToolInputEnd {
        id: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<ProviderMetadata>,
    },
    Error {
        message: String,
        code: Option<String>,
    },
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
        provider_metadata: ProviderMetadata,
    },
}

impl LifecycleEvent {
    /// The item identifier this event belongs to, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            LifecycleEvent::TextStart { id, .. }
            | LifecycleEvent::TextDelta { id, .. }
            | LifecycleEvent::TextEnd { id, .. }
            | LifecycleEvent::ReasoningStart { id, .. }
            | LifecycleEvent::ReasoningDelta { id, .. }
            | LifecycleEvent::ReasoningEnd { id, .. }
            | LifecycleEvent::ToolInputStart { id, .. }
            | LifecycleEvent::ToolInputDelta { id, .. }
            | LifecycleEvent::ToolInputEnd { id } => Some(id),
            LifecycleEvent::ToolCall { tool_call_id, .. } => Some(tool_call_id),
            LifecycleEvent::StreamStart { .. }
            | LifecycleEvent::ResponseMetadata { .. }
            | LifecycleEvent::Error { .. }
            | LifecycleEvent::Finish { .. } => None,
        }
    }
}
