mod request_id;

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::config::{AdapterConfig, ModelConfig};
use crate::error::AdapterError;
use crate::observability::log_call_complete;
use crate::protocol::canonical::{
    CallOptions, ContentItem, FinishReason, ProviderMetadata, ResponseInfo,
    ResponsesProviderOptions, Usage, Warning,
};
use crate::protocol::openai_responses::encoder::build_request;
use crate::protocol::openai_responses::response_decoder::decode_responses_output;
use crate::protocol::openai_responses::ResponsesRequest;
use crate::stream::{
    drive_lifecycle_stream, sse_frame_stream, DriverOptions, LifecycleStream, SessionOptions,
    StreamReconstructor,
};
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Result of a one-shot generation.
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub content: Vec<ContentItem>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub provider_metadata: ProviderMetadata,
    pub warnings: Vec<Warning>,
    pub response: ResponseInfo,
    /// The body that was sent, for diagnostics.
    pub request_body: ResponsesRequest,
}

/// Result of a streaming generation.
pub struct StreamResult {
    pub stream: LifecycleStream,
    pub request_body: ResponsesRequest,
}

/// A language model backed by the `OpenAI` Responses API.
#[derive(Debug)]
pub struct ResponsesModel {
    model: ModelConfig,
    provider_key: String,
    transport: HttpTransport,
    request_ids: RequestIdGenerator,
}

impl ResponsesModel {
    /// Build a model from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when no API key is available or the
    /// backend settings are invalid.
    pub fn new(config: &AdapterConfig) -> Result<Self, AdapterError> {
        let transport = HttpTransport::new(&config.backend)?;
        Ok(Self {
            model: config.model.clone(),
            provider_key: config.backend.provider_name.clone(),
            transport,
            request_ids: RequestIdGenerator::new(),
        })
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model.id
    }

    #[must_use]
    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    /// Fill provider options the caller left unset from the model config.
    fn with_model_defaults(&self, options: &CallOptions) -> CallOptions {
        let mut options = options.clone();
        let provider: &mut ResponsesProviderOptions = &mut options.provider_options;
        if provider.store.is_none() {
            provider.store = self.model.store;
        }
        if provider.parallel_tool_calls.is_none() {
            provider.parallel_tool_calls = self.model.parallel_tool_calls;
        }
        if provider.reasoning_effort.is_none() {
            provider.reasoning_effort.clone_from(&self.model.reasoning_effort);
        }
        if provider.reasoning_summary.is_none() {
            provider.reasoning_summary.clone_from(&self.model.reasoning_summary);
        }
        if provider.service_tier.is_none() {
            provider.service_tier.clone_from(&self.model.service_tier);
        }
        options
    }

    /// Run one non-streaming generation.
    ///
    /// # Errors
    ///
    /// Returns build-time errors before any network call, and
    /// [`AdapterError::Api`] / [`AdapterError::Transport`] /
    /// [`AdapterError::Decode`] from the backend round trip.
    pub async fn do_generate(&self, options: &CallOptions) -> Result<GenerateResult, AdapterError> {
        let options = self.with_model_defaults(options);
        let built = build_request(&self.model.id, &options, false, &self.provider_key)?;
        let span = info_span!(
            "responses_call",
            request_id = %self.request_ids.next_id(),
            model = %self.model.id,
            stream = false,
        );

        let started_at = Instant::now();
        let output = self
            .transport
            .post_json(&built.body)
            .instrument(span.clone())
            .await?;
        let decoded = decode_responses_output(&output, &self.provider_key)?;
        span.in_scope(|| {
            log_call_complete(
                &self.model.id,
                &decoded.usage,
                &decoded.finish_reason,
                started_at.elapsed(),
            );
        });

        Ok(GenerateResult {
            content: decoded.content,
            finish_reason: decoded.finish_reason,
            usage: decoded.usage,
            provider_metadata: decoded.provider_metadata,
            warnings: built.warnings,
            response: decoded.response,
            request_body: built.body,
        })
    }

    /// Start a streaming generation.
    ///
    /// The returned stream always begins with `stream-start` and ends with
    /// exactly one `finish`. Cancelling `cancel` ends the input early;
    /// already-emitted events stay valid.
    ///
    /// # Errors
    ///
    /// Returns build-time errors, and [`AdapterError::Api`] /
    /// [`AdapterError::Transport`] when the backend rejects the call before
    /// the event stream starts.
    pub async fn do_stream(
        &self,
        options: &CallOptions,
        cancel: Option<CancellationToken>,
    ) -> Result<StreamResult, AdapterError> {
        let options = self.with_model_defaults(options);
        let built = build_request(&self.model.id, &options, true, &self.provider_key)?;
        let span = info_span!(
            "responses_call",
            request_id = %self.request_ids.next_id(),
            model = %self.model.id,
            stream = true,
        );

        let body = self
            .transport
            .post_json_stream(&built.body)
            .instrument(span.clone())
            .await?;
        let reconstructor =
            StreamReconstructor::new(SessionOptions::from_request(&built.body, &self.provider_key));
        let stream = drive_lifecycle_stream(
            sse_frame_stream(body),
            reconstructor,
            DriverOptions {
                warnings: built.warnings,
                cancel,
                model_id: self.model.id.clone(),
                span: Some(span),
            },
        );

        Ok(StreamResult {
            stream: Box::pin(stream),
            request_body: built.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with(config: ModelConfig) -> ResponsesModel {
        let mut adapter = AdapterConfig::for_model("gpt-test");
        adapter.backend.api_key = Some("sk-test".into());
        adapter.model = config;
        ResponsesModel::new(&adapter).unwrap()
    }

    #[test]
    fn test_model_defaults_fill_unset_options() {
        let model = model_with(ModelConfig {
            id: "gpt-test".into(),
            store: Some(false),
            reasoning_effort: Some("low".into()),
            ..ModelConfig::default()
        });
        let merged = model.with_model_defaults(&CallOptions::default());
        assert_eq!(merged.provider_options.store, Some(false));
        assert_eq!(merged.provider_options.reasoning_effort.as_deref(), Some("low"));
        assert_eq!(merged.provider_options.parallel_tool_calls, None);
    }

    #[test]
    fn test_caller_options_override_model_defaults() {
        let model = model_with(ModelConfig {
            id: "gpt-test".into(),
            store: Some(false),
            ..ModelConfig::default()
        });
        let mut options = CallOptions::default();
        options.provider_options.store = Some(true);
        let merged = model.with_model_defaults(&options);
        assert_eq!(merged.provider_options.store, Some(true));
    }
}
