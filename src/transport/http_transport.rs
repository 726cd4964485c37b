use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::AdapterError;
use crate::protocol::error_shapes::api_error_from_body;
use crate::protocol::openai_responses::{ResponsesOutput, ResponsesRequest};

use super::endpoint::PreparedEndpoint;
use super::retry_policy::parse_retry_after_delay;

fn build_reqwest_client(backend: &BackendConfig) -> Result<reqwest::Client, AdapterError> {
    let pool_idle_timeout = (backend.http_pool_idle_timeout_secs > 0)
        .then(|| Duration::from_secs(backend.http_pool_idle_timeout_secs));
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(backend.http_pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(backend.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(backend.timeout));

    let proxy_url = backend
        .proxy
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| AdapterError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !backend.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| AdapterError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Resolve the API key from the config, falling back to the configured
/// environment variable.
fn resolve_api_key(backend: &BackendConfig) -> Result<String, AdapterError> {
    if let Some(key) = backend.api_key.as_deref().filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    match std::env::var(&backend.api_key_env) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(AdapterError::Config(format!(
            "No API key configured: set backend.api_key or the {} environment variable",
            backend.api_key_env
        ))),
    }
}

/// HTTP client for the Responses endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: PreparedEndpoint,
}

impl HttpTransport {
    /// Build the transport for `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when no API key can be resolved or the
    /// endpoint settings are invalid, and [`AdapterError::Transport`] when the
    /// HTTP client cannot be constructed.
    pub fn new(backend: &BackendConfig) -> Result<Self, AdapterError> {
        let api_key = resolve_api_key(backend)?;
        let endpoint = PreparedEndpoint::new(backend, &api_key)?;
        let client = build_reqwest_client(backend)?;
        Ok(Self { client, endpoint })
    }

    #[must_use]
    pub fn endpoint(&self) -> &PreparedEndpoint {
        &self.endpoint
    }

    async fn send(&self, request: &ResponsesRequest) -> Result<reqwest::Response, AdapterError> {
        let body = serde_json::to_vec(request)
            .map_err(|err| AdapterError::InvalidRequest(format!("Failed to encode request: {err}")))?;
        let response = self
            .client
            .post(self.endpoint.responses_url().clone())
            .headers(self.endpoint.static_headers().clone())
            .body(body)
            .send()
            .await
            .map_err(|err| AdapterError::Transport(err.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "backend responded");
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after_delay(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| AdapterError::Transport(err.to_string()))?;
        Err(AdapterError::Api(api_error_from_body(
            status.as_u16(),
            &body,
            retry_after,
        )))
    }

    /// POST `request` and decode the complete JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Api`] for non-2xx responses,
    /// [`AdapterError::Transport`] when the call fails on the wire and
    /// [`AdapterError::Decode`] when the body is not a Responses object.
    pub async fn post_json(&self, request: &ResponsesRequest) -> Result<ResponsesOutput, AdapterError> {
        let response = self.send(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| AdapterError::Transport(err.to_string()))?;
        serde_json::from_slice(&body)
            .map_err(|err| AdapterError::Decode(format!("Invalid Responses body: {err}")))
    }

    /// POST `request` and return the raw body byte stream once the backend
    /// has accepted it with a 2xx status.
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::post_json`], minus decoding.
    pub async fn post_json_stream(
        &self,
        request: &ResponsesRequest,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static, AdapterError>
    {
        let response = self.send(request).await?;
        Ok(response.bytes_stream().boxed())
    }
}
