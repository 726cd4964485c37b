use crate::config::BackendConfig;
use crate::error::AdapterError;

/// Precomputed backend endpoint: the parsed `/responses` URL plus the headers
/// every call carries.
#[derive(Debug, Clone)]
pub struct PreparedEndpoint {
    responses_url: url::Url,
    static_headers: http::HeaderMap,
}

impl PreparedEndpoint {
    /// Prepare the endpoint for `backend` using an already resolved API key.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when the base URL does not parse or a
    /// configured header is not a valid HTTP header.
    pub fn new(backend: &BackendConfig, api_key: &str) -> Result<Self, AdapterError> {
        let responses_url = responses_url(&backend.base_url)?;
        let static_headers = build_static_headers(backend, api_key)?;
        Ok(Self {
            responses_url,
            static_headers,
        })
    }

    #[inline]
    #[must_use]
    pub fn responses_url(&self) -> &url::Url {
        &self.responses_url
    }

    #[inline]
    #[must_use]
    pub fn static_headers(&self) -> &http::HeaderMap {
        &self.static_headers
    }
}

fn responses_url(base_url: &str) -> Result<url::Url, AdapterError> {
    let base = base_url.trim_end_matches('/');
    url::Url::parse(&format!("{base}/responses"))
        .map_err(|err| AdapterError::Config(format!("Invalid backend base_url '{base_url}': {err}")))
}

fn build_static_headers(
    backend: &BackendConfig,
    api_key: &str,
) -> Result<http::HeaderMap, AdapterError> {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    let bearer = http::HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| AdapterError::Config("API key contains invalid header characters".into()))?;
    headers.insert(http::header::AUTHORIZATION, bearer);

    for (name, value) in &backend.headers {
        let name = http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| AdapterError::Config(format!("Invalid header name '{name}': {err}")))?;
        let value = http::HeaderValue::from_str(value)
            .map_err(|err| AdapterError::Config(format!("Invalid value for header '{name}': {err}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responses_url_trims_trailing_slash() {
        let backend = BackendConfig {
            base_url: "http://127.0.0.1:8080/v1/".into(),
            ..BackendConfig::default()
        };
        let endpoint = PreparedEndpoint::new(&backend, "sk-test").unwrap();
        assert_eq!(
            endpoint.responses_url().as_str(),
            "http://127.0.0.1:8080/v1/responses"
        );
    }

    #[test]
    fn test_static_headers_carry_bearer_and_custom_headers() {
        let mut backend = BackendConfig::default();
        backend
            .headers
            .insert("OpenAI-Organization".into(), "org-123".into());
        let endpoint = PreparedEndpoint::new(&backend, "sk-test").unwrap();
        let headers = endpoint.static_headers();
        assert_eq!(headers[http::header::AUTHORIZATION], "Bearer sk-test");
        assert_eq!(headers[http::header::CONTENT_TYPE], "application/json");
        assert_eq!(headers["openai-organization"], "org-123");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let backend = BackendConfig {
            base_url: "not a url".into(),
            ..BackendConfig::default()
        };
        let err = PreparedEndpoint::new(&backend, "sk-test").unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }
}
