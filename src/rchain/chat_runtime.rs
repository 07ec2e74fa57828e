use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;

use crate::rchain::provider::{GenerationParams, Provider, ProviderError};

pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

/// How a provider expects its credential.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Auth<'a> {
    Bearer(&'a str),
    AnthropicKey(&'a str),
    GoogleKey(&'a str),
}

impl Auth<'_> {
    fn apply(self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(key) => request.bearer_auth(key),
            Self::AnthropicKey(key) => request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Self::GoogleKey(key) => request.header("x-goog-api-key", key),
        }
    }
}

#[derive(Debug)]
pub(crate) enum RequestFailure {
    Request(reqwest::Error),
    Api { status: StatusCode, body: String },
}

impl RequestFailure {
    pub(crate) fn into_provider_error(self, provider: Provider) -> ProviderError {
        match self {
            Self::Request(source) => ProviderError::Request { provider, source },
            Self::Api { status, body } => ProviderError::Api {
                provider,
                status,
                body,
            },
        }
    }
}

/// Builds one authenticated JSON POST with the per-request timeout.
pub(crate) fn build_request<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    auth: Auth<'_>,
    payload: &T,
    timeout_secs: Option<u64>,
) -> RequestBuilder {
    let request = auth.apply(client.post(url)).json(payload);
    match timeout_secs {
        Some(timeout_secs) => request.timeout(Duration::from_secs(timeout_secs)),
        None => request,
    }
}

async fn send_once(request: RequestBuilder) -> Result<reqwest::Response, RequestFailure> {
    let response = request.send().await.map_err(RequestFailure::Request)?;
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RequestFailure::Api { status, body })
}

/// Single attempt; failures carry the provider that produced them.
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    provider: Provider,
    url: &str,
    auth: Auth<'_>,
    payload: &T,
    params: GenerationParams,
) -> Result<reqwest::Response, ProviderError> {
    send_once(build_request(client, url, auth, payload, params.timeout_secs))
        .await
        .map_err(|failure| failure.into_provider_error(provider))
}

#[cfg(test)]
mod tests {
    use super::{Auth, build_request};
    use crate::rchain::provider::GenerationParams;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn generation_params_timeout_is_applied() {
        let client = reqwest::Client::new();
        let params = GenerationParams::chat(Some(30));
        let request = build_request(
            &client,
            "https://api.test/v1/chat",
            Auth::Bearer("sk-test"),
            &json!({"model": "m"}),
            params.timeout_secs,
        )
        .build()
        .unwrap();
        assert_eq!(request.timeout(), Some(&Duration::from_secs(30)));
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.headers()["authorization"].to_str().unwrap(),
            "Bearer sk-test"
        );
    }

    #[test]
    fn missing_timeout_leaves_client_default() {
        let client = reqwest::Client::new();
        let request = build_request(
            &client,
            "https://api.test/v1/messages",
            Auth::AnthropicKey("ak"),
            &json!({}),
            GenerationParams::judge(None).timeout_secs,
        )
        .build()
        .unwrap();
        assert!(request.timeout().is_none());
        assert_eq!(request.headers()["x-api-key"].to_str().unwrap(), "ak");
        assert_eq!(
            request.headers()["anthropic-version"].to_str().unwrap(),
            super::ANTHROPIC_VERSION
        );
    }
}
