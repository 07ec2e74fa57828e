use std::fmt;
use std::str::FromStr;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
    Mistral,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Openai,
        Provider::Anthropic,
        Provider::Mistral,
        Provider::Google,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Mistral => "mistral",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "anthropic" => Ok(Self::Anthropic),
            "mistral" => Ok(Self::Mistral),
            "google" | "gemini" => Ok(Self::Google),
            other => Err(format!(
                "Unknown provider '{other}'. Supported values: openai, anthropic, mistral, google."
            )),
        }
    }
}

pub fn endpoint(provider: Provider) -> &'static str {
    match provider {
        Provider::Openai => "https://api.openai.com/v1/chat/completions",
        Provider::Anthropic => "https://api.anthropic.com/v1/messages",
        Provider::Mistral => "https://api.mistral.ai/v1/chat/completions",
        Provider::Google => "https://generativelanguage.googleapis.com/v1beta/models",
    }
}

/// Environment variables checked for a provider credential, in order.
pub fn api_key_envs(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::Openai => &["OPENAI_API_KEY"],
        Provider::Anthropic => &["ANTHROPIC_API_KEY"],
        Provider::Mistral => &["MISTRAL_API_KEY"],
        Provider::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
    }
}

pub fn api_key_env(provider: Provider) -> &'static str {
    api_key_envs(provider)[0]
}

/// Sampling parameters applied to every call made through one handle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: Option<u64>,
}

impl GenerationParams {
    pub const CHAT_TEMPERATURE: f32 = 0.7;
    pub const CHAT_MAX_TOKENS: u32 = 8192;

    /// Parameters for primary generation. Sent once.
    pub fn chat(timeout_secs: Option<u64>) -> Self {
        Self {
            temperature: Self::CHAT_TEMPERATURE,
            max_tokens: Self::CHAT_MAX_TOKENS,
            timeout_secs,
        }
    }

    /// Parameters for the intent judge: deterministic, short, single attempt.
    pub fn judge(timeout_secs: Option<u64>) -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 256,
            timeout_secs,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::chat(None)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Request {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: Provider,
        status: StatusCode,
        body: String,
    },
    #[error("{provider} response did not contain message content")]
    EmptyResponse { provider: Provider },
    #[error("{provider} stream error: {message}")]
    Stream { provider: Provider, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> Provider {
        match self {
            Self::Request { provider, .. }
            | Self::Api { provider, .. }
            | Self::EmptyResponse { provider }
            | Self::Stream { provider, .. } => *provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip_through_from_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>(), Ok(provider));
        }
        assert_eq!("Gemini".parse::<Provider>(), Ok(Provider::Google));
    }

    #[test]
    fn unknown_provider_lists_supported_values() {
        let err = "fireworks".parse::<Provider>().unwrap_err();
        assert!(err.contains("Unknown provider 'fireworks'"));
        assert!(err.contains("openai, anthropic, mistral, google"));
    }

    #[test]
    fn judge_params_are_deterministic_and_short() {
        let params = GenerationParams::judge(Some(5));
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.max_tokens, 256);
        assert_eq!(params.timeout_secs, Some(5));
        assert_eq!(GenerationParams::chat(None).max_tokens, 8192);
    }

    #[test]
    fn stream_error_mentions_provider() {
        let err = ProviderError::Stream {
            provider: Provider::Anthropic,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "anthropic stream error: overloaded");
        assert_eq!(err.provider(), Provider::Anthropic);
    }
}
