//! Logical model names and the provider configuration behind them.
//!
//! The registry is built once at startup and only read afterwards.
//! Credentials are captured at build time but checked lazily, when a
//! handle is requested.

use std::collections::{BTreeMap, HashMap};
use std::env;

use serde::{Deserialize, Serialize};

use crate::rchain::provider::{Provider, api_key_env, api_key_envs};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelConfig {
    pub name: String,
    pub provider: Provider,
    pub model_id: String,
    pub supports_vision: bool,
    pub supports_files: bool,
    /// Environment variable holding the credential.
    pub api_key_env: String,
}

impl ModelConfig {
    fn builtin(name: &str, provider: Provider, model_id: &str, supports_vision: bool) -> Self {
        Self {
            name: name.to_string(),
            provider,
            model_id: model_id.to_string(),
            supports_vision,
            supports_files: true,
            api_key_env: api_key_env(provider).to_string(),
        }
    }
}

/// `[models.<name>]` entry in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverride {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub supports_vision: Option<bool>,
    pub supports_files: Option<bool>,
    pub api_key_env: Option<String>,
}

/// Credential values keyed by environment variable name.
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.values.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("Credentials").field("present", &names).finish()
    }
}

impl Credentials {
    /// Reads every provider key from the environment. Alias variables
    /// (e.g. `GEMINI_API_KEY`) fill the primary name when it is unset.
    pub fn from_env() -> Self {
        let mut credentials = Self::default();
        for provider in Provider::ALL {
            let value = api_key_envs(provider)
                .iter()
                .find_map(|name| non_empty_env(name));
            if let Some(value) = value {
                credentials.insert(api_key_env(provider), value);
            }
        }
        credentials
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut credentials = Self::default();
        for (name, value) in pairs {
            credentials.insert(name, value);
        }
        credentials
    }

    /// Loads one extra variable from the environment if it is set.
    pub fn load_env(&mut self, name: &str) {
        if let Some(value) = non_empty_env(name) {
            self.insert(name, value);
        }
    }

    fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.values.insert(name.into(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        self.get(api_key_env(provider))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelConfig>,
    credentials: Credentials,
}

impl ModelRegistry {
    /// The ten models the service ships with.
    pub fn builtin(credentials: Credentials) -> Self {
        let models = [
            ModelConfig::builtin("mistral-large", Provider::Mistral, "mistral-large-latest", false),
            ModelConfig::builtin("mistral-small", Provider::Mistral, "mistral-small-latest", false),
            ModelConfig::builtin("gpt-4o", Provider::Openai, "gpt-4o", true),
            ModelConfig::builtin("gpt-4o-mini", Provider::Openai, "gpt-4o-mini", true),
            ModelConfig::builtin(
                "claude-3-5-sonnet",
                Provider::Anthropic,
                "claude-3-5-sonnet-20241022",
                true,
            ),
            ModelConfig::builtin("gemini-1.5-pro", Provider::Google, "gemini-1.5-pro", true),
            ModelConfig::builtin("gemini-1.5-flash", Provider::Google, "gemini-1.5-flash", true),
            ModelConfig::builtin("gemini-2.0-flash", Provider::Google, "gemini-2.0-flash", true),
            ModelConfig::builtin("gemini-2.5-flash", Provider::Google, "gemini-2.5-flash", true),
            ModelConfig::builtin("gemini-2.5-pro", Provider::Google, "gemini-2.5-pro", true),
        ];
        Self {
            models: models
                .into_iter()
                .map(|model| (model.name.clone(), model))
                .collect(),
            credentials,
        }
    }

    /// Applies `[models.*]` entries: existing names are patched, new names
    /// must carry at least `provider` and `model`.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, ModelOverride>) -> Result<Self, String> {
        for (name, entry) in overrides {
            let mut model = match self.models.get(name) {
                Some(existing) => existing.clone(),
                None => {
                    let provider = entry.provider.ok_or_else(|| {
                        format!("Model '{name}' in config is missing 'provider'.")
                    })?;
                    let model_id = entry
                        .model
                        .clone()
                        .ok_or_else(|| format!("Model '{name}' in config is missing 'model'."))?;
                    ModelConfig {
                        name: name.clone(),
                        provider,
                        model_id,
                        supports_vision: false,
                        supports_files: true,
                        api_key_env: api_key_env(provider).to_string(),
                    }
                }
            };
            if let Some(provider) = entry.provider {
                if provider != model.provider && entry.api_key_env.is_none() {
                    model.api_key_env = api_key_env(provider).to_string();
                }
                model.provider = provider;
            }
            if let Some(model_id) = &entry.model {
                model.model_id = model_id.clone();
            }
            if let Some(supports_vision) = entry.supports_vision {
                model.supports_vision = supports_vision;
            }
            if let Some(supports_files) = entry.supports_files {
                model.supports_files = supports_files;
            }
            if let Some(key_env) = &entry.api_key_env {
                model.api_key_env = key_env.clone();
                if !self.credentials.is_present(key_env) {
                    self.credentials.load_env(key_env);
                }
            }
            self.models.insert(name.clone(), model);
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Non-empty credential for a model, if configured.
    pub fn credential_for(&self, model: &ModelConfig) -> Option<&str> {
        self.credentials.get(&model.api_key_env)
    }

    /// True when the model's provider accepts the web-search tool.
    pub fn supports_web_search(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|model| provider_supports_web_search(model.provider))
    }
}

pub fn provider_supports_web_search(provider: Provider) -> bool {
    matches!(provider, Provider::Anthropic | Provider::Google)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_ten_models() {
        let registry = ModelRegistry::builtin(Credentials::default());
        assert_eq!(registry.models().count(), 10);
        let mistral = registry.get("mistral-large").unwrap();
        assert_eq!(mistral.model_id, "mistral-large-latest");
        assert!(!mistral.supports_vision);
        assert_eq!(
            registry.get("claude-3-5-sonnet").unwrap().model_id,
            "claude-3-5-sonnet-20241022"
        );
        assert!(registry.get("gpt-5").is_none());
    }

    #[test]
    fn blank_credentials_are_not_stored() {
        let credentials = Credentials::from_pairs([("OPENAI_API_KEY", "  "), ("MISTRAL_API_KEY", "m")]);
        assert!(!credentials.is_present("OPENAI_API_KEY"));
        assert_eq!(credentials.for_provider(Provider::Mistral), Some("m"));
    }

    #[test]
    fn credential_lookup_uses_model_key_env() {
        let registry = ModelRegistry::builtin(Credentials::from_pairs([("GOOGLE_API_KEY", "g")]));
        let gemini = registry.get("gemini-2.5-pro").unwrap();
        assert_eq!(registry.credential_for(gemini), Some("g"));
        let gpt = registry.get("gpt-4o").unwrap();
        assert_eq!(registry.credential_for(gpt), None);
    }

    #[test]
    fn overrides_patch_and_add_models() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "gpt-4o".to_string(),
            ModelOverride {
                model: Some("gpt-4o-2024-11-20".into()),
                ..ModelOverride::default()
            },
        );
        overrides.insert(
            "local-llama".to_string(),
            ModelOverride {
                provider: Some(Provider::Openai),
                model: Some("llama-3.1-8b".into()),
                api_key_env: Some("CM_TEST_UNSET_LOCAL_KEY".into()),
                ..ModelOverride::default()
            },
        );
        let registry = ModelRegistry::builtin(Credentials::default())
            .with_overrides(&overrides)
            .unwrap();
        assert_eq!(registry.get("gpt-4o").unwrap().model_id, "gpt-4o-2024-11-20");
        let local = registry.get("local-llama").unwrap();
        assert_eq!(local.provider, Provider::Openai);
        assert_eq!(local.api_key_env, "CM_TEST_UNSET_LOCAL_KEY");
        assert!(!local.supports_vision);
    }

    #[test]
    fn new_model_requires_provider_and_id() {
        let mut overrides = BTreeMap::new();
        overrides.insert("mystery".to_string(), ModelOverride::default());
        let err = ModelRegistry::builtin(Credentials::default())
            .with_overrides(&overrides)
            .unwrap_err();
        assert!(err.contains("missing 'provider'"));
    }

    #[test]
    fn web_search_support_follows_provider() {
        let registry = ModelRegistry::builtin(Credentials::default());
        assert!(registry.supports_web_search("gemini-1.5-flash"));
        assert!(registry.supports_web_search("claude-3-5-sonnet"));
        assert!(!registry.supports_web_search("gpt-4o"));
        assert!(!registry.supports_web_search("unknown"));
    }

    #[test]
    fn debug_output_hides_secret_values() {
        let credentials = Credentials::from_pairs([("OPENAI_API_KEY", "sk-secret")]);
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("OPENAI_API_KEY"));
        assert!(!rendered.contains("sk-secret"));
    }
}
