use thiserror::Error;

use crate::rchain::provider::{Provider, ProviderError};

/// Failures a caller of the chat pipeline can see.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("API key not found for {provider} models (set {key_env})")]
    MissingCredential { provider: Provider, key_env: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_the_variable() {
        let err = ChatError::MissingCredential {
            provider: Provider::Mistral,
            key_env: "MISTRAL_API_KEY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API key not found for mistral models (set MISTRAL_API_KEY)"
        );
        assert_eq!(
            ChatError::UnsupportedModel("gpt-9".into()).to_string(),
            "Unsupported model: gpt-9"
        );
    }
}
