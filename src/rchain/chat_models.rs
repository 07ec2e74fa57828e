use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::debug;

use crate::error::ChatError;
use crate::rchain::ai::AIMessage;
use crate::rchain::message::NormalizedMessage;
use crate::rchain::provider::{GenerationParams, Provider, ProviderError};
use crate::rchain::tools::ToolDescriptor;
use crate::rchain::{anthropic, google, openai, vision};
use crate::registry::{ModelConfig, ModelRegistry};

/// Ordered text chunks of a streamed reply.
pub type ChunkStream = BoxStream<'static, Result<String, ProviderError>>;

/// A provider model bound to its credential and generation parameters.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether a [`ToolDescriptor::WebSearch`] passed to this model is honored.
    fn supports_web_search(&self) -> bool;

    async fn invoke(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<AIMessage, ProviderError>;

    async fn stream(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChunkStream, ProviderError>;
}

/// Everything an adapter needs to reach one concrete model.
#[derive(Clone)]
pub struct ModelTarget {
    pub provider: Provider,
    pub model_id: String,
    pub api_key: String,
}

impl std::fmt::Debug for ModelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelTarget")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_key_present", &!self.api_key.is_empty())
            .finish()
    }
}

/// Builds [`ChatModel`]s. Swapped for fakes in tests.
pub trait ModelConnector: Send + Sync {
    fn connect(&self, target: ModelTarget, params: GenerationParams) -> Arc<dyn ChatModel>;
}

/// Connector backed by the reqwest adapters, sharing one client.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ModelConnector for HttpConnector {
    fn connect(&self, target: ModelTarget, params: GenerationParams) -> Arc<dyn ChatModel> {
        let client = self.client.clone();
        match target.provider {
            Provider::Openai | Provider::Mistral => {
                Arc::new(openai::ChatCompletionsModel::new(client, target, params))
            }
            Provider::Anthropic => Arc::new(anthropic::AnthropicModel::new(client, target, params)),
            Provider::Google => Arc::new(google::GeminiModel::new(client, target, params)),
        }
    }
}

/// A resolved logical model ready for calls.
#[derive(Clone)]
pub struct ModelHandle {
    pub config: ModelConfig,
    pub params: GenerationParams,
    model: Arc<dyn ChatModel>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("config", &self.config)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Provider of the bound adapter.
    pub fn provider(&self) -> Provider {
        self.model.provider()
    }

    pub fn supports_web_search(&self) -> bool {
        self.model.supports_web_search()
    }

    pub async fn invoke(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<AIMessage, ProviderError> {
        let messages = self.prepare(messages);
        self.model.invoke(&messages, tools).await
    }

    pub async fn stream(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChunkStream, ProviderError> {
        let messages = self.prepare(messages);
        self.model.stream(&messages, tools).await
    }

    fn prepare(&self, messages: &[NormalizedMessage]) -> Vec<NormalizedMessage> {
        vision::adapt_messages(self.config.provider, self.config.supports_vision, messages)
    }
}

/// Resolves a logical model name to a callable handle.
pub fn get_model_handle(
    registry: &ModelRegistry,
    connector: &dyn ModelConnector,
    name: &str,
    timeout_secs: Option<u64>,
) -> Result<ModelHandle, ChatError> {
    let config = registry
        .get(name)
        .ok_or_else(|| ChatError::UnsupportedModel(name.to_string()))?;
    let api_key = registry
        .credential_for(config)
        .ok_or_else(|| ChatError::MissingCredential {
            provider: config.provider,
            key_env: config.api_key_env.clone(),
        })?;
    let params = GenerationParams::chat(timeout_secs);
    debug!(
        model = name,
        provider = config.provider.as_str(),
        model_id = %config.model_id,
        api_key_present = true,
        "resolved model handle"
    );
    let model = connector.connect(
        ModelTarget {
            provider: config.provider,
            model_id: config.model_id.clone(),
            api_key: api_key.to_string(),
        },
        params,
    );
    Ok(ModelHandle {
        config: config.clone(),
        params,
        model,
    })
}
