use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rchain::ai::AIMessage;
use crate::rchain::chat_models::{ChatModel, ChunkStream, ModelTarget};
use crate::rchain::chat_runtime::{Auth, post_json};
use crate::rchain::message::{ContentPart, MessageContent, MessageRole, NormalizedMessage};
use crate::rchain::provider::{GenerationParams, Provider, ProviderError, endpoint};
use crate::rchain::sse::{self, SseStep};
use crate::rchain::tools::ToolDescriptor;

/// Chat-completions client shared by OpenAI and Mistral.
#[derive(Debug, Clone)]
pub struct ChatCompletionsModel {
    client: reqwest::Client,
    target: ModelTarget,
    params: GenerationParams,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: MessageRole,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ImageUrl {
    Object { url: String },
    Bare(String),
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

impl ChatCompletionsModel {
    pub fn new(client: reqwest::Client, target: ModelTarget, params: GenerationParams) -> Self {
        Self {
            client,
            target,
            params,
        }
    }

    fn provider_id(&self) -> Provider {
        self.target.provider
    }

    fn payload(&self, messages: &[NormalizedMessage], tools: &[ToolDescriptor], stream: bool) -> ChatCompletionRequest {
        if !tools.is_empty() {
            debug!(
                provider = self.provider_id().as_str(),
                tools = tools.len(),
                "web search is not available on chat completions; dropping tools"
            );
        }
        ChatCompletionRequest {
            model: self.target.model_id.clone(),
            messages: messages
                .iter()
                .map(|message| to_wire(self.provider_id(), message))
                .collect(),
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            stream,
        }
    }

    async fn send(&self, payload: &ChatCompletionRequest) -> Result<reqwest::Response, ProviderError> {
        post_json(
            &self.client,
            self.provider_id(),
            endpoint(self.provider_id()),
            Auth::Bearer(&self.target.api_key),
            payload,
            self.params,
        )
        .await
    }
}

fn to_wire(provider: Provider, message: &NormalizedMessage) -> WireMessage {
    let content = match &message.content {
        MessageContent::Text(text) => WireContent::Text(text.clone()),
        MessageContent::Parts(parts) => WireContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => WirePart::Text { text: text.clone() },
                    ContentPart::Image(image) => {
                        let url = image.to_url();
                        let image_url = match provider {
                            Provider::Mistral => ImageUrl::Bare(url),
                            _ => ImageUrl::Object { url },
                        };
                        WirePart::ImageUrl { image_url }
                    }
                })
                .collect(),
        ),
    };
    WireMessage {
        role: message.role,
        content,
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsModel {
    fn provider(&self) -> Provider {
        self.provider_id()
    }

    fn supports_web_search(&self) -> bool {
        false
    }

    async fn invoke(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<AIMessage, ProviderError> {
        let provider = self.provider_id();
        let response = self.send(&self.payload(messages, tools, false)).await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|source| ProviderError::Request { provider, source })?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse { provider })?;
        Ok(AIMessage::text(choice.message.content.unwrap_or_default()))
    }

    async fn stream(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChunkStream, ProviderError> {
        let provider = self.provider_id();
        let response = self.send(&self.payload(messages, tools, true)).await?;
        Ok(sse::text_chunks(response, provider, move |_, data| {
            decode_chunk(provider, data)
        }))
    }
}

fn decode_chunk(provider: Provider, data: &str) -> Result<SseStep, ProviderError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseStep::Done);
    }
    let chunk: ChatCompletionChunk = sse::parse_event(provider, data)?;
    let text = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect::<String>();
    Ok(SseStep::Text(text))
}
