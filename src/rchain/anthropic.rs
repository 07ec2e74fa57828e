use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::rchain::ai::AIMessage;
use crate::rchain::chat_models::{ChatModel, ChunkStream, ModelTarget};
use crate::rchain::chat_runtime::{Auth, post_json};
use crate::rchain::message::{ContentPart, ImageSource, MessageContent, MessageRole, NormalizedMessage};
use crate::rchain::provider::{GenerationParams, Provider, ProviderError, endpoint};
use crate::rchain::sse::{self, SseStep};
use crate::rchain::tools::{ToolDescriptor, web_search_budget};

const PROVIDER: Provider = Provider::Anthropic;
const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";

/// Messages API client.
#[derive(Debug, Clone)]
pub struct AnthropicModel {
    client: reqwest::Client,
    target: ModelTarget,
    params: GenerationParams,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text { text: String },
    Image { source: WireImageSource },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    delta: DeltaPayload,
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    error: ErrorPayload,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

impl AnthropicModel {
    pub fn new(client: reqwest::Client, target: ModelTarget, params: GenerationParams) -> Self {
        Self {
            client,
            target,
            params,
        }
    }

    fn payload(&self, messages: &[NormalizedMessage], tools: &[ToolDescriptor], stream: bool) -> MessagesRequest {
        let system = messages
            .iter()
            .filter(|message| message.is_system())
            .map(|message| message.content.joined_text())
            .collect::<Vec<_>>();
        let tools = web_search_budget(tools)
            .map(|max_uses| WireTool {
                kind: WEB_SEARCH_TOOL_TYPE,
                name: "web_search",
                max_uses,
            })
            .into_iter()
            .collect();
        MessagesRequest {
            model: self.target.model_id.clone(),
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: messages
                .iter()
                .filter(|message| !message.is_system())
                .map(to_wire)
                .collect(),
            tools,
            stream,
        }
    }

    async fn send(&self, payload: &MessagesRequest) -> Result<reqwest::Response, ProviderError> {
        post_json(
            &self.client,
            PROVIDER,
            endpoint(PROVIDER),
            Auth::AnthropicKey(&self.target.api_key),
            payload,
            self.params,
        )
        .await
    }
}

fn to_wire(message: &NormalizedMessage) -> WireMessage {
    let role = match message.role {
        MessageRole::Assistant => "assistant",
        MessageRole::User | MessageRole::System => "user",
    };
    let content = match &message.content {
        MessageContent::Text(text) => WireContent::Text(text.clone()),
        MessageContent::Parts(parts) => WireContent::Blocks(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => WireBlock::Text { text: text.clone() },
                    ContentPart::Image(image) => WireBlock::Image {
                        source: match &image.source {
                            ImageSource::Inline(bytes) => WireImageSource::Base64 {
                                media_type: image.mime_type.clone(),
                                data: STANDARD.encode(bytes),
                            },
                            ImageSource::Url(url) => WireImageSource::Url { url: url.clone() },
                        },
                    },
                })
                .collect(),
        ),
    };
    WireMessage { role, content }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    fn supports_web_search(&self) -> bool {
        true
    }

    async fn invoke(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<AIMessage, ProviderError> {
        let response = self.send(&self.payload(messages, tools, false)).await?;
        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|source| ProviderError::Request {
                provider: PROVIDER,
                source,
            })?;
        let text = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<String>();
        Ok(AIMessage::text(text))
    }

    async fn stream(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChunkStream, ProviderError> {
        let response = self.send(&self.payload(messages, tools, true)).await?;
        Ok(sse::text_chunks(response, PROVIDER, decode_event))
    }
}

fn decode_event(event: &str, data: &str) -> Result<SseStep, ProviderError> {
    match event {
        "content_block_delta" => {
            let delta: ContentBlockDelta = sse::parse_event(PROVIDER, data)?;
            if delta.delta.kind == "text_delta" {
                Ok(SseStep::Text(delta.delta.text.unwrap_or_default()))
            } else {
                Ok(SseStep::Skip)
            }
        }
        "message_stop" => Ok(SseStep::Done),
        "error" => {
            let error: StreamError = sse::parse_event(PROVIDER, data)?;
            Err(ProviderError::Stream {
                provider: PROVIDER,
                message: error.error.message,
            })
        }
        _ => Ok(SseStep::Skip),
    }
}
