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

const PROVIDER: Provider = Provider::Google;

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    client: reqwest::Client,
    target: ModelTarget,
    params: GenerationParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum WirePart {
    InlineData { mime_type: String, data: String },
    FileData { mime_type: String, file_uri: String },
    #[serde(untagged)]
    Text { text: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireTool {
    google_search: EmptyObject,
}

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl GenerateContentResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

impl GeminiModel {
    pub fn new(client: reqwest::Client, target: ModelTarget, params: GenerationParams) -> Self {
        Self {
            client,
            target,
            params,
        }
    }

    fn url(&self, stream: bool) -> String {
        let base = endpoint(PROVIDER);
        let model = &self.target.model_id;
        if stream {
            format!("{base}/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/{model}:generateContent")
        }
    }

    fn payload(&self, messages: &[NormalizedMessage], tools: &[ToolDescriptor]) -> GenerateContentRequest {
        let system_parts = messages
            .iter()
            .filter(|message| message.is_system())
            .map(|message| WirePart::Text {
                text: message.content.joined_text(),
            })
            .collect::<Vec<_>>();
        GenerateContentRequest {
            contents: messages
                .iter()
                .filter(|message| !message.is_system())
                .map(to_wire)
                .collect(),
            system_instruction: (!system_parts.is_empty()).then_some(WireContent {
                role: None,
                parts: system_parts,
            }),
            generation_config: GenerationConfig {
                temperature: self.params.temperature,
                max_output_tokens: self.params.max_tokens,
            },
            tools: web_search_budget(tools)
                .map(|_| WireTool {
                    google_search: EmptyObject {},
                })
                .into_iter()
                .collect(),
        }
    }

    async fn send(&self, stream: bool, payload: &GenerateContentRequest) -> Result<reqwest::Response, ProviderError> {
        post_json(
            &self.client,
            PROVIDER,
            &self.url(stream),
            Auth::GoogleKey(&self.target.api_key),
            payload,
            self.params,
        )
        .await
    }
}

fn to_wire(message: &NormalizedMessage) -> WireContent {
    let role = match message.role {
        MessageRole::Assistant => "model",
        MessageRole::User | MessageRole::System => "user",
    };
    let parts = message
        .content
        .parts()
        .into_iter()
        .map(|part| match part {
            ContentPart::Text(text) => WirePart::Text { text },
            ContentPart::Image(image) => match image.source {
                ImageSource::Inline(bytes) => WirePart::InlineData {
                    mime_type: image.mime_type,
                    data: STANDARD.encode(bytes),
                },
                ImageSource::Url(file_uri) => WirePart::FileData {
                    mime_type: image.mime_type,
                    file_uri,
                },
            },
        })
        .collect();
    WireContent {
        role: Some(role),
        parts,
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
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
        let response = self.send(false, &self.payload(messages, tools)).await?;
        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|source| ProviderError::Request {
                provider: PROVIDER,
                source,
            })?;
        Ok(AIMessage::text(body.text()))
    }

    async fn stream(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChunkStream, ProviderError> {
        let response = self.send(true, &self.payload(messages, tools)).await?;
        Ok(sse::text_chunks(response, PROVIDER, |_, data| decode_event(data)))
    }
}

fn decode_event(data: &str) -> Result<SseStep, ProviderError> {
    let chunk: GenerateContentResponse = sse::parse_event(PROVIDER, data)?;
    if let Some(error) = chunk.error {
        return Err(ProviderError::Stream {
            provider: PROVIDER,
            message: error.message,
        });
    }
    Ok(SseStep::Text(chunk.text()))
}
