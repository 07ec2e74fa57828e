//! Request pipeline: messages, tool policy, model call, directive splice.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::Serialize;
use tracing::{debug, warn};

use crate::conversation::build_messages;
use crate::error::ChatError;
use crate::images::ImageGenerator;
use crate::intent::{IntentClassifier, ToolPolicy};
use crate::rchain::ai::{ToolDirective, image_markdown};
use crate::rchain::chat_models::{ModelConnector, get_model_handle};
use crate::rchain::human::ChatRequest;
use crate::rchain::message::NormalizedMessage;
use crate::rchain::provider::{GenerationParams, ProviderError};
use crate::registry::{ModelConfig, ModelRegistry};

pub const NO_MESSAGE_CONTENT: &str = "No message content provided.";
pub const NO_VALID_CONTENT: &str = "No valid content to process.";
pub const NO_RESPONSE: &str = "No response from model.";

/// Result of a single-shot call. `error` is set when generation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub tool_intent: Option<ToolDirective>,
}

impl ChatReply {
    fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            error: None,
            tool_intent: None,
        }
    }

    fn failure(err: &ProviderError) -> Self {
        let message = generation_error(err);
        Self {
            response: message.clone(),
            error: Some(message),
            tool_intent: None,
        }
    }
}

/// One item of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyEvent {
    Chunk(String),
    Error(String),
}

pub type ReplyStream = BoxStream<'static, ReplyEvent>;

/// What a request would send, computed without credentials or network.
#[derive(Debug, Clone, Serialize)]
pub struct RequestPreview {
    pub model: ModelConfig,
    pub params: GenerationParams,
    pub api_key_present: bool,
    pub messages: Vec<NormalizedMessage>,
    pub policy: ToolPolicy,
}

pub struct Orchestrator {
    registry: Arc<ModelRegistry>,
    connector: Arc<dyn ModelConnector>,
    classifier: Arc<IntentClassifier>,
    images: Arc<dyn ImageGenerator>,
    timeout_secs: Option<u64>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        connector: Arc<dyn ModelConnector>,
        classifier: Arc<IntentClassifier>,
        images: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            registry,
            connector,
            classifier,
            images,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Single-shot generation.
    pub async fn invoke(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        if !request.has_content() {
            return Ok(ChatReply::text(NO_MESSAGE_CONTENT));
        }
        let handle = get_model_handle(
            &self.registry,
            self.connector.as_ref(),
            &request.model_name,
            self.timeout_secs,
        )?;
        let mut messages = build_request_messages(request);
        if messages.is_empty() {
            return Ok(ChatReply::text(NO_VALID_CONTENT));
        }
        let policy = self
            .classifier
            .resolve(&request.text, &request.history, handle.supports_web_search())
            .await;
        insert_policy_text(&mut messages, policy.policy_text.as_deref());

        let message = match handle.invoke(&messages, &policy.tools).await {
            Ok(message) => message,
            Err(ProviderError::EmptyResponse { .. }) => return Ok(ChatReply::text(NO_RESPONSE)),
            Err(err) => {
                warn!(
                    provider = handle.provider().as_str(),
                    model = handle.name(),
                    error = %err,
                    "generation failed"
                );
                return Ok(ChatReply::failure(&err));
            }
        };
        if message.content.trim().is_empty() {
            return Ok(ChatReply::text(NO_RESPONSE));
        }
        if policy.image_directive_enabled {
            if let Some((directive, rest)) = ToolDirective::split_leading(&message.content) {
                let response = self.splice(&directive, rest).await;
                return Ok(ChatReply {
                    response,
                    error: None,
                    tool_intent: Some(directive),
                });
            }
        }
        Ok(ChatReply::text(message.content))
    }

    /// Streaming generation. Only the first non-empty chunk is checked for
    /// an image directive. Dropping the returned stream drops the provider
    /// stream with it.
    pub async fn stream(&self, request: &ChatRequest) -> Result<ReplyStream, ChatError> {
        if !request.has_content() {
            return Ok(single(NO_MESSAGE_CONTENT));
        }
        let handle = get_model_handle(
            &self.registry,
            self.connector.as_ref(),
            &request.model_name,
            self.timeout_secs,
        )?;
        let mut messages = build_request_messages(request);
        if messages.is_empty() {
            return Ok(single(NO_VALID_CONTENT));
        }
        let policy = self
            .classifier
            .resolve(&request.text, &request.history, handle.supports_web_search())
            .await;
        insert_policy_text(&mut messages, policy.policy_text.as_deref());

        let images = Arc::clone(&self.images);
        let mut inspect_first = policy.image_directive_enabled;
        let tools = policy.tools;
        let events = async_stream::stream! {
            let mut chunks = match handle.stream(&messages, &tools).await {
                Ok(chunks) => chunks,
                Err(err) => {
                    warn!(
                        provider = handle.provider().as_str(),
                        model = handle.name(),
                        error = %err,
                        "stream setup failed"
                    );
                    yield ReplyEvent::Error(generation_error(&err));
                    return;
                }
            };
            while let Some(chunk) = chunks.next().await {
                let text = match chunk {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(
                            provider = handle.provider().as_str(),
                            model = handle.name(),
                            error = %err,
                            "stream interrupted"
                        );
                        yield ReplyEvent::Error(generation_error(&err));
                        return;
                    }
                };
                if text.is_empty() {
                    continue;
                }
                if inspect_first {
                    inspect_first = false;
                    if let Some((directive, rest)) = ToolDirective::split_leading(&text) {
                        debug!(prompt = %directive.prompt, "image directive in first chunk");
                        let url = images.generate(&directive.prompt, directive.model.as_deref()).await;
                        yield ReplyEvent::Chunk(format!("{}{rest}", image_markdown(&url)));
                        continue;
                    }
                }
                yield ReplyEvent::Chunk(text);
            }
        };
        Ok(Box::pin(events))
    }

    /// Messages and tool policy for `request` using heuristics only.
    pub fn preview(&self, request: &ChatRequest) -> Result<RequestPreview, ChatError> {
        let model = self
            .registry
            .get(&request.model_name)
            .ok_or_else(|| ChatError::UnsupportedModel(request.model_name.clone()))?;
        let mut messages = build_request_messages(request);
        let policy = self.classifier.classify_offline(
            &request.text,
            &request.history,
            self.registry.supports_web_search(&request.model_name),
        );
        insert_policy_text(&mut messages, policy.policy_text.as_deref());
        Ok(RequestPreview {
            model: model.clone(),
            params: GenerationParams::chat(self.timeout_secs),
            api_key_present: self.registry.credential_for(model).is_some(),
            messages,
            policy,
        })
    }

    async fn splice(&self, directive: &ToolDirective, rest: &str) -> String {
        debug!(prompt = %directive.prompt, "image directive in response");
        let url = self
            .images
            .generate(&directive.prompt, directive.model.as_deref())
            .await;
        format!("{}{rest}", image_markdown(&url))
    }
}

fn build_request_messages(request: &ChatRequest) -> Vec<NormalizedMessage> {
    build_messages(
        &request.history,
        &request.text,
        &request.attachments,
        request.system_prompt.as_deref(),
    )
}

/// Places the policy right after a leading system message, or first.
pub fn insert_policy_text(messages: &mut Vec<NormalizedMessage>, policy_text: Option<&str>) {
    let Some(text) = policy_text else {
        return;
    };
    let index = usize::from(messages.first().is_some_and(NormalizedMessage::is_system));
    messages.insert(index, NormalizedMessage::system(text));
}

fn generation_error(err: &ProviderError) -> String {
    format!("Error generating response: {err}")
}

fn single(text: &str) -> ReplyStream {
    Box::pin(stream::once(std::future::ready(ReplyEvent::Chunk(text.to_string()))))
}
