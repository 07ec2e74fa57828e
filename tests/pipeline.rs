use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatmux::error::ChatError;
use chatmux::images::ImageGenerator;
use chatmux::intent::{IntentClassifier, Judge, ToolSettings, VerdictSource};
use chatmux::orchestrator::{Orchestrator, ReplyEvent};
use chatmux::rchain::ai::AIMessage;
use chatmux::rchain::chat_models::{ChatModel, ChunkStream, ModelConnector, ModelTarget};
use chatmux::rchain::human::{ChatRequest, ChatTurn};
use chatmux::rchain::message::{MessageRole, NormalizedMessage};
use chatmux::rchain::provider::{GenerationParams, Provider, ProviderError};
use chatmux::rchain::tools::ToolDescriptor;
use chatmux::registry::{Credentials, ModelRegistry, provider_supports_web_search};
use futures::StreamExt;

const FOX_DIRECTIVE: &str = "{\"tool\":\"generate_image\",\"prompt\":\"a red fox\"}\nHere is your fox.";
const FOX_URL: &str = "https://img.test/fox.png";

#[derive(Clone, Default)]
struct Script {
    chunks: Vec<String>,
    stream_error: Option<String>,
    invoke_error: Option<String>,
    endless: Option<Arc<AtomicBool>>,
}

impl Script {
    fn chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|chunk| chunk.to_string()).collect(),
            ..Self::default()
        }
    }
}

type Call = (Vec<NormalizedMessage>, Vec<ToolDescriptor>);

struct FakeModel {
    provider: Provider,
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn supports_web_search(&self) -> bool {
        provider_supports_web_search(self.provider)
    }

    async fn invoke(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<AIMessage, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.to_vec()));
        match &self.script.invoke_error {
            Some(message) => Err(ProviderError::Stream {
                provider: self.provider,
                message: message.clone(),
            }),
            None => Ok(AIMessage::text(self.script.chunks.concat())),
        }
    }

    async fn stream(
        &self,
        messages: &[NormalizedMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChunkStream, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.to_vec()));
        let provider = self.provider;
        let chunks = self.script.chunks.clone();
        let stream_error = self.script.stream_error.clone();
        let guard = self.script.endless.clone().map(DropFlag);
        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for chunk in chunks {
                yield Ok(chunk);
            }
            if let Some(message) = stream_error {
                yield Err(ProviderError::Stream { provider, message });
            }
            if _guard.is_some() {
                loop {
                    yield Ok("tick".to_string());
                }
            }
        }))
    }
}

#[derive(Default)]
struct FakeConnector {
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
    targets: Mutex<Vec<(ModelTarget, GenerationParams)>>,
}

impl FakeConnector {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn connect_count(&self) -> usize {
        self.targets.lock().unwrap().len()
    }
}

impl ModelConnector for FakeConnector {
    fn connect(&self, target: ModelTarget, params: GenerationParams) -> Arc<dyn ChatModel> {
        let provider = target.provider;
        self.targets.lock().unwrap().push((target, params));
        Arc::new(FakeModel {
            provider,
            script: self.script.clone(),
            calls: Arc::clone(&self.calls),
        })
    }
}

#[derive(Default)]
struct FakeImages {
    prompts: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, prompt: &str, model_hint: Option<&str>) -> String {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), model_hint.map(str::to_string)));
        FOX_URL.to_string()
    }
}

fn credentials() -> Credentials {
    Credentials::from_pairs([
        ("OPENAI_API_KEY", "sk-test"),
        ("ANTHROPIC_API_KEY", "ak-test"),
    ])
}

fn orchestrator(connector: Arc<FakeConnector>, images: Arc<FakeImages>) -> Orchestrator {
    let classifier = IntentClassifier::new(ToolSettings::default(), None).with_year(2025);
    Orchestrator::new(
        Arc::new(ModelRegistry::builtin(credentials())),
        connector,
        Arc::new(classifier),
        images,
    )
}

async fn collect(orchestrator: &Orchestrator, request: &ChatRequest) -> Vec<ReplyEvent> {
    orchestrator
        .stream(request)
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await
}

#[tokio::test]
async fn streamed_directive_is_replaced_by_image_markdown() {
    let connector = FakeConnector::new(Script::chunks(&[FOX_DIRECTIVE, " Enjoy!"]));
    let images = Arc::new(FakeImages::default());
    let orchestrator = orchestrator(Arc::clone(&connector), Arc::clone(&images));

    let events = collect(&orchestrator, &ChatRequest::new("gpt-4o-mini", "draw a red fox")).await;

    assert_eq!(
        events,
        vec![
            ReplyEvent::Chunk(format!("![generated image]({FOX_URL})\n\nHere is your fox.")),
            ReplyEvent::Chunk(" Enjoy!".to_string()),
        ]
    );
    assert_eq!(
        *images.prompts.lock().unwrap(),
        vec![("a red fox".to_string(), None)]
    );

    let calls = connector.calls();
    let (messages, tools) = &calls[0];
    assert!(tools.is_empty());
    assert_eq!(messages[0].role, MessageRole::System);
    assert!(messages[0].content.joined_text().contains("generate_image"));
    assert_eq!(messages[1], NormalizedMessage::user("draw a red fox"));
}

#[tokio::test]
async fn only_the_first_chunk_is_inspected() {
    let connector = FakeConnector::new(Script::chunks(&["Sure.\n", FOX_DIRECTIVE]));
    let images = Arc::new(FakeImages::default());
    let orchestrator = orchestrator(connector, Arc::clone(&images));

    let events = collect(&orchestrator, &ChatRequest::new("gpt-4o-mini", "draw a red fox")).await;

    assert_eq!(
        events,
        vec![
            ReplyEvent::Chunk("Sure.\n".to_string()),
            ReplyEvent::Chunk(FOX_DIRECTIVE.to_string()),
        ]
    );
    assert!(images.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn directive_passes_through_when_images_are_not_requested() {
    let connector = FakeConnector::new(Script::chunks(&[FOX_DIRECTIVE]));
    let images = Arc::new(FakeImages::default());
    let orchestrator = orchestrator(Arc::clone(&connector), Arc::clone(&images));

    let events = collect(&orchestrator, &ChatRequest::new("gpt-4o-mini", "tell me about foxes")).await;

    assert_eq!(events, vec![ReplyEvent::Chunk(FOX_DIRECTIVE.to_string())]);
    assert!(images.prompts.lock().unwrap().is_empty());
    let (messages, _) = &connector.calls()[0];
    assert_eq!(messages, &vec![NormalizedMessage::user("tell me about foxes")]);
}

#[tokio::test]
async fn invoke_splices_directive_and_reports_it() {
    let connector = FakeConnector::new(Script::chunks(&[FOX_DIRECTIVE]));
    let images = Arc::new(FakeImages::default());
    let orchestrator = orchestrator(connector, images);

    let reply = orchestrator
        .invoke(&ChatRequest::new("gpt-4o", "please generate an image of a fox"))
        .await
        .unwrap();

    assert_eq!(
        reply.response,
        format!("![generated image]({FOX_URL})\n\nHere is your fox.")
    );
    assert_eq!(reply.error, None);
    assert_eq!(reply.tool_intent.unwrap().prompt, "a red fox");
}

#[tokio::test]
async fn invoke_reports_no_intent_when_images_are_not_requested() {
    let connector = FakeConnector::new(Script::chunks(&[FOX_DIRECTIVE]));
    let images = Arc::new(FakeImages::default());
    let orchestrator = orchestrator(connector, Arc::clone(&images));

    let reply = orchestrator
        .invoke(&ChatRequest::new("gpt-4o-mini", "tell me about foxes"))
        .await
        .unwrap();

    assert_eq!(reply.response, FOX_DIRECTIVE);
    assert_eq!(reply.tool_intent, None);
    assert!(images.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_credential_is_a_typed_error_without_network() {
    let connector = FakeConnector::new(Script::chunks(&["unused"]));
    let orchestrator = orchestrator(Arc::clone(&connector), Arc::new(FakeImages::default()));
    let request = ChatRequest::new("mistral-large", "hello");

    let err = orchestrator.invoke(&request).await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::MissingCredential { provider: Provider::Mistral, ref key_env } if key_env == "MISTRAL_API_KEY"
    ));
    assert!(orchestrator.stream(&request).await.is_err());
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn unknown_model_is_rejected() {
    let orchestrator = orchestrator(FakeConnector::new(Script::default()), Arc::new(FakeImages::default()));
    let err = orchestrator
        .invoke(&ChatRequest::new("gpt-9", "hello"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unsupported model: gpt-9");
}

#[tokio::test]
async fn empty_request_short_circuits_before_model_lookup() {
    let connector = FakeConnector::new(Script::chunks(&["unused"]));
    let orchestrator = orchestrator(Arc::clone(&connector), Arc::new(FakeImages::default()));
    let request = ChatRequest::new("not-a-model", "");

    let reply = orchestrator.invoke(&request).await.unwrap();
    assert_eq!(reply.response, "No message content provided.");
    assert_eq!(
        collect(&orchestrator, &request).await,
        vec![ReplyEvent::Chunk("No message content provided.".to_string())]
    );
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn provider_failures_become_error_text() {
    let connector = FakeConnector::new(Script {
        chunks: vec!["partial".to_string()],
        stream_error: Some("connection reset".to_string()),
        invoke_error: Some("boom".to_string()),
        endless: None,
    });
    let orchestrator = orchestrator(connector, Arc::new(FakeImages::default()));
    let request = ChatRequest::new("gpt-4o-mini", "hello");

    let reply = orchestrator.invoke(&request).await.unwrap();
    let expected = "Error generating response: openai stream error: boom";
    assert_eq!(reply.error.as_deref(), Some(expected));
    assert_eq!(reply.response, expected);

    assert_eq!(
        collect(&orchestrator, &request).await,
        vec![
            ReplyEvent::Chunk("partial".to_string()),
            ReplyEvent::Error(
                "Error generating response: openai stream error: connection reset".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn empty_model_output_has_fixed_reply() {
    let connector = FakeConnector::new(Script::chunks(&["  "]));
    let orchestrator = orchestrator(connector, Arc::new(FakeImages::default()));
    let reply = orchestrator
        .invoke(&ChatRequest::new("gpt-4o-mini", "hello"))
        .await
        .unwrap();
    assert_eq!(reply.response, "No response from model.");
}

#[tokio::test]
async fn forced_search_reaches_grounding_provider_after_system_prompt() {
    let connector = FakeConnector::new(Script::chunks(&["Rust 1.80 shipped LazyLock."]));
    let orchestrator = orchestrator(Arc::clone(&connector), Arc::new(FakeImages::default()));
    let request = ChatRequest::new("claude-3-5-sonnet", "search online for rust 1.80 release notes")
        .with_system_prompt("Be brief.");

    let reply = orchestrator.invoke(&request).await.unwrap();
    assert_eq!(reply.response, "Rust 1.80 shipped LazyLock.");

    let (messages, tools) = &connector.calls()[0];
    assert_eq!(tools, &vec![ToolDescriptor::web_search(3)]);
    assert_eq!(messages[0], NormalizedMessage::system("Be brief."));
    assert_eq!(messages[1].role, MessageRole::System);
    assert!(messages[1].content.joined_text().contains("at most 3"));
    assert_eq!(messages[2].role, MessageRole::User);
}

#[tokio::test]
async fn history_is_sent_before_the_current_turn() {
    let connector = FakeConnector::new(Script::chunks(&["ok"]));
    let orchestrator = orchestrator(Arc::clone(&connector), Arc::new(FakeImages::default()));
    let request = ChatRequest::new("gpt-4o-mini", "and now?")
        .with_history(vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")]);

    orchestrator.invoke(&request).await.unwrap();
    let (messages, _) = &connector.calls()[0];
    let roles = messages.iter().map(|message| message.role).collect::<Vec<_>>();
    assert_eq!(
        roles,
        vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
    );
}

#[tokio::test]
async fn dropping_the_reply_stream_drops_the_provider_stream() {
    let dropped = Arc::new(AtomicBool::new(false));
    let connector = FakeConnector::new(Script {
        chunks: vec!["first".to_string()],
        endless: Some(Arc::clone(&dropped)),
        ..Script::default()
    });
    let orchestrator = orchestrator(connector, Arc::new(FakeImages::default()));

    let mut events = orchestrator
        .stream(&ChatRequest::new("gpt-4o-mini", "count forever"))
        .await
        .unwrap();
    assert_eq!(events.next().await, Some(ReplyEvent::Chunk("first".to_string())));
    assert_eq!(events.next().await, Some(ReplyEvent::Chunk("tick".to_string())));
    assert!(!dropped.load(Ordering::SeqCst));

    drop(events);
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn judge_verdict_drives_search_and_uses_judge_params() {
    let judge_connector = FakeConnector::new(Script::chunks(&[
        r#"{"needs_realtime": true, "category": "weather", "confidence": 91}"#,
    ]));
    let judge = Judge::new(
        judge_connector.clone(),
        Credentials::from_pairs([("GOOGLE_API_KEY", "g"), ("OPENAI_API_KEY", "o")]),
        Some(10),
    );
    let classifier = IntentClassifier::new(ToolSettings::default(), Some(judge));

    let policy = classifier.classify("should I pack an umbrella", &[]).await;
    assert!(policy.wants_web_search());
    assert_eq!(policy.intent.source, VerdictSource::Judge);
    assert_eq!(policy.intent.score, 91);

    let targets = judge_connector.targets.lock().unwrap();
    let (target, params) = &targets[0];
    assert_eq!(target.provider, Provider::Google);
    assert_eq!(target.model_id, "gemini-1.5-flash");
    assert_eq!(params.temperature, 0.0);
    assert_eq!(params.max_tokens, 256);
    assert_eq!(params.timeout_secs, Some(10));

    let (messages, tools) = &judge_connector.calls()[0];
    assert!(tools.is_empty());
    assert!(messages[0].content.joined_text().starts_with("You are an Intent Decider."));
    assert!(messages[1].content.joined_text().contains("should I pack an umbrella"));
}

#[tokio::test]
async fn judge_failure_falls_back_to_heuristics() {
    let judge_connector = FakeConnector::new(Script {
        invoke_error: Some("unavailable".to_string()),
        ..Script::default()
    });
    let judge = Judge::new(
        judge_connector,
        Credentials::from_pairs([("MISTRAL_API_KEY", "m")]),
        None,
    );
    let classifier = IntentClassifier::new(ToolSettings::default(), Some(judge)).with_year(2025);

    let policy = classifier.classify("latest AAPL stock price today", &[]).await;
    assert!(policy.wants_web_search());
    assert_eq!(policy.intent.source, VerdictSource::Heuristic);
}

#[tokio::test]
async fn judge_is_not_called_when_the_model_cannot_ground() {
    let judge_connector = FakeConnector::new(Script::chunks(&[r#"{"needs_realtime": true}"#]));
    let judge = Judge::new(
        judge_connector.clone(),
        Credentials::from_pairs([("OPENAI_API_KEY", "o")]),
        None,
    );
    let classifier = IntentClassifier::new(ToolSettings::default(), Some(judge));

    let policy = classifier
        .resolve("latest AAPL stock price today", &[], false)
        .await;
    assert!(!policy.wants_web_search());
    assert_eq!(judge_connector.connect_count(), 0);
}
