use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use super::{build_classifier, build_registry, http_client, read_json};
use crate::config;
use crate::intent::{ToolPolicy, ToggleMode};
use crate::logging::{self, Verbosity};
use crate::rchain::chat_models::{HttpConnector, ModelConnector};
use crate::rchain::human::ChatTurn;

#[derive(Debug, Args, Clone)]
pub struct ClassifyArgs {
    pub prompt: String,
    /// Heuristics only; no judge call.
    #[arg(long)]
    pub offline: bool,
    /// Resolve for this model (web search only where its provider grounds).
    #[arg(long, short = 'm')]
    pub model: Option<String>,
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,
    #[arg(long)]
    pub tools: Option<ToggleMode>,
    #[arg(long = "image-tool")]
    pub image_tool: Option<ToggleMode>,
    #[arg(long)]
    pub json: bool,
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

pub async fn run(args: ClassifyArgs) -> Result<(), String> {
    logging::init(Verbosity::from_flags(args.verbose, false));
    let file = config::load_config_or_default()?;
    let mut tools = file.tools.clone();
    if let Some(mode) = args.tools {
        tools.mode = mode;
    }
    if let Some(mode) = args.image_tool {
        tools.image_directives = mode;
    }
    let history: Vec<ChatTurn> = match &args.history {
        Some(path) => read_json(path, "history")?,
        None => Vec::new(),
    };

    let registry = build_registry(&file)?;
    let grounding = match &args.model {
        Some(name) => {
            if registry.get(name).is_none() {
                return Err(format!("Unsupported model: {name}"));
            }
            registry.supports_web_search(name)
        }
        None => true,
    };
    let connector: Arc<dyn ModelConnector> = Arc::new(HttpConnector::new(http_client()?));
    let classifier = build_classifier(&registry, connector, tools, None);

    let policy = if args.offline {
        classifier.classify_offline(&args.prompt, &history, grounding)
    } else {
        classifier.resolve(&args.prompt, &history, grounding).await
    };

    if args.json {
        let text = serde_json::to_string_pretty(&policy)
            .map_err(|err| format!("Failed to serialize policy: {err}"))?;
        println!("{text}");
    } else {
        print!("{}", render(&policy));
    }
    Ok(())
}

fn render(policy: &ToolPolicy) -> String {
    let intent = &policy.intent;
    let mut out = format!(
        "web_search: {}\nimage_directives: {}\nneeds_realtime: {}\ncategory: {}\nscore: {}\nsource: {}\n",
        policy.wants_web_search(),
        policy.image_directive_enabled,
        intent.needs_realtime,
        intent.category,
        intent.score,
        intent.source.as_str(),
    );
    if !intent.signals.is_empty() {
        out.push_str(&format!("signals: {}\n", intent.signals.join(", ")));
    }
    out
}
