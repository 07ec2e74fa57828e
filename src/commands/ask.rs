use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::Args;
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

use super::{DEFAULT_TIMEOUT_SECS, env_value, read_json, save_output};
use crate::config::{self, OUTPUT_VALUES, OutputMode, ProfileConfig, TOGGLE_VALUES};
use crate::intent::{ToggleMode, ToolSettings};
use crate::logging::{self, Verbosity};
use crate::orchestrator::{Orchestrator, ReplyEvent};
use crate::rchain::human::{Attachment, ChatRequest, ChatTurn, DEFAULT_SYSTEM_PROMPT};

#[derive(Debug, Args, Clone)]
pub struct AskArgs {
    /// Prompt text. Read from stdin when omitted.
    pub prompt: Option<String>,
    /// Logical model name (see `chatmux models`).
    #[arg(long, short = 'm')]
    pub model: Option<String>,
    #[arg(long)]
    pub profile: Option<String>,
    #[arg(long)]
    pub system: Option<String>,
    /// Attach a file; repeatable. The media type comes from the extension.
    #[arg(long = "attach", value_name = "PATH")]
    pub attachments: Vec<PathBuf>,
    /// JSON array of previous turns.
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,
    /// Full request body in the HTTP JSON shape.
    #[arg(long, value_name = "FILE")]
    pub request: Option<PathBuf>,
    #[arg(long)]
    pub no_stream: bool,
    /// text, json or events.
    #[arg(long)]
    pub output: Option<String>,
    /// Shorthand for `--output json`.
    #[arg(long)]
    pub json: bool,
    /// Print the prepared request instead of calling the model.
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,
    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Web search: auto, always or never.
    #[arg(long)]
    pub tools: Option<String>,
    /// Image directives: auto, always or never.
    #[arg(long = "image-tool")]
    pub image_tool: Option<String>,
    #[arg(long, short = 'v')]
    pub verbose: bool,
    #[arg(long, short = 'q')]
    pub quiet: bool,
    /// Print version and build metadata.
    #[arg(long)]
    pub version: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AskSettings {
    model: Option<String>,
    system: Option<String>,
    output: OutputMode,
    stream: bool,
    timeout_secs: u64,
    tools: ToolSettings,
}

pub async fn run(args: AskArgs) -> Result<(), String> {
    if args.version {
        println!("{}", super::version_text("chatmux"));
        return Ok(());
    }
    logging::init(Verbosity::from_flags(args.verbose, args.quiet));

    let profile = match args.profile.as_deref() {
        Some(name) => config::load_profile(name)?,
        None => ProfileConfig::default(),
    };
    let file = config::load_config_or_default()?;
    let settings = resolve_settings(&args, &profile, file.tools.clone())?;
    let request = build_request(&args, &settings)?;

    let orchestrator =
        super::build_orchestrator(&file, settings.tools.clone(), Some(settings.timeout_secs))?;

    if args.dry_run {
        return dry_run(&orchestrator, &request, &settings, args.save.as_ref());
    }

    match settings.output {
        OutputMode::Json => ask_json(&orchestrator, &request, args.save.as_ref()).await,
        OutputMode::Events => ask_events(&orchestrator, &request, args.save.as_ref()).await,
        OutputMode::Text if settings.stream => {
            ask_streaming_text(&orchestrator, &request, args.save.as_ref()).await
        }
        OutputMode::Text => ask_text(&orchestrator, &request, args.save.as_ref()).await,
    }
}

fn resolve_settings(
    args: &AskArgs,
    profile: &ProfileConfig,
    tools: ToolSettings,
) -> Result<AskSettings, String> {
    resolve_settings_with(args, profile, tools, &env_value)
}

/// CLI, then `env`, then profile, then defaults.
fn resolve_settings_with(
    args: &AskArgs,
    profile: &ProfileConfig,
    mut tools: ToolSettings,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<AskSettings, String> {
    let profile_output = profile.output_mode()?;
    let profile_tools = profile.tools_mode()?;
    let profile_image_tool = profile.image_tool_mode()?;

    let output = if args.json {
        OutputMode::Json
    } else if let Some(value) = &args.output {
        value.parse().map_err(|_| {
            format!("Invalid --output '{value}'. Supported values: {OUTPUT_VALUES}.")
        })?
    } else if let Some(value) = env("CM_OUTPUT") {
        value.parse().map_err(|_| {
            format!("Invalid CM_OUTPUT '{value}'. Supported values: {OUTPUT_VALUES}.")
        })?
    } else {
        profile_output.unwrap_or_default()
    };

    let timeout_secs = match args.timeout {
        Some(value) => Some(value),
        None => env("CM_TIMEOUT")
            .map(|value| {
                value.parse::<u64>().map_err(|_| {
                    format!("Invalid CM_TIMEOUT '{value}'. Expected a positive integer.")
                })
            })
            .transpose()?,
    }
    .or(profile.timeout)
    .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err("Timeout must be a positive number of seconds.".to_string());
    }

    if let Some(mode) = toggle("--tools", "CM_TOOLS", args.tools.as_deref(), env)?.or(profile_tools) {
        tools.mode = mode;
    }
    if let Some(mode) =
        toggle("--image-tool", "CM_IMAGE_TOOL", args.image_tool.as_deref(), env)?.or(profile_image_tool)
    {
        tools.image_directives = mode;
    }

    let stream = match output {
        OutputMode::Json => false,
        OutputMode::Events => true,
        OutputMode::Text => !args.no_stream && profile.stream.unwrap_or(true),
    };

    Ok(AskSettings {
        model: args
            .model
            .clone()
            .or_else(|| env("CM_MODEL"))
            .or_else(|| profile.model.clone()),
        system: args
            .system
            .clone()
            .or_else(|| env("CM_SYSTEM"))
            .or_else(|| profile.system.clone()),
        output,
        stream,
        timeout_secs,
        tools,
    })
}

fn toggle(
    flag: &str,
    env_name: &str,
    cli: Option<&str>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<ToggleMode>, String> {
    if let Some(value) = cli {
        return value
            .parse()
            .map(Some)
            .map_err(|_| format!("Invalid {flag} '{value}'. Supported values: {TOGGLE_VALUES}."));
    }
    env(env_name)
        .map(|value| {
            value.parse().map_err(|_| {
                format!("Invalid {env_name} '{value}'. Supported values: {TOGGLE_VALUES}.")
            })
        })
        .transpose()
}

fn build_request(args: &AskArgs, settings: &AskSettings) -> Result<ChatRequest, String> {
    let mut request = match &args.request {
        Some(path) => {
            let mut request: ChatRequest = read_json(path, "request")?;
            if let Some(model) = &settings.model {
                request.model_name = model.clone();
            }
            if let Some(prompt) = &args.prompt {
                request.text = prompt.clone();
            }
            request
        }
        None => {
            let model = settings
                .model
                .clone()
                .ok_or_else(|| "No model provided. Use --model or set CM_MODEL.".to_string())?;
            let prompt = match &args.prompt {
                Some(prompt) => prompt.clone(),
                None => read_stdin_prompt()?,
            };
            ChatRequest::new(model, prompt).with_system_prompt(DEFAULT_SYSTEM_PROMPT)
        }
    };

    if let Some(system) = &settings.system {
        request.system_prompt = Some(system.clone());
    }
    if let Some(path) = &args.history {
        let history: Vec<ChatTurn> = read_json(path, "history")?;
        request.history = history;
    }
    for path in &args.attachments {
        request.attachments.push(Attachment::from_path(path)?);
    }
    Ok(request)
}

fn read_stdin_prompt() -> Result<String, String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }
    let mut prompt = String::new();
    stdin
        .read_to_string(&mut prompt)
        .map_err(|err| format!("Failed to read prompt from stdin: {err}"))?;
    Ok(prompt.trim_end_matches(['\n', '\r']).to_string())
}

fn dry_run(
    orchestrator: &Orchestrator,
    request: &ChatRequest,
    settings: &AskSettings,
    save: Option<&PathBuf>,
) -> Result<(), String> {
    let preview = orchestrator.preview(request).map_err(|err| err.to_string())?;
    debug!(
        model = %preview.model.name,
        provider = preview.model.provider.as_str(),
        model_id = %preview.model.model_id,
        api_key_present = preview.api_key_present,
        web_search = preview.policy.wants_web_search(),
        "dry run prepared"
    );
    let body = json!({
        "dry_run": true,
        "model": preview.model.name,
        "provider": preview.model.provider,
        "model_id": preview.model.model_id,
        "api_key_present": preview.api_key_present,
        "output": settings.output.as_str(),
        "stream": settings.stream,
        "messages": preview.messages,
        "tools": preview.policy.tools,
        "image_directives": preview.policy.image_directive_enabled,
        "intent": preview.policy.intent,
        "request": {
            "temperature": preview.params.temperature,
            "max_tokens": preview.params.max_tokens,
            "timeout_secs": preview.params.timeout_secs,
        },
    });
    let text = serde_json::to_string(&body)
        .map_err(|err| format!("Failed to serialize dry run: {err}"))?;
    println!("{text}");
    if let Some(path) = save {
        save_output(path, text.as_bytes())?;
    }
    Ok(())
}

async fn ask_json(
    orchestrator: &Orchestrator,
    request: &ChatRequest,
    save: Option<&PathBuf>,
) -> Result<(), String> {
    let reply = orchestrator.invoke(request).await.map_err(|err| err.to_string())?;
    let text =
        serde_json::to_string(&reply).map_err(|err| format!("Failed to serialize reply: {err}"))?;
    println!("{text}");
    if let Some(path) = save {
        save_output(path, text.as_bytes())?;
    }
    match reply.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn ask_text(
    orchestrator: &Orchestrator,
    request: &ChatRequest,
    save: Option<&PathBuf>,
) -> Result<(), String> {
    let reply = orchestrator.invoke(request).await.map_err(|err| err.to_string())?;
    if let Some(err) = reply.error {
        return Err(err);
    }
    println!("{}", reply.response);
    if let Some(path) = save {
        save_output(path, reply.response.as_bytes())?;
    }
    Ok(())
}

async fn ask_streaming_text(
    orchestrator: &Orchestrator,
    request: &ChatRequest,
    save: Option<&PathBuf>,
) -> Result<(), String> {
    let mut events = orchestrator.stream(request).await.map_err(|err| err.to_string())?;
    let mut stdout = io::stdout();
    let mut full = String::new();
    while let Some(event) = events.next().await {
        match event {
            ReplyEvent::Chunk(chunk) => {
                write!(stdout, "{chunk}")
                    .and_then(|_| stdout.flush())
                    .map_err(|err| format!("Failed to write output: {err}"))?;
                full.push_str(&chunk);
            }
            ReplyEvent::Error(err) => {
                if !full.is_empty() {
                    println!();
                }
                return Err(err);
            }
        }
    }
    println!();
    if let Some(path) = save {
        save_output(path, full.as_bytes())?;
    }
    Ok(())
}

async fn ask_events(
    orchestrator: &Orchestrator,
    request: &ChatRequest,
    save: Option<&PathBuf>,
) -> Result<(), String> {
    let mut events = orchestrator.stream(request).await.map_err(|err| err.to_string())?;
    let mut lines = Vec::new();
    let mut failure = None;
    while let Some(event) = events.next().await {
        let line = serde_json::to_string(&event)
            .map_err(|err| format!("Failed to serialize event: {err}"))?;
        println!("{line}");
        lines.push(line);
        if let ReplyEvent::Error(err) = event {
            failure = Some(err);
            break;
        }
    }
    if failure.is_none() {
        let done = json!({"done": true}).to_string();
        println!("{done}");
        lines.push(done);
    }
    if let Some(path) = save {
        save_output(path, lines.join("\n").as_bytes())?;
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
