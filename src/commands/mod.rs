pub mod ask;
pub mod classify;
pub mod config;
pub mod extract;
pub mod image;
pub mod models;
pub mod search;

use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::ConfigFile;
use crate::images::HuggingFaceImages;
use crate::intent::{IntentClassifier, Judge, ToolSettings};
use crate::orchestrator::Orchestrator;
use crate::rchain::chat_models::{HttpConnector, ModelConnector};
use crate::registry::{Credentials, ModelRegistry};

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("CM_GIT_SHA"),
    "\nbuilt: ",
    env!("CM_BUILD_TS")
);

pub fn version_text(bin: &str) -> String {
    format!("{bin} {LONG_VERSION}")
}

/// Trimmed, non-empty value of an environment variable.
pub(crate) fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read {what} file '{}': {err}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("Failed to parse {what} file '{}': {err}", path.display()))
}

/// Writes (or overwrites) `path`, creating missing parent directories.
pub(crate) fn save_output(path: &Path, content: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            format!(
                "Failed to create output directory '{}': {err}",
                parent.display()
            )
        })?;
    }
    fs::write(path, content)
        .map_err(|err| format!("Failed to write output file '{}': {err}", path.display()))
}

pub(crate) fn http_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .user_agent(concat!("chatmux/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| format!("Failed to build HTTP client: {err}"))
}

pub(crate) fn build_registry(file: &ConfigFile) -> Result<ModelRegistry, String> {
    ModelRegistry::builtin(Credentials::from_env()).with_overrides(&file.models)
}

pub(crate) fn build_classifier(
    registry: &ModelRegistry,
    connector: Arc<dyn ModelConnector>,
    tools: ToolSettings,
    timeout_secs: Option<u64>,
) -> IntentClassifier {
    let judge = Judge::new(connector, registry.credentials().clone(), timeout_secs);
    IntentClassifier::new(tools, Some(judge))
}

/// Wires the HTTP adapters, judge and image backend around one client.
pub(crate) fn build_orchestrator(
    file: &ConfigFile,
    tools: ToolSettings,
    timeout_secs: Option<u64>,
) -> Result<Orchestrator, String> {
    let client = http_client()?;
    let registry = build_registry(file)?;
    let connector: Arc<dyn ModelConnector> = Arc::new(HttpConnector::new(client.clone()));
    let classifier = build_classifier(&registry, Arc::clone(&connector), tools, timeout_secs);
    let images = HuggingFaceImages::from_env(client, file.images.clone()).with_timeout(timeout_secs);
    Ok(Orchestrator::new(
        Arc::new(registry),
        connector,
        Arc::new(classifier),
        Arc::new(images),
    )
    .with_timeout(timeout_secs))
}
