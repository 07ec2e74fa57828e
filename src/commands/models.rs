use std::io::{self, IsTerminal};

use clap::Args;
use owo_colors::OwoColorize;
use serde_json::json;

use super::build_registry;
use crate::config;
use crate::registry::{ModelRegistry, provider_supports_web_search};

#[derive(Debug, Args, Clone)]
pub struct ModelsArgs {
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ModelsArgs) -> Result<(), String> {
    let file = config::load_config_or_default()?;
    let registry = build_registry(&file)?;
    if args.json {
        let text = serde_json::to_string_pretty(&to_json(&registry))
            .map_err(|err| format!("Failed to serialize models: {err}"))?;
        println!("{text}");
    } else {
        print!("{}", render_table(&registry, io::stdout().is_terminal()));
    }
    Ok(())
}

fn to_json(registry: &ModelRegistry) -> serde_json::Value {
    registry
        .models()
        .map(|model| {
            json!({
                "name": model.name,
                "provider": model.provider,
                "model_id": model.model_id,
                "supports_vision": model.supports_vision,
                "supports_files": model.supports_files,
                "web_search": provider_supports_web_search(model.provider),
                "api_key_env": model.api_key_env,
                "api_key_present": registry.credential_for(model).is_some(),
            })
        })
        .collect()
}

fn render_table(registry: &ModelRegistry, color: bool) -> String {
    let mut out = format!(
        "{:<20} {:<10} {:<28} {:<7} {:<7} {}\n",
        "NAME", "PROVIDER", "MODEL", "VISION", "SEARCH", "KEY"
    );
    for model in registry.models() {
        let key = if registry.credential_for(model).is_some() {
            "set"
        } else {
            "missing"
        };
        let key = match (color, key) {
            (false, key) => key.to_string(),
            (true, "set") => key.green().to_string(),
            (true, key) => key.red().to_string(),
        };
        out.push_str(&format!(
            "{:<20} {:<10} {:<28} {:<7} {:<7} {} ({})\n",
            model.name,
            model.provider.as_str(),
            model.model_id,
            yes_no(model.supports_vision),
            yes_no(provider_supports_web_search(model.provider)),
            key,
            model.api_key_env
        ));
    }
    out
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Credentials;

    #[test]
    fn table_marks_vision_search_and_keys() {
        let registry =
            ModelRegistry::builtin(Credentials::from_pairs([("ANTHROPIC_API_KEY", "k")]));
        let table = render_table(&registry, false);
        let claude = table
            .lines()
            .find(|line| line.starts_with("claude-3-5-sonnet"))
            .unwrap();
        assert!(claude.contains("yes     yes     set (ANTHROPIC_API_KEY)"), "{claude}");
        let mistral = table
            .lines()
            .find(|line| line.starts_with("mistral-large"))
            .unwrap();
        assert!(mistral.contains("no      no      missing (MISTRAL_API_KEY)"), "{mistral}");
    }

    #[test]
    fn json_never_contains_key_values() {
        let registry = ModelRegistry::builtin(Credentials::from_pairs([("OPENAI_API_KEY", "sk-secret")]));
        let text = to_json(&registry).to_string();
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("\"api_key_present\":true"));
    }
}
