use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::images::ImageSettings;
use crate::intent::{ToggleMode, ToolSettings};
use crate::registry::{Credentials, ModelOverride, ModelRegistry};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProfileConfig {
    pub model: Option<String>,
    pub system: Option<String>,
    pub output: Option<String>,
    pub stream: Option<bool>,
    pub timeout: Option<u64>,
    pub tools: Option<String>,
    pub image_tool: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    pub profiles: Option<HashMap<String, ProfileConfig>>,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub images: ImageSettings,
    #[serde(default)]
    pub models: BTreeMap<String, ModelOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Text,
    Json,
    Events,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "events" => Ok(Self::Events),
            _ => Err(()),
        }
    }
}

pub const OUTPUT_VALUES: &str = "text, json, events";
pub const TOGGLE_VALUES: &str = "auto, always, never";

/// Reads and parses the config file. A missing file is an error.
pub fn load_config() -> Result<(PathBuf, ConfigFile), String> {
    let path = config_path()?;
    let raw = fs::read_to_string(&path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;

    let config: ConfigFile = toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))?;
    Ok((path, config))
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default() -> Result<ConfigFile, String> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    load_config().map(|(_, config)| config)
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, String> {
    let (path, config) = load_config()?;
    find_profile(&config, name, &path)
}

fn find_profile(config: &ConfigFile, name: &str, path: &std::path::Path) -> Result<ProfileConfig, String> {
    let profiles = config.profiles.as_ref().ok_or_else(|| {
        format!(
            "Config file '{}' does not contain a [profiles] section.",
            path.display()
        )
    })?;

    profiles.get(name).cloned().ok_or_else(|| {
        format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        )
    })
}

impl ProfileConfig {
    pub fn output_mode(&self) -> Result<Option<OutputMode>, String> {
        self.output
            .as_deref()
            .map(|value| {
                value.parse().map_err(|_| {
                    format!("Invalid profile output '{value}'. Supported values: {OUTPUT_VALUES}.")
                })
            })
            .transpose()
    }

    pub fn tools_mode(&self) -> Result<Option<ToggleMode>, String> {
        parse_profile_toggle("tools", self.tools.as_deref())
    }

    pub fn image_tool_mode(&self) -> Result<Option<ToggleMode>, String> {
        parse_profile_toggle("image_tool", self.image_tool.as_deref())
    }

    fn validate(&self) -> Result<(), String> {
        self.output_mode()?;
        self.tools_mode()?;
        self.image_tool_mode()?;
        if self.timeout == Some(0) {
            return Err("Invalid profile timeout '0'. Expected a positive integer.".to_string());
        }
        Ok(())
    }
}

fn parse_profile_toggle(field: &str, value: Option<&str>) -> Result<Option<ToggleMode>, String> {
    value
        .map(|value| {
            value.parse::<ToggleMode>().map_err(|_| {
                format!("Invalid profile {field} '{value}'. Supported values: {TOGGLE_VALUES}.")
            })
        })
        .transpose()
}

/// Checks the whole file, or one profile plus the shared sections.
pub fn validate_config(profile: Option<&str>) -> Result<PathBuf, String> {
    let (path, config) = load_config()?;

    match profile {
        Some(name) => find_profile(&config, name, &path)?
            .validate()
            .map_err(|err| format!("Profile '{name}': {err}"))?,
        None => {
            if let Some(profiles) = &config.profiles {
                let mut names = profiles.keys().collect::<Vec<_>>();
                names.sort();
                for name in names {
                    profiles[name]
                        .validate()
                        .map_err(|err| format!("Profile '{name}': {err}"))?;
                }
            }
        }
    }

    if config.tools.max_queries == 0 {
        return Err("Invalid [tools] max_queries '0'. Expected a positive integer.".to_string());
    }
    ModelRegistry::builtin(Credentials::default()).with_overrides(&config.models)?;
    Ok(path)
}

pub fn config_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var("CM_CONFIG") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed).join("chatmux").join("config.toml"));
        }
    }

    let home = env::var("HOME").map_err(|_| {
        "Cannot resolve config path: set CM_CONFIG or HOME/XDG_CONFIG_HOME.".to_string()
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("chatmux")
        .join("config.toml"))
}
