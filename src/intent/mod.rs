//! Per-request tool policy: web-search grounding and image directives.
//!
//! The realtime verdict comes from an LLM judge when one is reachable and
//! from the weighted heuristic table otherwise. Explicit phrases, the
//! disable list and the global toggles are applied on top.

pub mod heuristic;
pub mod judge;
pub mod policy;

use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rchain::human::ChatTurn;
use crate::rchain::tools::ToolDescriptor;

pub use self::judge::Judge;

/// Number of trailing history turns the classifier looks at.
pub const HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ToggleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for ToggleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToggleMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" | "on" => Ok(Self::Always),
            "never" | "off" => Ok(Self::Never),
            other => Err(format!(
                "Unknown tool mode '{other}'. Supported values: auto, always, never."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Finance,
    Weather,
    Sports,
    Politics,
    Transport,
    MediaRelease,
    OutageStatus,
    General,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finance => "finance",
            Self::Weather => "weather",
            Self::Sports => "sports",
            Self::Politics => "politics",
            Self::Transport => "transport",
            Self::MediaRelease => "media_release",
            Self::OutageStatus => "outage_status",
            Self::General => "general",
        }
    }

    /// Lenient parse; anything unrecognized is `General`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "finance" => Self::Finance,
            "weather" => Self::Weather,
            "sports" => Self::Sports,
            "politics" => Self::Politics,
            "transport" => Self::Transport,
            "media_release" => Self::MediaRelease,
            "outage_status" => Self::OutageStatus,
            _ => Self::General,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Judge,
    Heuristic,
    Skipped,
}

impl VerdictSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Judge => "judge",
            Self::Heuristic => "heuristic",
            Self::Skipped => "skipped",
        }
    }
}

/// Whether answering needs up-to-date information, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealtimeVerdict {
    pub needs_realtime: bool,
    pub category: Category,
    /// Heuristic score, or the judge's confidence (0..=100).
    pub score: u32,
    pub source: VerdictSource,
    pub signals: Vec<&'static str>,
}

impl RealtimeVerdict {
    pub fn skipped() -> Self {
        Self {
            needs_realtime: false,
            category: Category::General,
            score: 0,
            source: VerdictSource::Skipped,
            signals: Vec::new(),
        }
    }
}

/// Outcome of classification for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolPolicy {
    pub tools: Vec<ToolDescriptor>,
    pub policy_text: Option<String>,
    pub image_directive_enabled: bool,
    pub intent: RealtimeVerdict,
}

impl ToolPolicy {
    pub fn wants_web_search(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// `[tools]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolSettings {
    pub mode: ToggleMode,
    pub image_directives: ToggleMode,
    pub max_queries: u32,
    pub judge: bool,
    pub disable: Vec<String>,
    pub force: Vec<String>,
    pub image_phrases: Vec<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            mode: ToggleMode::Auto,
            image_directives: ToggleMode::Auto,
            max_queries: 3,
            judge: true,
            disable: strings(&[
                "binary search",
                "graph search",
                "linear search",
                "depth-first search",
                "breadth-first search",
                "search tree",
                "search algorithm",
                "search space",
            ]),
            force: strings(&[
                "search",
                "search online",
                "google it",
                "google this",
                "lookup",
                "look up",
                "look it up",
                "browse",
                "check online",
                "check the web",
                "web search",
            ]),
            image_phrases: strings(&[
                "generate an image",
                "generate image",
                "create an image",
                "make an image",
                "make a picture",
                "picture of",
                "draw",
                "sketch",
                "illustration",
                "illustrate",
                "render an image",
            ]),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Case-insensitive phrase match that only counts whole words.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return false;
    }
    let text = text.to_lowercase();
    text.match_indices(&phrase).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn matches_any(text: &str, phrases: &[String]) -> Option<String> {
    phrases
        .iter()
        .find(|phrase| contains_phrase(text, phrase))
        .cloned()
}

pub struct IntentClassifier {
    settings: ToolSettings,
    judge: Option<Judge>,
    year: i32,
}

impl IntentClassifier {
    pub fn new(settings: ToolSettings, judge: Option<Judge>) -> Self {
        let judge = if settings.judge { judge } else { None };
        Self {
            settings,
            judge,
            year: chrono::Local::now().year(),
        }
    }

    /// Pins the year used by the `mentions_year` signal.
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    /// Full classification, assuming the target model can ground.
    pub async fn classify(&self, prompt: &str, history: &[ChatTurn]) -> ToolPolicy {
        self.resolve(prompt, history, true).await
    }

    /// Classification for a concrete model. Without grounding support the
    /// realtime verdict is skipped and only image eligibility is evaluated.
    pub async fn resolve(&self, prompt: &str, history: &[ChatTurn], grounding_available: bool) -> ToolPolicy {
        let (search, intent) = match self.search_override(prompt, grounding_available) {
            Some(search) => (search, RealtimeVerdict::skipped()),
            None => {
                let verdict = self.realtime_verdict(prompt, history).await;
                (verdict.needs_realtime, verdict)
            }
        };
        self.finish(prompt, search, intent)
    }

    /// Heuristics only; never calls a model.
    pub fn classify_offline(&self, prompt: &str, history: &[ChatTurn], grounding_available: bool) -> ToolPolicy {
        let (search, intent) = match self.search_override(prompt, grounding_available) {
            Some(search) => (search, RealtimeVerdict::skipped()),
            None => {
                let verdict = heuristic::analyze(prompt, history, self.year);
                (verdict.needs_realtime, verdict)
            }
        };
        self.finish(prompt, search, intent)
    }

    /// Judge first, heuristic table on any judge failure.
    pub async fn realtime_verdict(&self, prompt: &str, history: &[ChatTurn]) -> RealtimeVerdict {
        if let Some(judge) = &self.judge {
            if let Some(verdict) = judge.decide(prompt, history).await {
                return verdict;
            }
        }
        heuristic::analyze(prompt, history, self.year)
    }

    /// Decides search without a verdict where toggles or phrases settle it.
    fn search_override(&self, prompt: &str, grounding_available: bool) -> Option<bool> {
        if !grounding_available {
            return Some(false);
        }
        match self.settings.mode {
            ToggleMode::Never => Some(false),
            ToggleMode::Always => Some(true),
            ToggleMode::Auto => {
                if let Some(term) = matches_any(prompt, &self.settings.disable) {
                    debug!(term = %term, "web search suppressed by disable list");
                    return Some(false);
                }
                if let Some(term) = matches_any(prompt, &self.settings.force) {
                    debug!(term = %term, "web search forced by prompt");
                    return Some(true);
                }
                None
            }
        }
    }

    fn image_enabled(&self, prompt: &str) -> bool {
        match self.settings.image_directives {
            ToggleMode::Never => false,
            ToggleMode::Always => true,
            ToggleMode::Auto => matches_any(prompt, &self.settings.image_phrases).is_some(),
        }
    }

    fn finish(&self, prompt: &str, search: bool, intent: RealtimeVerdict) -> ToolPolicy {
        let image_directive_enabled = self.image_enabled(prompt);
        let max_queries = self.settings.max_queries;
        let policy = ToolPolicy {
            tools: if search {
                vec![ToolDescriptor::web_search(max_queries)]
            } else {
                Vec::new()
            },
            policy_text: policy::policy_text(search, image_directive_enabled, max_queries),
            image_directive_enabled,
            intent,
        };
        debug!(
            web_search = search,
            image_directives = image_directive_enabled,
            source = ?policy.intent.source,
            category = policy.intent.category.as_str(),
            "resolved tool policy"
        );
        policy
    }
}
