use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Category, HISTORY_WINDOW, RealtimeVerdict, VerdictSource};
use crate::rchain::chat_models::{ModelConnector, ModelTarget};
use crate::rchain::human::ChatTurn;
use crate::rchain::message::NormalizedMessage;
use crate::rchain::provider::{GenerationParams, Provider};
use crate::registry::Credentials;

const INTENT_SYSTEM: &str = r#"You are an Intent Decider.
Decide if answering the user's request correctly requires up-to-date information from the public web.
Be conservative with false negatives: if it is plausible the correct answer depends on recent events, releases, prices, schedules, or status, return true.
Output STRICT JSON:
{"needs_realtime": true|false, "category": "<one of: finance, weather, sports, politics, transport, media_release, outage_status, general>", "confidence": 0..100}
No extra text.
"#;

const HISTORY_LINE_LIMIT: usize = 200;

/// A lightweight model the judge may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgeCandidate {
    pub provider: Provider,
    pub model_id: &'static str,
}

/// Preference order: the first candidate with a credential is used.
pub const JUDGE_CANDIDATES: [JudgeCandidate; 4] = [
    JudgeCandidate {
        provider: Provider::Google,
        model_id: "gemini-1.5-flash",
    },
    JudgeCandidate {
        provider: Provider::Openai,
        model_id: "gpt-4o-mini",
    },
    JudgeCandidate {
        provider: Provider::Mistral,
        model_id: "mistral-small-latest",
    },
    JudgeCandidate {
        provider: Provider::Anthropic,
        model_id: "claude-3-5-sonnet-20241022",
    },
];

pub fn select_candidate(credentials: &Credentials) -> Option<(JudgeCandidate, &str)> {
    JUDGE_CANDIDATES.iter().find_map(|candidate| {
        credentials
            .for_provider(candidate.provider)
            .map(|key| (*candidate, key))
    })
}

/// Secondary-model classifier for the realtime verdict.
pub struct Judge {
    connector: Arc<dyn ModelConnector>,
    credentials: Credentials,
    timeout_secs: Option<u64>,
}

impl Judge {
    pub fn new(connector: Arc<dyn ModelConnector>, credentials: Credentials, timeout_secs: Option<u64>) -> Self {
        Self {
            connector,
            credentials,
            timeout_secs,
        }
    }

    /// One attempt, no retry. `None` on any failure.
    pub async fn decide(&self, prompt: &str, history: &[ChatTurn]) -> Option<RealtimeVerdict> {
        let Some((candidate, api_key)) = select_candidate(&self.credentials) else {
            debug!("no judge model has a credential; using heuristics");
            return None;
        };
        let model = self.connector.connect(
            ModelTarget {
                provider: candidate.provider,
                model_id: candidate.model_id.to_string(),
                api_key: api_key.to_string(),
            },
            GenerationParams::judge(self.timeout_secs),
        );
        let messages = [
            NormalizedMessage::system(INTENT_SYSTEM),
            NormalizedMessage::user(user_prompt(prompt, history)),
        ];
        let reply = match model.invoke(&messages, &[]).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    provider = candidate.provider.as_str(),
                    model = candidate.model_id,
                    error = %err,
                    "intent judge call failed; using heuristics"
                );
                return None;
            }
        };
        let verdict = parse_verdict(&reply.content);
        if verdict.is_none() {
            warn!(model = candidate.model_id, "intent judge returned unusable output");
        }
        verdict
    }
}

fn user_prompt(prompt: &str, history: &[ChatTurn]) -> String {
    format!(
        r#"User request:
{prompt}

Short conversation context (optional, may be empty):
{history}

Decide whether web/real-time info is needed. Examples:
- "price for astral" => needs_realtime true, category "finance"
- "when is Avengers Doomsday expected to release?" => true, "media_release"
- "weather in Delhi tomorrow" => true, "weather"
- "what is photosynthesis?" => false, "general"
Return JSON only."#,
        history = history_compact(history)
    )
}

/// Trailing turns as `role: text` lines, each flattened and truncated.
pub fn history_compact(history: &[ChatTurn]) -> String {
    history[history.len().saturating_sub(HISTORY_WINDOW)..]
        .iter()
        .map(|turn| {
            let text = turn.text.trim().replace('\n', " ");
            let text = if text.chars().count() > HISTORY_LINE_LIMIT {
                let cut = text.chars().take(HISTORY_LINE_LIMIT).collect::<String>();
                format!("{cut}...")
            } else {
                text
            };
            format!("{}: {text}", turn.role)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses the judge's JSON reply, tolerating a Markdown code fence.
pub fn parse_verdict(raw: &str) -> Option<RealtimeVerdict> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let object = value.as_object()?;
    let needs_realtime = object
        .get("needs_realtime")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let category = object
        .get("category")
        .and_then(Value::as_str)
        .map(Category::parse_lenient)
        .unwrap_or(Category::General);
    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|value| value.clamp(0.0, 100.0).round() as u32)
        .unwrap_or(0);
    Some(RealtimeVerdict {
        needs_realtime,
        category,
        score: confidence,
        source: VerdictSource::Judge,
        signals: Vec::new(),
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.split_once('\n').map_or("", |(_, body)| body);
    inner.trim_end().strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_order_prefers_gemini_then_openai() {
        let all = Credentials::from_pairs([
            ("ANTHROPIC_API_KEY", "a"),
            ("OPENAI_API_KEY", "o"),
            ("GOOGLE_API_KEY", "g"),
        ]);
        let (candidate, key) = select_candidate(&all).unwrap();
        assert_eq!(candidate.model_id, "gemini-1.5-flash");
        assert_eq!(key, "g");

        let partial = Credentials::from_pairs([("ANTHROPIC_API_KEY", "a"), ("MISTRAL_API_KEY", "m")]);
        assert_eq!(
            select_candidate(&partial).unwrap().0.model_id,
            "mistral-small-latest"
        );
        assert!(select_candidate(&Credentials::default()).is_none());
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        let verdict =
            parse_verdict(r#"{"needs_realtime": true, "category": "weather", "confidence": 87}"#).unwrap();
        assert!(verdict.needs_realtime);
        assert_eq!(verdict.category, Category::Weather);
        assert_eq!(verdict.score, 87);
        assert_eq!(verdict.source, VerdictSource::Judge);

        let fenced = "```json\n{\"needs_realtime\": false, \"category\": \"general\", \"confidence\": 12}\n```";
        assert_eq!(parse_verdict(fenced).unwrap().score, 12);
    }

    #[test]
    fn odd_fields_are_normalized() {
        let verdict =
            parse_verdict(r#"{"needs_realtime": true, "category": "astrology", "confidence": 250}"#).unwrap();
        assert_eq!(verdict.category, Category::General);
        assert_eq!(verdict.score, 100);
        assert_eq!(parse_verdict(r#"{"confidence": "high"}"#).unwrap().score, 0);
    }

    #[test]
    fn non_object_output_is_rejected() {
        assert!(parse_verdict("Yes, it needs the web.").is_none());
        assert!(parse_verdict("[true]").is_none());
    }

    #[test]
    fn history_is_windowed_flattened_and_truncated() {
        let mut history = (0..8).map(|i| ChatTurn::user(format!("turn {i}"))).collect::<Vec<_>>();
        history.push(ChatTurn::assistant(format!("line one\nline two {}", "x".repeat(300))));
        let compact = history_compact(&history);
        let lines = compact.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "user: turn 3");
        assert!(lines[5].starts_with("assistant: line one line two x"));
        assert!(lines[5].ends_with("..."));
        assert_eq!(lines[5].chars().count(), "assistant: ".len() + 200 + 3);
    }
}
