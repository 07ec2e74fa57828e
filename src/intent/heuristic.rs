//! Lexical fallback for the realtime verdict.
//!
//! Each rule in [`RULES`] contributes its weight when it fires. The domain
//! and history bonuses are applied after the table.

use std::sync::LazyLock;

use regex::Regex;

use super::{Category, HISTORY_WINDOW, RealtimeVerdict, VerdictSource};
use crate::rchain::human::ChatTurn;

pub const REALTIME_THRESHOLD: u32 = 3;

const CURRENCY_SYMBOLS: &[&str] = &["$", "£", "€", "¥", "₹"];
const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CNY", "INR", "AUD", "CAD", "CHF", "SEK", "NZD", "SGD", "HKD",
    "ZAR", "AED", "SAR",
];
const CRYPTO_CODES: &[&str] = &["BTC", "ETH", "SOL", "DOGE", "ADA", "XRP", "BNB", "USDT", "USDC"];
const COMPANY_SUFFIXES: &[&str] = &[
    "ltd", "limited", "inc", "corp", "co", "plc", "llc", "ag", "oy", "sa", "nv", "ab",
];
const STOPWORDS: &[&str] = &[
    "what", "is", "the", "a", "an", "to", "for", "of", "in", "and", "or", "on", "me", "give",
    "get", "show", "tell", "please", "pls", "now", "today", "how", "much", "latest", "current",
    "quote", "price", "rate", "when", "release", "date", "expected",
];
/// Uppercase words that are never tickers.
const NOT_TICKERS: &[&str] = &["I", "A"];

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| regex(r"[A-Za-z][A-Za-z0-9.'-]*|[$£€¥₹]"));
static REL_TIME: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(live|breaking|real[-\s]?time|updat(e|es|ed)|current|now|today|tonight|yesterday|tomorrow|this\s+(week|month|year|quarter)|(last|past)\s+\d+\s+(min|mins|minutes|hours|days|weeks|months|years)|recent|latest|trend(s|ing)?|status)\b",
    )
});
static DATE_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b\d{1,2}[/.-]\d{1,2}([/.-]\d{2,4})?\b|\b\d{4}-\d{1,2}-\d{1,2}\b|\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)(uary|ruary|ch|il|e|y|ust|t|tember|ober|ember)?\s+\d{1,2}(,\s*\d{2,4})?\b",
    )
});
static DOMAIN_HINT: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(price|prices|quote|quotes|stock|stocks|share|shares|ticker|market|index|exchange\s+rate|forex|currency|crypto|bitcoin|btc|eth|weather|forecast|temperature|score|scores|match|matches|fixture|fixtures|result|results|poll|polls|election|flight\s+status|train\s+status|air|rail|release\s+date|expected\s+to\s+release)\b",
    )
});
static MONTH: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(january|february|march|april|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)\b",
    )
});
// Lowercase "may" is the modal verb far more often than the month.
static MONTH_MAY: LazyLock<Regex> = LazyLock::new(|| regex(r"\bMay\b"));
static CURRENCY_PAIR: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\b([A-Z]{3})/([A-Z]{3})\b"));

static FINANCE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(stock|ticker|market|share|price|quote|nse|bse|nasdaq|nyse|forex|currency|crypto)\b")
});
static WEATHER: LazyLock<Regex> = LazyLock::new(|| regex(r"\b(weather|forecast|temperature)\b"));
static SPORTS: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(score|scores|match|fixture|fixtures|result|results|odds|spread)\b")
});
static POLITICS: LazyLock<Regex> = LazyLock::new(|| regex(r"\b(election|poll|votes?)\b"));
static MEDIA_RELEASE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(release\s+date|expected\s+to\s+release|premiere|film|movie|season|episode)\b")
});
static TRANSPORT: LazyLock<Regex> = LazyLock::new(|| regex(r"\b(flight|train)\s+status\b"));

static HISTORY_TOPICS: LazyLock<Vec<(Category, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Category::Finance,
            regex(r"\b(stock|ticker|market|share|price|quote|nse|bse|nasdaq|nyse|forex|currency|crypto)\b"),
        ),
        (Category::Weather, regex(r"\b(weather|forecast|temperature)\b")),
        (Category::Sports, regex(r"\b(score|scores|match|fixture|result|team|league)\b")),
        (Category::Politics, regex(r"\b(election|poll|votes?)\b")),
        (
            Category::MediaRelease,
            regex(r"\b(release|premiere|box\s*office|film|movie|episode|season)\b"),
        ),
    ]
});

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

/// Everything the rules look at, computed once per prompt.
struct Features<'a> {
    text: &'a str,
    entities: Vec<&'a str>,
    domain: Option<Category>,
    has_currency: bool,
    has_ticker: bool,
    word_count: usize,
    year: i32,
}

struct SignalRule {
    name: &'static str,
    weight: u32,
    fires: fn(&Features<'_>) -> bool,
}

static RULES: &[SignalRule] = &[
    SignalRule {
        name: "domain",
        weight: 2,
        fires: |f| f.domain.is_some(),
    },
    SignalRule {
        name: "currency",
        weight: 2,
        fires: |f| f.has_currency,
    },
    SignalRule {
        name: "ticker_like",
        weight: 2,
        fires: |f| f.has_ticker,
    },
    SignalRule {
        name: "entities",
        weight: 1,
        fires: |f| !f.entities.is_empty(),
    },
    SignalRule {
        name: "short_query_bias",
        weight: 1,
        fires: |f| {
            f.word_count <= 3
                && (f.has_ticker
                    || matches!(f.domain, Some(Category::Finance | Category::MediaRelease))
                    || !f.entities.is_empty())
        },
    },
    SignalRule {
        name: "rel_time",
        weight: 1,
        fires: |f| REL_TIME.is_match(f.text),
    },
    SignalRule {
        name: "date_like",
        weight: 1,
        fires: |f| DATE_LIKE.is_match(f.text),
    },
    SignalRule {
        name: "domain_hint_words",
        weight: 1,
        fires: |f| DOMAIN_HINT.is_match(f.text),
    },
    SignalRule {
        name: "mentions_year",
        weight: 1,
        fires: |f| f.text.contains(&f.year.to_string()),
    },
    SignalRule {
        name: "mentions_month",
        weight: 1,
        fires: |f| MONTH.is_match(f.text) || MONTH_MAY.is_match(f.text),
    },
];

/// Scores a prompt against the rule table and the trailing history.
pub fn analyze(prompt: &str, history: &[ChatTurn], year: i32) -> RealtimeVerdict {
    let text = prompt.trim();
    let tokens = TOKEN.find_iter(text).map(|m| m.as_str()).collect::<Vec<_>>();
    let has_ticker = tokens.iter().any(|token| is_ticker_like(token));
    let has_currency = has_currency(text, &tokens);
    let mut features = Features {
        text,
        entities: candidate_entities(&tokens),
        domain: infer_domain(&tokens, has_currency, has_ticker),
        word_count: tokens
            .iter()
            .filter(|token| token.chars().any(char::is_alphanumeric))
            .count(),
        has_currency,
        has_ticker,
        year,
    };

    let mut score = 0;
    let mut signals = Vec::new();
    for rule in RULES {
        if (rule.fires)(&features) {
            score += rule.weight;
            signals.push(rule.name);
        }
    }

    if let Some((topic, count)) = dominant_history_topic(history) {
        match features.domain {
            Some(domain) if domain == topic => {
                score += 2;
                signals.push("history_topic");
            }
            None if count >= 2 => {
                features.domain = Some(topic);
                score += 1;
                signals.push("history_topic");
            }
            _ => {}
        }
    }

    RealtimeVerdict {
        needs_realtime: score >= REALTIME_THRESHOLD,
        category: features.domain.unwrap_or(Category::General),
        score,
        source: VerdictSource::Heuristic,
        signals,
    }
}

fn is_currency_code(token: &str) -> bool {
    CURRENCY_CODES.contains(&token.to_ascii_uppercase().as_str())
}

fn has_currency(text: &str, tokens: &[&str]) -> bool {
    if tokens
        .iter()
        .any(|token| CURRENCY_SYMBOLS.contains(token) || is_currency_code(token))
    {
        return true;
    }
    let upper = text.to_ascii_uppercase();
    if CURRENCY_PAIR
        .captures_iter(&upper)
        .any(|caps| is_currency_code(&caps[1]) && is_currency_code(&caps[2]))
    {
        return true;
    }
    // Concatenated pairs such as EURUSD.
    tokens.iter().any(|token| {
        token.len() == 6
            && token.chars().all(|c| c.is_ascii_alphabetic())
            && is_currency_code(&token[..3])
            && is_currency_code(&token[3..])
    })
}

fn is_ticker_like(token: &str) -> bool {
    if CRYPTO_CODES.contains(&token.to_ascii_uppercase().as_str()) {
        return true;
    }
    (1..=5).contains(&token.len())
        && token.chars().all(|c| c.is_ascii_uppercase())
        && !NOT_TICKERS.contains(&token)
}

fn is_companyish(token: &str) -> bool {
    COMPANY_SUFFIXES.contains(&token.trim_matches('.').to_ascii_lowercase().as_str())
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token.to_ascii_lowercase().as_str())
}

/// Capitalized or ticker-like tokens, plus the word before a company suffix.
fn candidate_entities<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut entities: Vec<&'a str> = Vec::new();
    let mut push = |token: &'a str| {
        if !entities
            .iter()
            .any(|known| known.eq_ignore_ascii_case(token))
        {
            entities.push(token);
        }
    };
    for (index, &token) in tokens.iter().enumerate() {
        if is_stopword(token) || CURRENCY_SYMBOLS.contains(&token) || is_currency_code(token) {
            continue;
        }
        if is_ticker_like(token) {
            push(token);
            continue;
        }
        let capitalized = token.chars().next().is_some_and(char::is_uppercase);
        if capitalized && (2..=15).contains(&token.chars().count()) {
            push(token);
        }
        if is_companyish(token) && index > 0 {
            let previous = tokens[index - 1];
            if previous.chars().count() <= 21 && !is_stopword(previous) {
                push(previous);
            }
        }
    }
    entities
}

fn infer_domain(tokens: &[&str], has_currency: bool, has_ticker: bool) -> Option<Category> {
    if has_currency || has_ticker || tokens.iter().any(|token| is_companyish(token)) {
        return Some(Category::Finance);
    }
    let joined = tokens.join(" ").to_lowercase();
    [
        (Category::Finance, &*FINANCE),
        (Category::Weather, &*WEATHER),
        (Category::Sports, &*SPORTS),
        (Category::Politics, &*POLITICS),
        (Category::MediaRelease, &*MEDIA_RELEASE),
        (Category::Transport, &*TRANSPORT),
    ]
    .into_iter()
    .find(|(_, pattern)| pattern.is_match(&joined))
    .map(|(category, _)| category)
}

/// Most frequent topic in the trailing window; earlier topics win ties.
fn dominant_history_topic(history: &[ChatTurn]) -> Option<(Category, usize)> {
    let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let mut best: Option<(Category, usize)> = None;
    for (topic, pattern) in HISTORY_TOPICS.iter() {
        let count = window
            .iter()
            .filter(|turn| !turn.text.is_empty() && pattern.is_match(&turn.text.to_lowercase()))
            .count();
        if count > 0 && best.is_none_or(|(_, top)| count > top) {
            best = Some((*topic, count));
        }
    }
    best
}
