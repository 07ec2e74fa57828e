//! Standalone web lookup returning result URLs. Not used during generation;
//! grounding there is done by the provider's own search tool.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";
const USER_AGENT: &str = concat!("chatmux/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("search API returned status {0}")]
    Status(u16),
}

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "Results", default)]
    results: Vec<RelatedTopic>,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Result {
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

pub struct WebSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearch {
    pub fn new(timeout_secs: u64) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
        })
    }

    /// Up to `num_results` absolute http(s) URLs for `query`.
    pub async fn search(&self, query: &str, num_results: usize) -> Result<Vec<String>, SearchError> {
        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.endpoint,
            urlencoding::encode(query)
        );
        debug!(query, num_results, "running web search");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }
        let answer: InstantAnswer = response.json().await?;
        Ok(collect_urls(&answer, num_results))
    }
}

fn collect_urls(answer: &InstantAnswer, limit: usize) -> Vec<String> {
    fn walk<'a>(topics: &'a [RelatedTopic], out: &mut Vec<&'a str>) {
        for topic in topics {
            match topic {
                RelatedTopic::Result { first_url } => out.push(first_url),
                RelatedTopic::Group { topics } => walk(topics, out),
            }
        }
    }

    let mut candidates = vec![answer.abstract_url.as_str()];
    walk(&answer.results, &mut candidates);
    walk(&answer.related_topics, &mut candidates);

    let mut urls: Vec<String> = Vec::new();
    for candidate in candidates {
        if urls.len() >= limit {
            break;
        }
        let candidate = candidate.trim();
        if is_absolute_http(candidate) && !urls.iter().any(|url| url == candidate) {
            urls.push(candidate.to_string());
        }
    }
    urls
}

fn is_absolute_http(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
