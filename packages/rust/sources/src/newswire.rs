//! Newswire research provider.
//!
//! Talks to an LLM-backed research API (chat-completions shaped) and parses
//! its free-form answers into candidate records. The parser is deliberately
//! forgiving: numbered lists, then bullet lists, then blank-line paragraphs,
//! and finally the whole answer as a single record. Non-empty input never
//! produces zero records.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use briefdesk_shared::{BriefdeskError, Result};

use crate::{
    Candidate, CONNECT_TIMEOUT, MAX_SNIPPET_LEN, MAX_TITLE_LEN, PROVIDER_TIMEOUT, truncate_chars,
    truncate_title,
};

pub const DEFAULT_BASE_URL: &str = "https://api.newswire-research.example";

/// Fixed research queries with the relevance category each feeds.
const QUERIES: &[(&str, &str)] = &[
    (
        "Recent sovereign wealth fund real estate investments and major deals",
        "regional",
    ),
    (
        "Latin American institutional real estate capital flows",
        "regional",
    ),
    (
        "US commercial real estate market conditions cap rates multifamily industrial",
        "macro",
    ),
    (
        "Cross-border real estate fund launches and LP allocations",
        "deals",
    ),
    (
        "Real estate regulation and securities compliance updates",
        "regulatory",
    ),
];

const SYSTEM_PROMPT: &str = "You are a financial research assistant. Return a list of recent news \
articles, reports, or data points about the topic. For each item, provide the title, source URL \
if available, and a brief summary. Format as a numbered list.";

static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\d+[.)]\s+").expect("valid regex"));
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*[-*\u{2022}]\s+").expect("valid regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)\]>,"']+"#).expect("valid regex"));
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));
static MD_BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct ResearchResponse {
    #[serde(default)]
    choices: Vec<ResearchChoice>,
}

#[derive(Debug, Deserialize)]
struct ResearchChoice {
    message: ResearchMessage,
}

#[derive(Debug, Deserialize)]
struct ResearchMessage {
    #[serde(default)]
    content: String,
}

pub struct NewswireProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NewswireProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Run all research queries concurrently. A single failed query logs and
    /// contributes nothing; the rest still count.
    pub async fn fetch(&self) -> Result<Vec<Candidate>> {
        let mut handles = Vec::new();
        for (query, category) in QUERIES {
            let client = self.client.clone();
            let base_url = self.base_url.clone();
            let api_key = self.api_key.clone();
            handles.push(tokio::spawn(async move {
                single_query(&client, &base_url, &api_key, query, category).await
            }));
        }

        let mut candidates = Vec::new();
        for (handle, (query, _)) in handles.into_iter().zip(QUERIES) {
            match handle.await {
                Ok(Ok(items)) => candidates.extend(items),
                Ok(Err(e)) => {
                    tracing::error!(query, error = %e, "newswire query failed");
                }
                Err(e) => {
                    tracing::error!(query, error = %e, "newswire query task panicked");
                }
            }
        }

        tracing::info!(
            count = candidates.len(),
            queries = QUERIES.len(),
            "newswire retrieval complete"
        );
        Ok(candidates)
    }
}

async fn single_query(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    query: &str,
    category: &str,
) -> Result<Vec<Candidate>> {
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&json!({
            "model": "research",
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": query},
            ],
        }))
        .send()
        .await
        .map_err(|e| BriefdeskError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BriefdeskError::Network(format!(
            "newswire query returned status {status}"
        )));
    }

    let parsed: ResearchResponse = response
        .json()
        .await
        .map_err(|e| BriefdeskError::parse(format!("newswire response: {e}")))?;

    let content = parsed
        .choices
        .first()
        .map(|c| c.message.content.as_str())
        .unwrap_or("");

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    Ok(parse_research_text(content, query, category))
}

/// Parse a free-form research answer into candidates. Ordered strategies:
/// numbered items, bullet items, blank-line paragraphs, then the whole text
/// as one record. Never returns zero records for non-empty input.
pub fn parse_research_text(text: &str, query: &str, category: &str) -> Vec<Candidate> {
    let items = split_items(text);

    if items.is_empty() {
        return vec![whole_text_record(text, query, category)];
    }

    let mut candidates = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let url = URL_RE
            .find(item)
            .map(|m| m.as_str().trim_end_matches(['.', ')']).to_string());

        let first_line = item.lines().next().unwrap_or("").trim();
        let mut title = MD_LINK_RE.replace_all(first_line, "$1").into_owned();
        title = MD_BOLD_RE.replace_all(&title, "$1").into_owned();
        let title = title.trim_matches(['*', ' ', '-', '#']);

        let title = if title.is_empty() {
            truncate_chars(query, MAX_TITLE_LEN).to_string()
        } else {
            truncate_title(title)
        };

        candidates.push(Candidate {
            title,
            url,
            source: "newswire".into(),
            source_tier: 3,
            relevance_category: category.into(),
            raw_snippet: truncate_chars(item, MAX_SNIPPET_LEN).to_string(),
        });
    }

    if candidates.is_empty() {
        candidates.push(whole_text_record(text, query, category));
    }
    candidates
}

/// Strategy chain for splitting the answer into items. Each splitter only
/// wins if it finds more than one piece; the first match is kept as-is
/// (preamble before the first marker is dropped).
fn split_items(text: &str) -> Vec<&str> {
    let numbered: Vec<&str> = NUMBERED_RE.split(text).collect();
    if numbered.len() > 1 {
        return numbered[1..].to_vec();
    }

    let bullets: Vec<&str> = BULLET_RE.split(text).collect();
    if bullets.len() > 1 {
        return bullets[1..].to_vec();
    }

    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn whole_text_record(text: &str, query: &str, category: &str) -> Candidate {
    Candidate {
        title: truncate_chars(query, MAX_TITLE_LEN).to_string(),
        url: None,
        source: "newswire".into(),
        source_tier: 3,
        relevance_category: category.into(),
        raw_snippet: truncate_chars(text, MAX_SNIPPET_LEN).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_numbered_list() {
        let text = "Here are recent items:\n1. **Fund A closes $2B vehicle**\nhttps://example.com/a — a large close.\n2. Fund B expands\nSome detail here.";
        let items = parse_research_text(text, "query", "deals");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Fund A closes $2B vehicle");
        assert_eq!(items[0].url.as_deref(), Some("https://example.com/a"));
        assert_eq!(items[1].title, "Fund B expands");
        assert!(items[1].url.is_none());
    }

    #[test]
    fn falls_back_to_bullets() {
        let text = "Findings:\n- First story about rates\n- Second story about flows";
        let items = parse_research_text(text, "query", "macro");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First story about rates");
    }

    #[test]
    fn falls_back_to_paragraphs() {
        let text = "Cap rates widened in Q3.\n\nIndustrial demand stayed firm.";
        let items = parse_research_text(text, "query", "macro");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn unstructured_text_becomes_one_record() {
        let text = "single line with no structure at all";
        let items = parse_research_text(text, "my query", "macro");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, text);
        assert_eq!(items[0].raw_snippet, text);
    }

    #[test]
    fn whitespace_only_text_falls_back_to_query_record() {
        let items = parse_research_text("   \n\n   ", "my query", "macro");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "my query");
    }

    #[test]
    fn strips_markdown_from_titles() {
        let text = "List:\n1. [Linked Title](https://example.com/x) extra\ndetails";
        let items = parse_research_text(text, "q", "deals");
        assert_eq!(items[0].title, "Linked Title extra");
    }

    #[test]
    fn url_trailing_punctuation_trimmed() {
        let text = "Items:\n1. A story (see https://example.com/page).\nmore";
        let items = parse_research_text(text, "q", "deals");
        assert_eq!(items[0].url.as_deref(), Some("https://example.com/page"));
    }

    #[test]
    fn long_titles_capped() {
        let long_line = "T".repeat(400);
        let text = format!("Items:\n1. {long_line}\nbody");
        let items = parse_research_text(&text, "q", "macro");
        assert_eq!(items[0].title.chars().count(), MAX_TITLE_LEN);
        assert!(items[0].title.ends_with("..."));
    }

    #[tokio::test]
    async fn fetch_parses_server_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant",
                    "content": "Results:\n1. Story one\nhttps://example.com/1\n2. Story two"}}]
            })))
            .mount(&server)
            .await;

        let provider = NewswireProvider::new(server.uri(), "key");
        let items = provider.fetch().await.expect("fetch succeeds");
        // Five queries, each returning two parsed items
        assert_eq!(items.len(), 10);
        assert!(items.iter().all(|c| c.source == "newswire"));
        assert!(items.iter().all(|c| c.source_tier == 3));
    }

    #[tokio::test]
    async fn fetch_tolerates_failing_queries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = NewswireProvider::new(server.uri(), "key");
        let items = provider.fetch().await.expect("fetch degrades, not fails");
        assert!(items.is_empty());
    }
}
