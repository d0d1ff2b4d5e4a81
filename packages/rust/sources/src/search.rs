//! News search provider (Google-News-style JSON API).

use serde::Deserialize;

use briefdesk_shared::{BriefdeskError, Result};

use crate::{Candidate, CONNECT_TIMEOUT, MAX_SNIPPET_LEN, PROVIDER_TIMEOUT, truncate_chars};

pub const DEFAULT_BASE_URL: &str = "https://api.newssearch.example";

/// Fixed search queries with the relevance category each feeds.
const QUERIES: &[(&str, &str)] = &[
    ("cross-border real estate investment", "deals"),
    ("sovereign wealth fund real estate", "regional"),
    ("Latin America real estate fund institutional", "regional"),
    ("US commercial real estate market", "macro"),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news_results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: String,
}

pub struct SearchProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SearchProvider {
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

    /// Run all news searches concurrently; failed queries log and skip.
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
                    tracing::error!(query, error = %e, "search query failed");
                }
                Err(e) => {
                    tracing::error!(query, error = %e, "search query task panicked");
                }
            }
        }

        tracing::info!(
            count = candidates.len(),
            queries = QUERIES.len(),
            "news search retrieval complete"
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
    let url = format!("{}/search", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .query(&[("engine", "news"), ("q", query), ("api_key", api_key)])
        .send()
        .await
        .map_err(|e| BriefdeskError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BriefdeskError::Network(format!(
            "news search returned status {status}"
        )));
    }

    let parsed: SearchResponse = response
        .json()
        .await
        .map_err(|e| BriefdeskError::parse(format!("news search response: {e}")))?;

    let mut candidates = Vec::new();
    for item in parsed.news_results {
        let title = item.title.trim();
        if title.is_empty() {
            continue;
        }
        candidates.push(Candidate {
            title: crate::truncate_title(title),
            url: item.link,
            source: "search".into(),
            source_tier: 3,
            relevance_category: category.to_string(),
            raw_snippet: truncate_chars(&item.snippet, MAX_SNIPPET_LEN).to_string(),
        });
    }
    Ok(candidates)
}
