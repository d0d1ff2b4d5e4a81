//! Economic data provider (FRED-style series observations).
//!
//! Pulls the latest observation for a fixed set of macro series. Each
//! observation becomes one tier-1 candidate in the macro category.

use serde::Deserialize;

use briefdesk_shared::{BriefdeskError, Result};

use crate::{Candidate, CONNECT_TIMEOUT, PROVIDER_TIMEOUT};

pub const DEFAULT_BASE_URL: &str = "https://api.econdata.example";

/// Series to pull: (series id, label, value is a percentage).
const SERIES: &[(&str, &str, bool)] = &[
    ("FEDFUNDS", "Fed Funds Rate", true),
    ("DGS10", "10-Year Treasury Yield", true),
    ("CPIAUCSL", "CPI", false),
];

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    #[serde(default = "unknown")]
    date: String,
    #[serde(default = "not_available")]
    value: String,
}

fn unknown() -> String {
    "unknown".into()
}
fn not_available() -> String {
    "N/A".into()
}

pub struct EconDataProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EconDataProvider {
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

    /// Fetch the latest observation per series, concurrently. A failed or
    /// empty series logs and contributes nothing.
    pub async fn fetch(&self) -> Result<Vec<Candidate>> {
        let mut handles = Vec::new();
        for (series_id, label, is_pct) in SERIES {
            let client = self.client.clone();
            let base_url = self.base_url.clone();
            let api_key = self.api_key.clone();
            handles.push(tokio::spawn(async move {
                single_series(&client, &base_url, &api_key, series_id, label, *is_pct).await
            }));
        }

        let mut candidates = Vec::new();
        for (handle, (series_id, _, _)) in handles.into_iter().zip(SERIES) {
            match handle.await {
                Ok(Ok(Some(candidate))) => candidates.push(candidate),
                Ok(Ok(None)) => {
                    tracing::warn!(series_id, "econ series returned no observations");
                }
                Ok(Err(e)) => {
                    tracing::error!(series_id, error = %e, "econ series failed");
                }
                Err(e) => {
                    tracing::error!(series_id, error = %e, "econ series task panicked");
                }
            }
        }

        tracing::info!(count = candidates.len(), "econ data retrieval complete");
        Ok(candidates)
    }
}

async fn single_series(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    series_id: &str,
    label: &str,
    is_pct: bool,
) -> Result<Option<Candidate>> {
    let url = format!("{}/series/observations", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .query(&[
            ("series_id", series_id),
            ("api_key", api_key),
            ("file_type", "json"),
            ("sort_order", "desc"),
            ("limit", "1"),
        ])
        .send()
        .await
        .map_err(|e| BriefdeskError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BriefdeskError::Network(format!(
            "econ series {series_id} returned status {status}"
        )));
    }

    let parsed: SeriesResponse = response
        .json()
        .await
        .map_err(|e| BriefdeskError::parse(format!("econ series {series_id}: {e}")))?;

    let Some(obs) = parsed.observations.first() else {
        return Ok(None);
    };

    let title = if is_pct {
        format!("{label}: {}% ({})", obs.value, obs.date)
    } else {
        format!("{label}: {} ({})", obs.value, obs.date)
    };

    Ok(Some(Candidate {
        title,
        url: Some(format!(
            "{}/series/{series_id}",
            base_url.trim_end_matches('/')
        )),
        source: "econdata".into(),
        source_tier: 1,
        relevance_category: "macro".into(),
        raw_snippet: format!(
            "{label} ({series_id}): {} as of {}. Source: federal economic data series.",
            obs.value, obs.date
        ),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn latest_observation_per_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/series/observations"))
            .and(query_param("sort_order", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "observations": [{"date": "2026-08-20", "value": "4.25"}]
            })))
            .mount(&server)
            .await;

        let provider = EconDataProvider::new(server.uri(), "key");
        let items = provider.fetch().await.expect("fetch succeeds");
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|c| c.source_tier == 1));
        assert!(items.iter().all(|c| c.relevance_category == "macro"));
        // Percentage formatting applies to rate series but not index series
        assert!(items.iter().any(|c| c.title.contains("4.25%")));
        assert!(items.iter().any(|c| c.title == "CPI: 4.25 (2026-08-20)"));
    }

    #[tokio::test]
    async fn empty_observations_skip_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/series/observations"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"observations": []})),
            )
            .mount(&server)
            .await;

        let provider = EconDataProvider::new(server.uri(), "key");
        let items = provider.fetch().await.expect("fetch succeeds");
        assert!(items.is_empty());
    }
}
