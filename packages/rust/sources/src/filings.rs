//! Regulatory filings provider (full-text search over recent filings).
//!
//! The upstream JSON envelope has changed shape more than once, so the
//! response is resolved through an ordered list of pure shape detectors
//! rather than a fixed schema. An unrecognized envelope returns no records
//! instead of failing the run.

use chrono::{Duration, Utc};
use serde_json::Value;

use briefdesk_shared::{BriefdeskError, Result};

use crate::{Candidate, CONNECT_TIMEOUT, MAX_SNIPPET_LEN, PROVIDER_TIMEOUT, truncate_title};

pub const DEFAULT_BASE_URL: &str = "https://filings-search.example";

/// Search window in days.
const WINDOW_DAYS: i64 = 14;

pub struct FilingsProvider {
    client: reqwest::Client,
    base_url: String,
    contact: String,
}

impl FilingsProvider {
    pub fn new(base_url: impl Into<String>, contact: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            contact: contact.into(),
        }
    }

    /// Search filings over the trailing window. Records are authoritative
    /// (tier 1) and feed the regulatory category.
    pub async fn fetch(&self) -> Result<Vec<Candidate>> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let start = (Utc::now() - Duration::days(WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();

        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("User-Agent", &self.contact)
            .header("Accept", "application/json")
            .query(&[
                ("q", "\"real estate\""),
                ("dateRange", "custom"),
                ("startdt", &start),
                ("enddt", &today),
                ("forms", "D,8-K,S-11"),
            ])
            .send()
            .await
            .map_err(|e| BriefdeskError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BriefdeskError::Network(format!(
                "filings search returned status {status}"
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| BriefdeskError::parse(format!("filings response: {e}")))?;

        let Some(filings) = detect_envelope(&data) else {
            let keys: Vec<&str> = data
                .as_object()
                .map(|o| o.keys().map(String::as_str).collect())
                .unwrap_or_default();
            tracing::warn!(?keys, "filings: unrecognized response envelope");
            return Ok(Vec::new());
        };

        let candidates: Vec<Candidate> = filings.iter().filter_map(filing_to_candidate).collect();
        tracing::info!(count = candidates.len(), "filings retrieval complete");
        Ok(candidates)
    }
}

/// Ordered shape detectors for the response envelope. First match wins;
/// no match means no records.
fn detect_envelope(data: &Value) -> Option<&Vec<Value>> {
    if let Some(hits) = data.get("hits") {
        if let Some(inner) = hits.get("hits").and_then(Value::as_array) {
            return Some(inner);
        }
        if let Some(list) = hits.as_array() {
            return Some(list);
        }
        return None;
    }
    for key in ["filings", "results", "data"] {
        if let Some(list) = data.get(key).and_then(Value::as_array) {
            return Some(list);
        }
    }
    None
}

/// Map one filing object to a candidate, tolerating either the
/// search-index wrapper (`_source`) or a flat record.
fn filing_to_candidate(filing: &Value) -> Option<Candidate> {
    let obj = filing.as_object()?;
    let source_data = obj.get("_source").and_then(Value::as_object).unwrap_or(obj);

    let entity = source_data
        .get("display_names")
        .and_then(Value::as_array)
        .and_then(|names| names.first())
        .and_then(Value::as_str)
        .or_else(|| first_str(source_data, &["entity_name", "display_name", "title", "file_description"]))
        .unwrap_or("Filing");

    let form_type = first_str(source_data, &["form_type", "forms"]).unwrap_or("");
    let file_date = first_str(source_data, &["file_date", "date_filed"]).unwrap_or("");
    let file_num = first_str(source_data, &["file_num"]).unwrap_or("");

    let url = obj
        .get("_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(|id| format!("https://filings-search.example/filing/{id}"));

    let mut title = if form_type.is_empty() {
        entity.to_string()
    } else {
        format!("{form_type}: {entity}")
    };
    if !file_date.is_empty() {
        title.push_str(&format!(" ({file_date})"));
    }

    let snippet = format!("Form {form_type} filed {file_date}. File number: {file_num}.");

    Some(Candidate {
        title: truncate_title(&title),
        url,
        source: "filings".into(),
        source_tier: 1,
        relevance_category: "regulatory".into(),
        raw_snippet: crate::truncate_chars(&snippet, MAX_SNIPPET_LEN).to_string(),
    })
}

fn first_str<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn detects_nested_hits() {
        let data = serde_json::json!({"hits": {"hits": [{"_id": "1"}], "total": 1}});
        assert_eq!(detect_envelope(&data).map(Vec::len), Some(1));
    }

    #[test]
    fn detects_flat_hits_list() {
        let data = serde_json::json!({"hits": [{"_id": "1"}, {"_id": "2"}]});
        assert_eq!(detect_envelope(&data).map(Vec::len), Some(2));
    }

    #[test]
    fn detects_alternate_keys_in_order() {
        for key in ["filings", "results", "data"] {
            let data = serde_json::json!({key: [{"title": "x"}]});
            assert_eq!(detect_envelope(&data).map(Vec::len), Some(1), "key {key}");
        }
    }

    #[test]
    fn unrecognized_envelope_is_none() {
        let data = serde_json::json!({"surprise": []});
        assert!(detect_envelope(&data).is_none());
        let data = serde_json::json!({"hits": {"total": 3}});
        assert!(detect_envelope(&data).is_none());
    }

    #[test]
    fn maps_search_index_wrapper() {
        let filing = serde_json::json!({
            "_id": "333-1234",
            "_source": {
                "display_names": ["Acme Property Trust"],
                "form_type": "8-K",
                "file_date": "2026-08-10",
                "file_num": "333-1234"
            }
        });
        let c = filing_to_candidate(&filing).expect("maps");
        assert_eq!(c.title, "8-K: Acme Property Trust (2026-08-10)");
        assert_eq!(c.source_tier, 1);
        assert_eq!(c.relevance_category, "regulatory");
        assert!(c.url.as_deref().unwrap().contains("333-1234"));
    }

    #[test]
    fn maps_flat_record_with_fallback_title() {
        let filing = serde_json::json!({"entity_name": "Plain Fund LP", "forms": "D"});
        let c = filing_to_candidate(&filing).expect("maps");
        assert_eq!(c.title, "D: Plain Fund LP");
        assert!(c.url.is_none());
    }

    #[tokio::test]
    async fn fetch_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": {"hits": [
                    {"_id": "a", "_source": {"entity_name": "Trust A", "form_type": "D", "file_date": "2026-08-01"}},
                    {"_id": "b", "_source": {"entity_name": "Trust B", "form_type": "S-11", "file_date": "2026-08-02"}}
                ]}
            })))
            .mount(&server)
            .await;

        let provider = FilingsProvider::new(server.uri(), "Briefdesk/0.1 (test)");
        let items = provider.fetch().await.expect("fetch succeeds");
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|c| c.source_tier == 1));
    }

    #[tokio::test]
    async fn unrecognized_envelope_returns_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"unexpected": {"shape": true}})),
            )
            .mount(&server)
            .await;

        let provider = FilingsProvider::new(server.uri(), "Briefdesk/0.1 (test)");
        let items = provider.fetch().await.expect("degrades to empty");
        assert!(items.is_empty());
    }
}
