//! Source aggregation for edition retrieval.
//!
//! Four providers are queried concurrently: a newswire research API, a news
//! search API, a regulatory filings search, and an economic data series API.
//! Each provider is individually fallible — a failure or missing credential
//! logs and skips that provider, it never aborts the run. Every provider
//! normalizes its results into [`Candidate`] records.

pub mod econdata;
pub mod filings;
pub mod newswire;
pub mod search;

use std::time::Duration;

use briefdesk_shared::AppConfig;

pub use econdata::EconDataProvider;
pub use filings::FilingsProvider;
pub use newswire::NewswireProvider;
pub use search::SearchProvider;

/// Shared timeout for all provider requests.
pub(crate) const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Max lengths for normalized fields.
pub(crate) const MAX_TITLE_LEN: usize = 200;
pub(crate) const MAX_SNIPPET_LEN: usize = 2000;

/// One retrieved candidate record, not yet assigned to an edition.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub url: Option<String>,
    /// Provider name: "newswire", "search", "filings", "econdata".
    pub source: String,
    /// Tier hint; verification may upgrade it from the source domain.
    pub source_tier: u8,
    pub relevance_category: String,
    pub raw_snippet: String,
}

/// The configured provider set for one retrieval run.
pub struct SourceSet {
    newswire: Option<NewswireProvider>,
    search: Option<SearchProvider>,
    filings: FilingsProvider,
    econdata: Option<EconDataProvider>,
}

impl SourceSet {
    /// Build providers from config. Providers whose credential env var is
    /// unset are recorded as absent and skipped at fetch time with a warning.
    pub fn from_config(config: &AppConfig) -> Self {
        let newswire = config
            .credential(&config.providers.newswire_api_key_env)
            .map(|key| NewswireProvider::new(newswire::DEFAULT_BASE_URL, key));
        let search = config
            .credential(&config.providers.search_api_key_env)
            .map(|key| SearchProvider::new(search::DEFAULT_BASE_URL, key));
        let econdata = config
            .credential(&config.providers.econdata_api_key_env)
            .map(|key| EconDataProvider::new(econdata::DEFAULT_BASE_URL, key));
        let filings = FilingsProvider::new(
            filings::DEFAULT_BASE_URL,
            config.providers.filings_contact.clone(),
        );

        Self {
            newswire,
            search,
            filings,
            econdata,
        }
    }

    /// Assemble a set from explicit providers (tests, custom endpoints).
    pub fn from_providers(
        newswire: Option<NewswireProvider>,
        search: Option<SearchProvider>,
        filings: FilingsProvider,
        econdata: Option<EconDataProvider>,
    ) -> Self {
        Self {
            newswire,
            search,
            filings,
            econdata,
        }
    }

    /// Query all configured providers concurrently and collect results.
    ///
    /// Provider errors degrade to empty contributions; retrieval succeeds
    /// with whatever subset responded.
    pub async fn fetch_all(&self) -> Vec<Candidate> {
        let (newswire, search, filings, econdata) = tokio::join!(
            fetch_optional("newswire", self.newswire.as_ref().map(|p| p.fetch())),
            fetch_optional("search", self.search.as_ref().map(|p| p.fetch())),
            async {
                match self.filings.fetch().await {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::error!(source = "filings", error = %e, "provider failed");
                        Vec::new()
                    }
                }
            },
            fetch_optional("econdata", self.econdata.as_ref().map(|p| p.fetch())),
        );

        let mut all = Vec::new();
        for (name, items) in [
            ("newswire", newswire),
            ("search", search),
            ("filings", filings),
            ("econdata", econdata),
        ] {
            tracing::info!(source = name, count = items.len(), "provider returned");
            all.extend(items);
        }
        all
    }
}

async fn fetch_optional(
    name: &str,
    fut: Option<impl std::future::Future<Output = briefdesk_shared::Result<Vec<Candidate>>>>,
) -> Vec<Candidate> {
    match fut {
        None => {
            tracing::warn!(source = name, "credential not set, skipping provider");
            Vec::new()
        }
        Some(fut) => match fut.await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(source = name, error = %e, "provider failed");
                Vec::new()
            }
        },
    }
}

/// Truncate to at most `max` characters, on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncate a title to the display cap, marking the cut with an ellipsis.
pub(crate) fn truncate_title(s: &str) -> String {
    if s.chars().count() > MAX_TITLE_LEN {
        format!("{}...", truncate_chars(s, MAX_TITLE_LEN - 3))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "é".repeat(300);
        let cut = truncate_chars(&s, 200);
        assert_eq!(cut.chars().count(), 200);
    }

    #[test]
    fn short_title_unchanged() {
        assert_eq!(truncate_title("Rates hold steady"), "Rates hold steady");
    }

    #[test]
    fn long_title_gets_ellipsis() {
        let long = "x".repeat(250);
        let cut = truncate_title(&long);
        assert_eq!(cut.chars().count(), MAX_TITLE_LEN);
        assert!(cut.ends_with("..."));
    }
}
