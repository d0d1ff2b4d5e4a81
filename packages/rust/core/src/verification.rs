//! Verification engine: five ordered checks over an edition's articles.
//!
//! Tier classification → link validation → paywall detection →
//! deduplication → quality scoring. Each check reads the results of the
//! previous ones; the final scores are persisted in one batched write and
//! never mutated afterward.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use url::Url;

use briefdesk_shared::{Article, EditionId, Result};
use briefdesk_storage::Storage;

/// Authoritative sources: regulators, primary data, major research shops and
/// wires.
const TIER_1_DOMAINS: &[&str] = &[
    "federalreserve.gov",
    "sec.gov",
    "finra.org",
    "treasury.gov",
    "bls.gov",
    "cbre.com",
    "jll.com",
    "cushmanwakefield.com",
    "bloomberg.com",
    "wsj.com",
    "ft.com",
    "reuters.com",
];

/// Established trade press.
const TIER_2_DOMAINS: &[&str] = &[
    "pere.com",
    "globest.com",
    "bisnow.com",
    "commercialobserver.com",
    "zawya.com",
    "preqin.com",
    "pitchbook.com",
    "nareit.com",
];

/// Domains whose content sits behind a paywall.
const PAYWALL_DOMAINS: &[&str] = &[
    "wsj.com",
    "ft.com",
    "bloomberg.com",
    "barrons.com",
    "economist.com",
    "nytimes.com",
];

/// Title similarity above this marks the lower-tier article a duplicate.
const DUPLICATE_THRESHOLD: f64 = 0.75;

/// Concurrent link checks in flight.
const LINK_CONCURRENCY: usize = 10;

const LINK_TIMEOUT: Duration = Duration::from_secs(5);
const LINK_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

fn tier_weight(tier: u8) -> f64 {
    match tier {
        1 => 1.0,
        2 => 0.7,
        _ => 0.3,
    }
}

/// Run all checks on an edition's articles and persist the results.
pub async fn run_verification(storage: &Storage, edition_id: &EditionId) -> Result<()> {
    let mut articles = storage.articles_for_edition(edition_id).await?;
    if articles.is_empty() {
        tracing::info!(%edition_id, "no articles to verify");
        return Ok(());
    }
    tracing::info!(%edition_id, count = articles.len(), "verifying articles");

    classify_tiers(&mut articles);
    validate_links(&mut articles, None).await;
    detect_paywalls(&mut articles);
    deduplicate(&mut articles);
    compute_scores(&mut articles, Utc::now());

    storage.save_verification_results(&articles).await?;

    let mut tier_counts = [0usize; 3];
    let mut paywalled = 0;
    let mut duplicates = 0;
    for a in &articles {
        let idx = (a.source_tier.clamp(1, 3) - 1) as usize;
        tier_counts[idx] += 1;
        if a.is_paywalled {
            paywalled += 1;
        }
        if a.is_duplicate {
            duplicates += 1;
        }
    }
    tracing::info!(
        %edition_id,
        tier_1 = tier_counts[0],
        tier_2 = tier_counts[1],
        tier_3 = tier_counts[2],
        paywalled,
        duplicates,
        "verification complete"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Domain helpers
// ---------------------------------------------------------------------------

/// Lowercased host with a leading `www.` stripped.
fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let domain = host.strip_prefix("www.").unwrap_or(&host);
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}

/// Exact match or subdomain of any entry.
fn domain_matches(domain: &str, domain_set: &[&str]) -> bool {
    domain_set
        .iter()
        .any(|entry| domain == *entry || domain.ends_with(&format!(".{entry}")))
}

// ---------------------------------------------------------------------------
// Check A: tier classification
// ---------------------------------------------------------------------------

/// Classify articles into tiers 1-3 from their URL domain. Primary-data
/// providers (econdata, filings) are always tier 1. Articles without a URL
/// keep the tier hint set at retrieval.
pub fn classify_tiers(articles: &mut [Article]) {
    for article in articles.iter_mut() {
        if matches!(article.source.as_str(), "econdata" | "filings") {
            article.source_tier = 1;
            continue;
        }

        let Some(url) = article.url.as_deref() else {
            continue;
        };
        let Some(domain) = extract_domain(url) else {
            continue;
        };

        article.source_tier = if domain_matches(&domain, TIER_1_DOMAINS) {
            1
        } else if domain_matches(&domain, TIER_2_DOMAINS) {
            2
        } else {
            3
        };
    }
    tracing::debug!("tier classification complete");
}

// ---------------------------------------------------------------------------
// Check B: link validation
// ---------------------------------------------------------------------------

/// Check that article URLs are reachable via HEAD, falling back to GET when
/// HEAD is rejected. Trusted tier-1/2 and paywall domains are assumed live
/// (they routinely block automated requests), as are primary-data providers
/// and articles without URLs. `base_url_override` redirects all checks to a
/// test server.
pub async fn validate_links(articles: &mut [Article], base_url_override: Option<&str>) {
    let client = match reqwest::Client::builder()
        .timeout(LINK_TIMEOUT)
        .connect_timeout(LINK_CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "could not build link-check client, assuming links valid");
            return;
        }
    };

    let semaphore = Arc::new(Semaphore::new(LINK_CONCURRENCY));
    let mut handles = Vec::new();

    for (idx, article) in articles.iter().enumerate() {
        let Some(url) = article.url.clone() else {
            continue; // no URL, link_valid stays true
        };
        if matches!(article.source.as_str(), "econdata" | "filings") {
            continue;
        }
        if base_url_override.is_none() {
            let trusted = extract_domain(&url).is_some_and(|domain| {
                domain_matches(&domain, TIER_1_DOMAINS)
                    || domain_matches(&domain, TIER_2_DOMAINS)
                    || domain_matches(&domain, PAYWALL_DOMAINS)
            });
            if trusted {
                continue; // trusted domains block bots but are live
            }
        }

        let check_url = match base_url_override {
            Some(base) => match Url::parse(&url) {
                Ok(parsed) => format!("{}{}", base.trim_end_matches('/'), parsed.path()),
                Err(_) => url.clone(),
            },
            None => url.clone(),
        };

        let client = client.clone();
        let sem = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            (idx, check_link(&client, &check_url).await)
        }));
    }

    for handle in handles {
        if let Ok((idx, valid)) = handle.await {
            articles[idx].link_valid = valid;
        }
    }

    let valid = articles.iter().filter(|a| a.link_valid).count();
    tracing::debug!(valid, total = articles.len(), "link validation complete");
}

async fn check_link(client: &reqwest::Client, url: &str) -> bool {
    match client.head(url).send().await {
        Ok(resp) if resp.status().as_u16() < 400 => true,
        Ok(_) => {
            // HEAD blocked or failed, try GET
            match client.get(url).send().await {
                Ok(resp) => resp.status().as_u16() < 400,
                Err(_) => false,
            }
        }
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Check C: paywall detection
// ---------------------------------------------------------------------------

/// Mark articles hosted on known paywall domains.
pub fn detect_paywalls(articles: &mut [Article]) {
    let mut count = 0;
    for article in articles.iter_mut() {
        let Some(url) = article.url.as_deref() else {
            continue;
        };
        if extract_domain(url).is_some_and(|domain| domain_matches(&domain, PAYWALL_DOMAINS)) {
            article.is_paywalled = true;
            count += 1;
        }
    }
    tracing::debug!(count, "paywall detection complete");
}

// ---------------------------------------------------------------------------
// Check D: deduplication
// ---------------------------------------------------------------------------

/// Mark near-duplicate titles. Single forward pass: for each surviving pair
/// above the similarity threshold, the article with the worse (higher) tier
/// number is marked; on a tie the later article is marked. Once an article
/// is itself marked it stops claiming comparisons.
pub fn deduplicate(articles: &mut [Article]) {
    let mut count = 0;
    for i in 0..articles.len() {
        if articles[i].is_duplicate {
            continue;
        }
        for j in (i + 1)..articles.len() {
            if articles[j].is_duplicate {
                continue;
            }

            let similarity = strsim::normalized_levenshtein(
                &articles[i].title.to_lowercase(),
                &articles[j].title.to_lowercase(),
            );
            if similarity > DUPLICATE_THRESHOLD {
                if articles[i].source_tier > articles[j].source_tier {
                    articles[i].is_duplicate = true;
                    count += 1;
                    break; // i is marked, stop comparing it
                } else {
                    articles[j].is_duplicate = true;
                    count += 1;
                }
            }
        }
    }
    tracing::debug!(count, "deduplication complete");
}

// ---------------------------------------------------------------------------
// Check E: quality scoring
// ---------------------------------------------------------------------------

/// score = tier_weight x recency x relevance(1.0) x accessibility, rounded
/// to two decimals. Duplicates are forced to zero.
pub fn compute_scores(articles: &mut [Article], now: DateTime<Utc>) {
    for article in articles.iter_mut() {
        if article.is_duplicate {
            article.quality_score = 0.0;
            continue;
        }

        let weight = tier_weight(article.source_tier);

        let age = now.signed_duration_since(article.retrieved_at);
        let recency = if age < chrono::Duration::days(3) {
            1.0
        } else if age < chrono::Duration::days(7) {
            0.8
        } else if age < chrono::Duration::days(14) {
            0.5
        } else {
            0.2
        };

        let relevance = 1.0;

        let accessibility = if !article.link_valid {
            0.0
        } else if article.is_paywalled {
            0.5
        } else {
            1.0
        };

        article.quality_score =
            (weight * recency * relevance * accessibility * 100.0).round() / 100.0;
    }
    tracing::debug!("quality scoring complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article(source: &str, url: Option<&str>, title: &str) -> Article {
        Article {
            id: uuid::Uuid::now_v7().to_string(),
            edition_id: EditionId::new(),
            title: title.into(),
            url: url.map(str::to_string),
            source: source.into(),
            source_tier: 3,
            relevance_category: "macro".into(),
            quality_score: 0.0,
            is_paywalled: false,
            is_duplicate: false,
            link_valid: true,
            raw_snippet: String::new(),
            retrieved_at: Utc::now(),
        }
    }

    #[test]
    fn primary_data_sources_are_always_tier_1() {
        let mut articles = vec![
            article("econdata", None, "Fed Funds Rate: 4.25%"),
            article("filings", Some("https://anything.example/f"), "8-K: Acme"),
        ];
        classify_tiers(&mut articles);
        assert!(articles.iter().all(|a| a.source_tier == 1));
    }

    #[test]
    fn domain_tiering_with_www_and_subdomains() {
        let mut articles = vec![
            article("search", Some("https://www.reuters.com/a"), "a"),
            article("search", Some("https://markets.ft.com/b"), "b"),
            article("search", Some("https://www.globest.com/c"), "c"),
            article("search", Some("https://randomblog.example/d"), "d"),
            article("newswire", None, "e"),
        ];
        classify_tiers(&mut articles);
        assert_eq!(articles[0].source_tier, 1);
        assert_eq!(articles[1].source_tier, 1);
        assert_eq!(articles[2].source_tier, 2);
        assert_eq!(articles[3].source_tier, 3);
        // No URL keeps the retrieval-time hint
        assert_eq!(articles[4].source_tier, 3);
    }

    #[test]
    fn suffix_match_requires_dot_boundary() {
        // notreuters.com must not match reuters.com
        assert!(!domain_matches("notreuters.com", TIER_1_DOMAINS));
        assert!(domain_matches("live.reuters.com", TIER_1_DOMAINS));
    }

    #[test]
    fn tier_classification_is_idempotent() {
        let mut articles = vec![
            article("search", Some("https://www.reuters.com/a"), "a"),
            article("search", Some("https://randomblog.example/d"), "d"),
            article("econdata", None, "Fed Funds Rate: 4.25%"),
        ];
        classify_tiers(&mut articles);
        let first: Vec<u8> = articles.iter().map(|a| a.source_tier).collect();
        classify_tiers(&mut articles);
        let second: Vec<u8> = articles.iter().map(|a| a.source_tier).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn paywall_detection_marks_known_domains() {
        let mut articles = vec![
            article("search", Some("https://www.wsj.com/story"), "a"),
            article("search", Some("https://openwire.example/story"), "b"),
            article("newswire", None, "c"),
        ];
        detect_paywalls(&mut articles);
        assert!(articles[0].is_paywalled);
        assert!(!articles[1].is_paywalled);
        assert!(!articles[2].is_paywalled);
    }

    #[test]
    fn dedup_marks_worse_tier_ties_mark_later() {
        let mut articles = vec![
            article("search", None, "Sovereign fund buys Miami office tower"),
            article("search", None, "Sovereign fund buys Miami office towers"),
            article("search", None, "Completely unrelated economic story"),
        ];
        articles[0].source_tier = 1;
        articles[1].source_tier = 3;
        deduplicate(&mut articles);
        assert!(!articles[0].is_duplicate);
        assert!(articles[1].is_duplicate);
        assert!(!articles[2].is_duplicate);

        // Tie: the later article is marked
        let mut tied = vec![
            article("search", None, "Industrial demand holds firm in Q3"),
            article("search", None, "Industrial demand holds firm in Q2"),
        ];
        deduplicate(&mut tied);
        assert!(!tied[0].is_duplicate);
        assert!(tied[1].is_duplicate);
    }

    #[test]
    fn dedup_marked_article_stops_claiming_comparisons() {
        // a ~ b with a worse-tiered: a is marked and breaks out, leaving c
        // to be compared against b only.
        let mut articles = vec![
            article("search", None, "Fund closes two billion dollar vehicle"),
            article("search", None, "Fund closes two billion dollar vehicles"),
            article("search", None, "Fund closes two billion dollar vehicle."),
        ];
        articles[0].source_tier = 3;
        articles[1].source_tier = 1;
        articles[2].source_tier = 1;
        deduplicate(&mut articles);
        assert!(articles[0].is_duplicate);
        assert!(!articles[1].is_duplicate);
        assert!(articles[2].is_duplicate); // tie against b, later marked
    }

    #[test]
    fn scores_combine_weight_recency_accessibility() {
        let now = Utc::now();
        let mut articles = vec![
            article("search", None, "fresh tier 1"),
            article("search", None, "old tier 2"),
            article("search", None, "paywalled tier 1"),
            article("search", None, "dead link"),
            article("search", None, "duplicate"),
        ];
        articles[0].source_tier = 1; // 1.0 * 1.0 * 1.0 = 1.0
        articles[1].source_tier = 2;
        articles[1].retrieved_at = now - chrono::Duration::days(10); // 0.7 * 0.5 = 0.35
        articles[2].source_tier = 1;
        articles[2].is_paywalled = true; // 1.0 * 1.0 * 0.5 = 0.5
        articles[3].link_valid = false; // 0.0
        articles[4].is_duplicate = true; // forced 0.0
        articles[4].source_tier = 1;

        compute_scores(&mut articles, now);
        assert_eq!(articles[0].quality_score, 1.0);
        assert_eq!(articles[1].quality_score, 0.35);
        assert_eq!(articles[2].quality_score, 0.5);
        assert_eq!(articles[3].quality_score, 0.0);
        assert_eq!(articles[4].quality_score, 0.0);
    }

    #[test]
    fn live_score_mass_is_order_independent_without_near_duplicates() {
        let now = Utc::now();
        let build = || {
            vec![
                article("search", None, "Office vacancies tighten downtown"),
                article("search", None, "Sunbelt multifamily starts slow sharply"),
                article("search", None, "Logistics rents plateau after long run"),
            ]
        };
        let mut forward = build();
        let mut reversed = build();
        reversed.reverse();
        for batch in [&mut forward, &mut reversed] {
            deduplicate(batch);
            compute_scores(batch, now);
        }
        let mass = |batch: &[Article]| -> f64 {
            batch
                .iter()
                .filter(|a| !a.is_duplicate)
                .map(|a| a.quality_score)
                .sum()
        };
        assert_eq!(mass(&forward), mass(&reversed));
    }

    #[test]
    fn score_rounding_two_decimals() {
        let now = Utc::now();
        let mut articles = vec![article("search", None, "week old tier 2")];
        articles[0].source_tier = 2;
        articles[0].retrieved_at = now - chrono::Duration::days(4);
        articles[0].is_paywalled = true; // 0.7 * 0.8 * 0.5 = 0.28
        compute_scores(&mut articles, now);
        assert_eq!(articles[0].quality_score, 0.28);
    }

    #[tokio::test]
    async fn link_check_head_then_get_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/blocked-head"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blocked-head"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut articles = vec![
            article("search", Some("https://site.example/blocked-head"), "a"),
            article("search", Some("https://site.example/gone"), "b"),
            article("search", Some("https://site.example/ok"), "c"),
            article("econdata", Some("https://site.example/gone"), "d"),
        ];
        validate_links(&mut articles, Some(&server.uri())).await;
        assert!(articles[0].link_valid, "GET fallback rescues blocked HEAD");
        assert!(!articles[1].link_valid);
        assert!(articles[2].link_valid);
        assert!(articles[3].link_valid, "primary data sources skipped");
    }
}
