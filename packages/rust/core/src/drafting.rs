//! Drafting engine: generates newsletter sections sequentially.
//!
//! Sections are generated in a fixed order, each from the best-scoring
//! articles in its relevance categories. Generative calls are strictly
//! sequential with an inter-call delay. A failed call stores a visible
//! failure placeholder so the edition still reaches review intact.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use briefdesk_llm::{GenerationRequest, GenerativeProvider};
use briefdesk_shared::{Article, EditionId, Result, SectionDraft};
use briefdesk_storage::Storage;

use crate::prompts;

/// Fixed section order for every edition.
pub const SECTION_ORDER: &[&str] = &[
    "market_pulse",
    "capital_flows",
    "deal_radar",
    "regulatory_watch",
    "perspective",
];

/// The static partner-commentary section. Never generated, and skipped by
/// both compliance passes.
pub const STATIC_SECTION: &str = "perspective";

/// Delay between generative calls. Sequential by design.
pub const DRAFT_DELAY: Duration = Duration::from_secs(2);

/// Sampling temperature for drafting.
const DRAFT_TEMPERATURE: f32 = 0.7;

/// Relevance categories feeding each section.
pub fn section_categories(section_name: &str) -> &'static [&'static str] {
    match section_name {
        "market_pulse" => &["macro"],
        "capital_flows" => &["regional"],
        "deal_radar" => &["deals"],
        "regulatory_watch" => &["regulatory"],
        _ => &[],
    }
}

/// Max articles injected into each section's prompt context.
fn article_limit(section_name: &str) -> usize {
    match section_name {
        "regulatory_watch" => 3,
        _ => 5,
    }
}

/// Human-readable section headings.
pub fn display_name(section_name: &str) -> &'static str {
    match section_name {
        "market_pulse" => "Market Pulse",
        "capital_flows" => "Capital Flows",
        "deal_radar" => "Deal Radar",
        "regulatory_watch" => "Regulatory Watch",
        "perspective" => "Perspective",
        _ => "Section",
    }
}

/// Generate and store all sections for an edition.
///
/// Without a provider, drafting logs a warning and stores nothing — the
/// pipeline still completes so retrieval results remain inspectable.
pub async fn run_drafting(
    storage: &Storage,
    provider: Option<&dyn GenerativeProvider>,
    edition_id: &EditionId,
    editorial_brief: Option<&str>,
    call_delay: Duration,
) -> Result<()> {
    let Some(provider) = provider else {
        tracing::warn!("generative credential not set, skipping drafting");
        return Ok(());
    };

    // One query, filtered per section in memory
    let mut usable: Vec<Article> = storage
        .articles_for_edition(edition_id)
        .await?
        .into_iter()
        .filter(|a| !a.is_duplicate && a.quality_score > 0.0)
        .collect();
    usable.sort_by(|a, b| {
        b.quality_score
            .partial_cmp(&a.quality_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    tracing::info!(
        %edition_id,
        sections = SECTION_ORDER.len(),
        usable_articles = usable.len(),
        model = provider.model_name(),
        "drafting sections"
    );

    let mut calls = 0;
    for section_name in SECTION_ORDER {
        if *section_name != STATIC_SECTION && calls > 0 {
            tokio::time::sleep(call_delay).await;
        }
        generate_section(storage, provider, edition_id, section_name, &usable, editorial_brief)
            .await?;
        if *section_name != STATIC_SECTION {
            calls += 1;
        }
    }

    tracing::info!(%edition_id, "drafting complete");
    Ok(())
}

async fn generate_section(
    storage: &Storage,
    provider: &dyn GenerativeProvider,
    edition_id: &EditionId,
    section_name: &str,
    usable: &[Article],
    editorial_brief: Option<&str>,
) -> Result<()> {
    if section_name == STATIC_SECTION {
        store_section(
            storage,
            edition_id,
            section_name,
            prompts::PERSPECTIVE_PLACEHOLDER,
            "static",
        )
        .await?;
        tracing::info!(%edition_id, section = section_name, "stored static placeholder");
        return Ok(());
    }

    let categories = section_categories(section_name);
    let section_articles: Vec<&Article> = usable
        .iter()
        .filter(|a| categories.contains(&a.relevance_category.as_str()))
        .take(article_limit(section_name))
        .collect();

    let Some(template) = prompts::section_prompt(section_name) else {
        tracing::warn!(section = section_name, "no prompt template, skipping");
        return Ok(());
    };

    let context = format_articles(&section_articles);
    let mut prompt = template.replace("{articles_context}", &context);
    if section_articles.is_empty() {
        prompt.push_str(prompts::NO_ARTICLES_ADDENDUM);
    }
    if let Some(brief) = editorial_brief {
        prompt = format!(
            "EDITORIAL DIRECTION: {brief}\n\
Prioritize this theme in your analysis while maintaining balanced coverage.\n\n{prompt}"
        );
    }

    tracing::info!(
        %edition_id,
        section = section_name,
        articles_in_context = section_articles.len(),
        "generating section"
    );

    let request = GenerationRequest {
        system: Some(prompts::VOICE_SYSTEM_PROMPT.to_string()),
        prompt,
        temperature: DRAFT_TEMPERATURE,
    };

    let (content, model_used) = match provider.generate(&request).await {
        Ok(text) if !text.trim().is_empty() => (text, provider.model_name().to_string()),
        Ok(_) => (
            "[No content generated]".to_string(),
            provider.model_name().to_string(),
        ),
        Err(e) => {
            tracing::error!(%edition_id, section = section_name, error = %e, "generation failed");
            (
                "[Draft generation failed for this section. Error logged.]".to_string(),
                provider.model_name().to_string(),
            )
        }
    };

    store_section(storage, edition_id, section_name, &content, &model_used).await?;
    tracing::info!(
        %edition_id,
        section = section_name,
        words = content.split_whitespace().count(),
        "section stored"
    );
    Ok(())
}

/// Format articles for injection into a section prompt.
fn format_articles(articles: &[&Article]) -> String {
    let mut parts = Vec::with_capacity(articles.len());
    for (i, a) in articles.iter().enumerate() {
        let mut lines = vec![format!("[{}] {}", i + 1, a.title)];
        lines.push(format!("Source: {} (Tier {})", a.source, a.source_tier));
        if let Some(url) = &a.url {
            lines.push(format!("URL: {url}"));
        }
        if !a.raw_snippet.is_empty() {
            let snippet: String = a.raw_snippet.chars().take(500).collect();
            lines.push(format!("Summary: {snippet}"));
        }
        parts.push(lines.join("\n"));
    }
    parts.join("\n\n")
}

async fn store_section(
    storage: &Storage,
    edition_id: &EditionId,
    section_name: &str,
    content: &str,
    model_used: &str,
) -> Result<()> {
    let section = SectionDraft {
        id: Uuid::now_v7().to_string(),
        edition_id: edition_id.clone(),
        section_name: section_name.to_string(),
        content: content.to_string(),
        word_count: content.split_whitespace().count(),
        model_used: model_used.to_string(),
        generated_at: Utc::now(),
    };
    storage.insert_section(&section).await
}
