//! Two-pass compliance engine.
//!
//! Pass 1 runs a fixed table of deterministic patterns against every
//! section draft. Pass 2 sends each section to the generative provider for
//! a holistic review and parses the structured response leniently. Both
//! passes skip the static partner-commentary section, and both catch
//! per-section failures so one bad section never aborts the scan.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use briefdesk_llm::{GenerationRequest, GenerativeProvider, strip_code_fences};
use briefdesk_shared::{ComplianceFlag, EditionId, Result, SectionDraft, Severity};
use briefdesk_storage::Storage;

use crate::drafting::STATIC_SECTION;
use crate::prompts;

/// Delay between holistic-review calls. Sequential by design.
pub const PASS_2_DELAY: Duration = Duration::from_secs(2);

/// Sampling temperature for the holistic pass, kept low for consistency.
const PASS_2_TEMPERATURE: f32 = 0.3;

struct Rule {
    name: &'static str,
    pattern: Regex,
    /// A match is dropped when the matched text matches `.0` and the text
    /// immediately after the match matches `.1`.
    exception: Option<(Regex, Regex)>,
    severity: Severity,
    rule_reference: &'static str,
    explanation: &'static str,
    recommended_action: &'static str,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let re = |p: &str| Regex::new(p).expect("valid compliance pattern");
    vec![
        Rule {
            name: "guarantee_language",
            pattern: re(r"(?i)\b(guaranteed|risk[- ]free|no\s+risk|certain\s+to|cannot\s+lose)\b"),
            // "risk-free rate" and friends are legitimate market terms
            exception: Some((
                re(r"(?i)^risk[- ]free$"),
                re(r"(?i)^\s+(rate|rates|return|returns|yield|yields|benchmark)\b"),
            )),
            severity: Severity::Block,
            rule_reference: "2210(d)(1)(B)",
            explanation: "Guarantee or risk-elimination language is prohibited in broker-dealer communications.",
            recommended_action: "Remove guarantee language entirely. Reframe with appropriate risk disclosure.",
        },
        Rule {
            name: "mnpi_risk",
            pattern: re(
                r"(?i)\b(insider\s+information|confidential\s+information|non[- ]public\s+information|before\s+announcement)\b",
            ),
            exception: None,
            severity: Severity::Block,
            rule_reference: "2210(d)(1)(B)",
            explanation: "Content that references or implies use of material non-public information.",
            recommended_action: "Remove any reference to non-public or insider information. Ensure all data is from public sources.",
        },
        Rule {
            name: "superlative_claim",
            pattern: re(
                r"(?i)\b(best\s+fund|top\s+manager|leading\s+performer|#1\s+fund|number\s+one\s+fund)\b",
            ),
            exception: None,
            severity: Severity::Block,
            rule_reference: "2210(d)(1)(B)",
            explanation: "Superlative claims about fund performance or manager rankings are misleading without substantiation.",
            recommended_action: "Remove superlative. If ranking is sourced, cite the methodology and time period.",
        },
        Rule {
            name: "performance_claim",
            pattern: re(
                r"(?i)\b(\d+\s*%\s*(return|yield|IRR|annualized|net|gross)|(IRR|yield|return)\s+of\s+\d+|outperform(ed|s|ing)?|beat(s|ing)?\s+(the\s+)?benchmark)\b",
            ),
            exception: None,
            severity: Severity::MandatoryReview,
            rule_reference: "2210(d)(1)(F)",
            explanation: "Specific performance figures or claims of outperformance require careful review for fair presentation.",
            recommended_action: "Verify source attribution. Add context about time period, methodology, and that past performance does not guarantee future results.",
        },
        Rule {
            name: "solicitation",
            pattern: re(
                r"(?i)\b(contact\s+us\s+to\s+invest|invest\s+with\s+us|schedule\s+a\s+call|get\s+in\s+touch\s+to\s+(invest|learn|discuss))\b",
            ),
            exception: None,
            severity: Severity::Warning,
            rule_reference: "2210(d)(1)(A), Reg D 506(b)",
            explanation: "Direct solicitation language may violate general solicitation restrictions for private placements.",
            recommended_action: "Remove solicitation language. Newsletter should inform, not solicit.",
        },
        Rule {
            name: "tax_claim",
            pattern: re(
                r"(?i)\b(tax[- ]free\s+investment|no\s+tax\s+implications|tax\s+exempt\s+investment|avoid(s|ing)?\s+(all\s+)?tax(es|ation)?)\b",
            ),
            exception: None,
            severity: Severity::Warning,
            rule_reference: "2210(d)(4)",
            explanation: "Tax benefit claims must be qualified and cannot overstate the tax advantages of an investment.",
            recommended_action: "Qualify tax references. Add disclaimer that tax treatment depends on individual circumstances.",
        },
        Rule {
            name: "forward_looking",
            pattern: re(
                r"(?i)\b(we\s+expect|we\s+forecast|we\s+anticipate|will\s+likely|projected\s+to|poised\s+to)\b",
            ),
            exception: None,
            severity: Severity::AddDisclaimer,
            rule_reference: "2210(d)(1)(F)",
            explanation: "Forward-looking statements should be identified as such and accompanied by appropriate disclaimers.",
            recommended_action: "Add forward-looking statement disclaimer. Consider qualifying with 'based on current expectations' or similar.",
        },
    ]
});

/// Run both passes over an edition's section drafts, appending flags.
pub async fn run_compliance(
    storage: &Storage,
    provider: Option<&dyn GenerativeProvider>,
    edition_id: &EditionId,
    pass_2_delay: Duration,
) -> Result<()> {
    let drafts = storage.sections_for_edition(edition_id).await?;
    if drafts.is_empty() {
        tracing::warn!(%edition_id, "no section drafts to scan");
        return Ok(());
    }
    tracing::info!(%edition_id, sections = drafts.len(), "running compliance scan");

    let mut pass_1_total = 0;
    for draft in &drafts {
        if draft.section_name == STATIC_SECTION {
            continue;
        }
        let flags = run_pass_1(&draft.id, &draft.content);
        if flags.is_empty() {
            continue;
        }
        match storage.insert_flags(&flags).await {
            Ok(n) => pass_1_total += n,
            Err(e) => {
                tracing::error!(section = %draft.section_name, error = %e, "pass 1 flag write failed");
            }
        }
    }
    tracing::info!(%edition_id, flags = pass_1_total, "pass 1 complete");

    let Some(provider) = provider else {
        tracing::warn!("generative credential not set, skipping compliance pass 2");
        return Ok(());
    };

    let system = prompts::compliance_system_prompt();
    let mut pass_2_total = 0;
    let mut calls = 0;
    for draft in &drafts {
        if draft.section_name == STATIC_SECTION {
            continue;
        }
        if calls > 0 {
            tokio::time::sleep(pass_2_delay).await;
        }
        match run_pass_2(provider, &system, draft).await {
            Ok(flags) if !flags.is_empty() => match storage.insert_flags(&flags).await {
                Ok(n) => pass_2_total += n,
                Err(e) => {
                    tracing::error!(section = %draft.section_name, error = %e, "pass 2 flag write failed");
                }
            },
            Ok(_) => {}
            Err(e) => {
                tracing::error!(section = %draft.section_name, error = %e, "pass 2 failed");
            }
        }
        calls += 1;
    }
    tracing::info!(%edition_id, flags = pass_2_total, "pass 2 complete");
    Ok(())
}

/// Pass 1: every non-overlapping match of every pattern produces one flag.
/// Overlap between *different* patterns is allowed here; the annotation
/// algorithm resolves it at render time.
pub fn run_pass_1(section_draft_id: &str, content: &str) -> Vec<ComplianceFlag> {
    let mut flags = Vec::new();
    for rule in RULES.iter() {
        for m in rule.pattern.find_iter(content) {
            if let Some((on, after)) = &rule.exception {
                if on.is_match(m.as_str()) && after.is_match(&content[m.end()..]) {
                    continue;
                }
            }
            flags.push(ComplianceFlag {
                id: Uuid::now_v7().to_string(),
                section_draft_id: section_draft_id.to_string(),
                severity: rule.severity,
                flag_type: rule.name.to_string(),
                matched_text: m.as_str().to_string(),
                rule_reference: rule.rule_reference.to_string(),
                explanation: rule.explanation.to_string(),
                recommended_action: rule.recommended_action.to_string(),
                pass_number: 1,
                is_resolved: false,
                resolved_by: None,
                resolved_at: None,
                resolution_note: None,
            });
        }
    }
    flags
}

/// Pass 2: one holistic review call for a section. Lenient on the response:
/// code fences stripped, unparseable or wrongly-shaped JSON means zero
/// flags, unknown severities are dropped with a warning (never defaulted).
async fn run_pass_2(
    provider: &dyn GenerativeProvider,
    system: &str,
    draft: &SectionDraft,
) -> Result<Vec<ComplianceFlag>> {
    let request = GenerationRequest {
        system: Some(system.to_string()),
        prompt: prompts::compliance_user_prompt(&draft.section_name, &draft.content),
        temperature: PASS_2_TEMPERATURE,
    };
    let raw = provider.generate(&request).await?;
    Ok(parse_pass_2_response(&raw, &draft.id, &draft.section_name))
}

/// Parse the holistic-review response into flags.
pub fn parse_pass_2_response(
    raw: &str,
    section_draft_id: &str,
    section_name: &str,
) -> Vec<ComplianceFlag> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let parsed: Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(section = section_name, error = %e, "pass 2 response is not valid JSON");
            return Vec::new();
        }
    };

    let Some(raw_flags) = parsed.get("flags").and_then(Value::as_array) else {
        tracing::warn!(section = section_name, "pass 2 response has no 'flags' list");
        return Vec::new();
    };

    let mut flags = Vec::new();
    for f in raw_flags {
        let severity_str = f.get("severity").and_then(Value::as_str).unwrap_or("");
        let Ok(severity) = severity_str.parse::<Severity>() else {
            tracing::warn!(
                section = section_name,
                severity = severity_str,
                "dropping pass 2 flag with unrecognized severity"
            );
            continue;
        };

        let field = |key: &str, default: &str| {
            f.get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };

        flags.push(ComplianceFlag {
            id: Uuid::now_v7().to_string(),
            section_draft_id: section_draft_id.to_string(),
            severity,
            flag_type: field("flag_type", "general"),
            matched_text: field("matched_text", ""),
            rule_reference: field("rule_reference", ""),
            explanation: field("explanation", ""),
            recommended_action: field("recommended_action", ""),
            pass_number: 2,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
        });
    }
    flags
}
