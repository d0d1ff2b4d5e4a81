//! Core domain types for the Briefdesk editorial pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EditionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for edition identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditionId(pub Uuid);

impl EditionId {
    /// Generate a new time-sortable edition identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EditionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EditionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EditionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Edition
// ---------------------------------------------------------------------------

/// Lifecycle status of an edition.
///
/// At most one edition may be `Generating` at any time — the admission gate
/// in storage enforces this. `Approved` is reachable only from `Reviewing`
/// and only with zero unresolved blocking flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditionStatus {
    Draft,
    Generating,
    Reviewing,
    Approved,
    Error,
}

impl EditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Generating => "generating",
            Self::Reviewing => "reviewing",
            Self::Approved => "approved",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for EditionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "generating" => Ok(Self::Generating),
            "reviewing" => Ok(Self::Reviewing),
            "approved" => Ok(Self::Approved),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown edition status '{other}'")),
        }
    }
}

/// How an edition run is steered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Fully automatic topic selection.
    Auto,
    /// An editorial brief steers section drafting.
    Guided,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Guided => "guided",
        }
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "guided" => Ok(Self::Guided),
            other => Err(format!("unknown generation mode '{other}'")),
        }
    }
}

/// One unit of newsletter production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edition {
    pub id: EditionId,
    pub status: EditionStatus,
    /// Free-form stage label written before each stage executes.
    pub pipeline_stage: String,
    /// 0–100, monotonically non-decreasing across a run.
    pub pipeline_progress: u8,
    pub generation_mode: GenerationMode,
    /// Guided-mode steering text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editorial_brief: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// One retrieved candidate source record, owned by exactly one edition.
///
/// Tier, paywall/duplicate flags and the quality score are finalized exactly
/// once by the verification engine and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub edition_id: EditionId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Provider name: "newswire", "search", "filings", "econdata".
    pub source: String,
    /// 1 = authoritative, 3 = unclassified.
    pub source_tier: u8,
    pub relevance_category: String,
    pub quality_score: f64,
    pub is_paywalled: bool,
    pub is_duplicate: bool,
    /// Set during link validation; articles without URLs are assumed valid.
    pub link_valid: bool,
    pub raw_snippet: String,
    pub retrieved_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SectionDraft
// ---------------------------------------------------------------------------

/// One generated newsletter section. Immutable after creation; compliance
/// flags reference it, they do not mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDraft {
    pub id: String,
    pub edition_id: EditionId,
    pub section_name: String,
    pub content: String,
    pub word_count: usize,
    pub model_used: String,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ComplianceFlag
// ---------------------------------------------------------------------------

/// Severity of a compliance flag, ordered by blocking power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Block,
    MandatoryReview,
    Warning,
    AddDisclaimer,
}

impl Severity {
    /// Blocking severities prevent edition approval until resolved.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Block | Self::MandatoryReview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "BLOCK",
            Self::MandatoryReview => "MANDATORY_REVIEW",
            Self::Warning => "WARNING",
            Self::AddDisclaimer => "ADD_DISCLAIMER",
        }
    }

    /// CSS class fragment for highlight markup ("block", "mandatory-review", ...).
    pub fn css_class(&self) -> String {
        self.as_str().to_lowercase().replace('_', "-")
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    /// Strict: an unrecognized severity is an error, never defaulted.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "BLOCK" => Ok(Self::Block),
            "MANDATORY_REVIEW" => Ok(Self::MandatoryReview),
            "WARNING" => Ok(Self::Warning),
            "ADD_DISCLAIMER" => Ok(Self::AddDisclaimer),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// One compliance concern located within a section draft.
///
/// Immutable except for the resolution fields, which transition exactly once
/// from unresolved to resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceFlag {
    pub id: String,
    pub section_draft_id: String,
    pub severity: Severity,
    pub flag_type: String,
    /// Verbatim excerpt from the section content.
    pub matched_text: String,
    pub rule_reference: String,
    pub explanation: String,
    pub recommended_action: String,
    /// 1 = deterministic pattern scan, 2 = generative holistic review.
    pub pass_number: u8,
    pub is_resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// Append-only record of actor, action, and optional structured detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub edition_id: EditionId,
    pub actor: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edition_id_roundtrip() {
        let id = EditionId::new();
        let s = id.to_string();
        let parsed: EditionId = s.parse().expect("parse EditionId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            EditionStatus::Draft,
            EditionStatus::Generating,
            EditionStatus::Reviewing,
            EditionStatus::Approved,
            EditionStatus::Error,
        ] {
            let parsed: EditionStatus = status.as_str().parse().expect("parse status");
            assert_eq!(parsed, status);
        }
        assert!("finished".parse::<EditionStatus>().is_err());
    }

    #[test]
    fn severity_ordering_and_blocking() {
        assert!(Severity::Block < Severity::MandatoryReview);
        assert!(Severity::MandatoryReview < Severity::Warning);
        assert!(Severity::Block.is_blocking());
        assert!(Severity::MandatoryReview.is_blocking());
        assert!(!Severity::Warning.is_blocking());
        assert!(!Severity::AddDisclaimer.is_blocking());
    }

    #[test]
    fn severity_rejects_unknown() {
        assert!("CRITICAL".parse::<Severity>().is_err());
        assert!("block".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_css_class() {
        assert_eq!(Severity::MandatoryReview.css_class(), "mandatory-review");
        assert_eq!(Severity::Block.css_class(), "block");
    }
}
