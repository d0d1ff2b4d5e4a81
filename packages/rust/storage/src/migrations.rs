//! SQL migration definitions for the Briefdesk database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: editions, articles, section_drafts, compliance_flags, audit_log",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One newsletter edition per pipeline run
CREATE TABLE IF NOT EXISTS editions (
    id                TEXT PRIMARY KEY,
    status            TEXT NOT NULL,
    pipeline_stage    TEXT NOT NULL,
    pipeline_progress INTEGER NOT NULL DEFAULT 0,
    generation_mode   TEXT NOT NULL,
    editorial_brief   TEXT,
    approved_by       TEXT,
    approved_at       TEXT,
    created_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_editions_status ON editions(status);

-- Retrieved candidate source records
CREATE TABLE IF NOT EXISTS articles (
    id                 TEXT PRIMARY KEY,
    edition_id         TEXT NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    title              TEXT NOT NULL,
    url                TEXT,
    source             TEXT NOT NULL,
    source_tier        INTEGER NOT NULL DEFAULT 3,
    relevance_category TEXT NOT NULL,
    quality_score      REAL NOT NULL DEFAULT 0,
    is_paywalled       INTEGER NOT NULL DEFAULT 0,
    is_duplicate       INTEGER NOT NULL DEFAULT 0,
    link_valid         INTEGER NOT NULL DEFAULT 1,
    raw_snippet        TEXT NOT NULL DEFAULT '',
    retrieved_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_edition ON articles(edition_id);

-- Generated newsletter sections
CREATE TABLE IF NOT EXISTS section_drafts (
    id           TEXT PRIMARY KEY,
    edition_id   TEXT NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    section_name TEXT NOT NULL,
    content      TEXT NOT NULL,
    word_count   INTEGER NOT NULL,
    model_used   TEXT NOT NULL,
    generated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sections_edition ON section_drafts(edition_id);

-- Compliance flags, append-only except for one-way resolution
CREATE TABLE IF NOT EXISTS compliance_flags (
    id                 TEXT PRIMARY KEY,
    section_draft_id   TEXT NOT NULL REFERENCES section_drafts(id) ON DELETE CASCADE,
    severity           TEXT NOT NULL,
    flag_type          TEXT NOT NULL,
    matched_text       TEXT NOT NULL,
    rule_reference     TEXT NOT NULL,
    explanation        TEXT NOT NULL,
    recommended_action TEXT NOT NULL,
    pass_number        INTEGER NOT NULL,
    is_resolved        INTEGER NOT NULL DEFAULT 0,
    resolved_by        TEXT,
    resolved_at        TEXT,
    resolution_note    TEXT
);

CREATE INDEX IF NOT EXISTS idx_flags_section ON compliance_flags(section_draft_id);

-- Append-only audit trail, never updated or deleted
CREATE TABLE IF NOT EXISTS audit_log (
    id         TEXT PRIMARY KEY,
    edition_id TEXT NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    actor      TEXT NOT NULL,
    action     TEXT NOT NULL,
    details    TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_edition ON audit_log(edition_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
