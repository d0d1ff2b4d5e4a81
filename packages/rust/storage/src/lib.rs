//! libSQL storage layer for the Briefdesk editorial pipeline.
//!
//! The [`Storage`] struct wraps a local libSQL database holding editions,
//! articles, section drafts, compliance flags, and the append-only audit log.
//!
//! **Contract notes:**
//! - Every method is atomic per call; callers must not assume multi-statement
//!   transactions span components.
//! - Edition field updates go through a column whitelist; anything else is a
//!   fatal validation error.
//! - Flags and audit entries are append-only. Flag resolution is a one-way
//!   transition enforced here.
//! - The "can approve" blocking count is always recomputed live, never cached.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, Value, params};
use uuid::Uuid;

use briefdesk_shared::{
    Article, AuditEntry, BriefdeskError, ComplianceFlag, Edition, EditionId, EditionStatus,
    GenerationMode, Result, SectionDraft, Severity,
};

/// Columns of `editions` that [`Storage::update_edition_fields`] may touch.
const ALLOWED_EDITION_COLUMNS: &[&str] = &[
    "status",
    "pipeline_stage",
    "pipeline_progress",
    "approved_by",
    "approved_at",
];

/// Summary of one edition for status polling.
#[derive(Debug, Clone)]
pub struct EditionSummary {
    pub status: EditionStatus,
    pub pipeline_stage: String,
    pub pipeline_progress: u8,
    pub article_count: usize,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BriefdeskError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    BriefdeskError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Edition operations
    // -----------------------------------------------------------------------

    /// Admission-control gate: start a new edition in `generating` status.
    ///
    /// A single authoritative read-before-write — if any edition is already
    /// generating, the request is rejected (not queued) and no row is
    /// created.
    pub async fn try_start_edition(
        &self,
        mode: GenerationMode,
        editorial_brief: Option<&str>,
    ) -> Result<Edition> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM editions WHERE status = 'generating' LIMIT 1",
                params![],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        if let Ok(Some(row)) = rows.next().await {
            let running: String = row.get(0).unwrap_or_default();
            return Err(BriefdeskError::validation(format!(
                "a pipeline is already running (edition {running})"
            )));
        }

        let edition = Edition {
            id: EditionId::new(),
            status: EditionStatus::Generating,
            pipeline_stage: "starting".into(),
            pipeline_progress: 0,
            generation_mode: mode,
            editorial_brief: editorial_brief.map(str::to_string),
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO editions
                 (id, status, pipeline_stage, pipeline_progress, generation_mode, editorial_brief, created_at)
                 VALUES (?1, 'generating', 'starting', 0, ?2, ?3, ?4)",
                params![
                    edition.id.to_string(),
                    mode.as_str(),
                    edition.editorial_brief.as_deref(),
                    edition.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        Ok(edition)
    }

    /// Get an edition by ID.
    pub async fn get_edition(&self, id: &EditionId) -> Result<Option<Edition>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, status, pipeline_stage, pipeline_progress, generation_mode,
                        editorial_brief, approved_by, approved_at, created_at
                 FROM editions WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_edition(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(BriefdeskError::Storage(e.to_string())),
        }
    }

    /// List all editions, newest first.
    pub async fn list_editions(&self) -> Result<Vec<Edition>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, status, pipeline_stage, pipeline_progress, generation_mode,
                        editorial_brief, approved_by, approved_at, created_at
                 FROM editions ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_edition(&row)?);
        }
        Ok(results)
    }

    /// Update whitelisted edition fields.
    ///
    /// Any column outside [`ALLOWED_EDITION_COLUMNS`] rejects the whole call
    /// with a validation error — never silently coerced or partially applied.
    pub async fn update_edition_fields(
        &self,
        id: &EditionId,
        fields: &[(&str, Value)],
    ) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        for (col, _) in fields {
            if !ALLOWED_EDITION_COLUMNS.contains(col) {
                return Err(BriefdeskError::validation(format!(
                    "column '{col}' is not updatable on editions"
                )));
            }
        }

        let set_clause = fields
            .iter()
            .enumerate()
            .map(|(i, (col, _))| format!("{col} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE editions SET {set_clause} WHERE id = ?{}",
            fields.len() + 1
        );

        let mut values: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();
        values.push(Value::from(id.to_string()));

        self.conn
            .execute(&sql, values)
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Set the pipeline stage label and progress in one write.
    pub async fn set_pipeline_position(
        &self,
        id: &EditionId,
        stage: &str,
        progress: u8,
    ) -> Result<()> {
        self.update_edition_fields(
            id,
            &[
                ("pipeline_stage", Value::from(stage.to_string())),
                ("pipeline_progress", Value::from(progress as i64)),
            ],
        )
        .await
    }

    /// Set progress alone, keeping the current stage label.
    pub async fn set_pipeline_progress(&self, id: &EditionId, progress: u8) -> Result<()> {
        self.update_edition_fields(id, &[("pipeline_progress", Value::from(progress as i64))])
            .await
    }

    /// Set the edition status.
    pub async fn set_status(&self, id: &EditionId, status: EditionStatus) -> Result<()> {
        self.update_edition_fields(id, &[("status", Value::from(status.as_str().to_string()))])
            .await
    }

    /// Terminal success transition: hand the edition to human review.
    pub async fn mark_reviewing(&self, id: &EditionId) -> Result<()> {
        self.update_edition_fields(
            id,
            &[
                ("status", Value::from("reviewing".to_string())),
                ("pipeline_stage", Value::from("complete".to_string())),
                ("pipeline_progress", Value::from(100_i64)),
            ],
        )
        .await
    }

    /// Terminal failure transition. Stage and status both read `error` so a
    /// stuck run is visible from either field.
    pub async fn mark_error(&self, id: &EditionId) -> Result<()> {
        self.update_edition_fields(
            id,
            &[
                ("status", Value::from("error".to_string())),
                ("pipeline_stage", Value::from("error".to_string())),
            ],
        )
        .await
    }

    /// Status/stage/progress/article-count summary for polling.
    pub async fn edition_summary(&self, id: &EditionId) -> Result<Option<EditionSummary>> {
        let Some(edition) = self.get_edition(id).await? else {
            return Ok(None);
        };

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM articles WHERE edition_id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let article_count = match rows.next().await {
            Ok(Some(row)) => row.get::<i64>(0).unwrap_or(0) as usize,
            _ => 0,
        };

        Ok(Some(EditionSummary {
            status: edition.status,
            pipeline_stage: edition.pipeline_stage,
            pipeline_progress: edition.pipeline_progress,
            article_count,
        }))
    }

    /// Approve an edition. Guarded server-side: the edition must be in
    /// `reviewing` status and the live unresolved blocking-flag count must be
    /// zero at the moment of the call.
    pub async fn approve_edition(&self, id: &EditionId, approver: &str) -> Result<Edition> {
        let edition = self
            .get_edition(id)
            .await?
            .ok_or_else(|| BriefdeskError::validation(format!("edition {id} not found")))?;

        if edition.status != EditionStatus::Reviewing {
            return Err(BriefdeskError::validation(format!(
                "edition {id} is '{}', only 'reviewing' editions can be approved",
                edition.status.as_str()
            )));
        }

        let blocking = self.count_unresolved_blocking(id).await?;
        if blocking > 0 {
            return Err(BriefdeskError::validation(format!(
                "edition {id} has {blocking} unresolved blocking flag(s)"
            )));
        }

        let now = Utc::now();
        self.update_edition_fields(
            id,
            &[
                ("status", Value::from("approved".to_string())),
                ("approved_by", Value::from(approver.to_string())),
                ("approved_at", Value::from(now.to_rfc3339())),
            ],
        )
        .await?;

        Ok(Edition {
            status: EditionStatus::Approved,
            approved_by: Some(approver.to_string()),
            approved_at: Some(now),
            ..edition
        })
    }

    // -----------------------------------------------------------------------
    // Article operations
    // -----------------------------------------------------------------------

    /// Insert a batch of retrieved articles.
    pub async fn insert_articles(&self, articles: &[Article]) -> Result<usize> {
        for a in articles {
            self.conn
                .execute(
                    "INSERT INTO articles
                     (id, edition_id, title, url, source, source_tier, relevance_category,
                      quality_score, is_paywalled, is_duplicate, link_valid, raw_snippet, retrieved_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        a.id.as_str(),
                        a.edition_id.to_string(),
                        a.title.as_str(),
                        a.url.as_deref(),
                        a.source.as_str(),
                        a.source_tier as i64,
                        a.relevance_category.as_str(),
                        a.quality_score,
                        a.is_paywalled as i64,
                        a.is_duplicate as i64,
                        a.link_valid as i64,
                        a.raw_snippet.as_str(),
                        a.retrieved_at.to_rfc3339(),
                    ],
                )
                .await
                .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
        }
        Ok(articles.len())
    }

    /// All articles belonging to an edition.
    pub async fn articles_for_edition(&self, id: &EditionId) -> Result<Vec<Article>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, edition_id, title, url, source, source_tier, relevance_category,
                        quality_score, is_paywalled, is_duplicate, link_valid, raw_snippet, retrieved_at
                 FROM articles WHERE edition_id = ?1 ORDER BY source, quality_score DESC",
                params![id.to_string()],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_article(&row)?);
        }
        Ok(results)
    }

    /// Persist verification results for a batch of articles in one pass.
    /// Only the fields verification owns are written back.
    pub async fn save_verification_results(&self, articles: &[Article]) -> Result<()> {
        for a in articles {
            self.conn
                .execute(
                    "UPDATE articles
                     SET source_tier = ?1, quality_score = ?2, is_paywalled = ?3,
                         is_duplicate = ?4, link_valid = ?5
                     WHERE id = ?6",
                    params![
                        a.source_tier as i64,
                        a.quality_score,
                        a.is_paywalled as i64,
                        a.is_duplicate as i64,
                        a.link_valid as i64,
                        a.id.as_str(),
                    ],
                )
                .await
                .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// Distinct relevance categories among live (non-duplicate) articles.
    pub async fn live_article_categories(&self, id: &EditionId) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT relevance_category FROM articles
                 WHERE edition_id = ?1 AND is_duplicate = 0",
                params![id.to_string()],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(cat) = row.get::<String>(0) {
                results.push(cat);
            }
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Section draft operations
    // -----------------------------------------------------------------------

    /// Insert a section draft. Sections are created exactly once per
    /// section per edition and never updated.
    pub async fn insert_section(&self, section: &SectionDraft) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO section_drafts
                 (id, edition_id, section_name, content, word_count, model_used, generated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    section.id.as_str(),
                    section.edition_id.to_string(),
                    section.section_name.as_str(),
                    section.content.as_str(),
                    section.word_count as i64,
                    section.model_used.as_str(),
                    section.generated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All section drafts for an edition, in creation order.
    pub async fn sections_for_edition(&self, id: &EditionId) -> Result<Vec<SectionDraft>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, edition_id, section_name, content, word_count, model_used, generated_at
                 FROM section_drafts WHERE edition_id = ?1 ORDER BY generated_at, id",
                params![id.to_string()],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_section(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Compliance flag operations
    // -----------------------------------------------------------------------

    /// Append a batch of compliance flags. Flags are never rewritten;
    /// re-running a scan appends.
    pub async fn insert_flags(&self, flags: &[ComplianceFlag]) -> Result<usize> {
        for f in flags {
            self.conn
                .execute(
                    "INSERT INTO compliance_flags
                     (id, section_draft_id, severity, flag_type, matched_text, rule_reference,
                      explanation, recommended_action, pass_number, is_resolved)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
                    params![
                        f.id.as_str(),
                        f.section_draft_id.as_str(),
                        f.severity.as_str(),
                        f.flag_type.as_str(),
                        f.matched_text.as_str(),
                        f.rule_reference.as_str(),
                        f.explanation.as_str(),
                        f.recommended_action.as_str(),
                        f.pass_number as i64,
                    ],
                )
                .await
                .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
        }
        Ok(flags.len())
    }

    /// All flags attached to any section of an edition.
    pub async fn flags_for_edition(&self, id: &EditionId) -> Result<Vec<ComplianceFlag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT cf.id, cf.section_draft_id, cf.severity, cf.flag_type, cf.matched_text,
                        cf.rule_reference, cf.explanation, cf.recommended_action, cf.pass_number,
                        cf.is_resolved, cf.resolved_by, cf.resolved_at, cf.resolution_note
                 FROM compliance_flags cf
                 JOIN section_drafts sd ON cf.section_draft_id = sd.id
                 WHERE sd.edition_id = ?1
                 ORDER BY cf.id",
                params![id.to_string()],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_flag(&row)?);
        }
        Ok(results)
    }

    /// Resolve a flag: a one-way transition. Resolving an already-resolved
    /// flag is a validation error (flags never un-resolve).
    pub async fn resolve_flag(
        &self,
        flag_id: &str,
        resolver: &str,
        note: &str,
    ) -> Result<ComplianceFlag> {
        let mut rows = self
            .conn
            .query(
                "SELECT is_resolved FROM compliance_flags WHERE id = ?1",
                params![flag_id],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let resolved: i64 = row.get(0).unwrap_or(0);
                if resolved != 0 {
                    return Err(BriefdeskError::validation(format!(
                        "flag {flag_id} is already resolved"
                    )));
                }
            }
            Ok(None) => {
                return Err(BriefdeskError::validation(format!(
                    "flag {flag_id} not found"
                )));
            }
            Err(e) => return Err(BriefdeskError::Storage(e.to_string())),
        }

        self.conn
            .execute(
                "UPDATE compliance_flags
                 SET is_resolved = 1, resolved_by = ?1, resolved_at = ?2, resolution_note = ?3
                 WHERE id = ?4",
                params![resolver, Utc::now().to_rfc3339(), note, flag_id],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let mut rows = self
            .conn
            .query(
                "SELECT id, section_draft_id, severity, flag_type, matched_text, rule_reference,
                        explanation, recommended_action, pass_number, is_resolved, resolved_by,
                        resolved_at, resolution_note
                 FROM compliance_flags WHERE id = ?1",
                params![flag_id],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_flag(&row),
            _ => Err(BriefdeskError::Storage(format!(
                "flag {flag_id} disappeared after resolve"
            ))),
        }
    }

    /// Live count of unresolved flags with blocking severity for an edition.
    /// Recomputed on every call; never cached.
    pub async fn count_unresolved_blocking(&self, id: &EditionId) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM compliance_flags cf
                 JOIN section_drafts sd ON cf.section_draft_id = sd.id
                 WHERE sd.edition_id = ?1 AND cf.is_resolved = 0
                   AND cf.severity IN ('BLOCK', 'MANDATORY_REVIEW')",
                params![id.to_string()],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(BriefdeskError::Storage(e.to_string())),
        }
    }

    /// Which edition a flag belongs to, via its section draft.
    pub async fn edition_for_flag(&self, flag_id: &str) -> Result<Option<EditionId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT sd.edition_id FROM section_drafts sd
                 JOIN compliance_flags cf ON cf.section_draft_id = sd.id
                 WHERE cf.id = ?1",
                params![flag_id],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
                let id = raw
                    .parse()
                    .map_err(|e| BriefdeskError::Storage(format!("invalid edition id: {e}")))?;
                Ok(Some(id))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(BriefdeskError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    /// Append an audit entry. Audit writes are never updated or deleted.
    pub async fn append_audit(
        &self,
        edition_id: &EditionId,
        actor: &str,
        action: &str,
        details: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO audit_log (id, edition_id, actor, action, details, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::now_v7().to_string(),
                    edition_id.to_string(),
                    actor,
                    action,
                    details,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All audit entries for an edition, oldest first.
    pub async fn audit_for_edition(&self, id: &EditionId) -> Result<Vec<AuditEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, edition_id, actor, action, details, created_at
                 FROM audit_log WHERE edition_id = ?1 ORDER BY created_at, id",
                params![id.to_string()],
            )
            .await
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_audit(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BriefdeskError::Storage(format!("invalid timestamp '{raw}': {e}")))
}

fn row_to_edition(row: &libsql::Row) -> Result<Edition> {
    let id: String = row
        .get(0)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
    let status: String = row
        .get(1)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
    let mode: String = row
        .get(4)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
    let created_at: String = row
        .get(8)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

    Ok(Edition {
        id: id
            .parse()
            .map_err(|e| BriefdeskError::Storage(format!("invalid edition id: {e}")))?,
        status: status.parse().map_err(BriefdeskError::Storage)?,
        pipeline_stage: row
            .get(2)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        pipeline_progress: row.get::<i64>(3).unwrap_or(0) as u8,
        generation_mode: mode.parse().map_err(BriefdeskError::Storage)?,
        editorial_brief: row.get::<String>(5).ok(),
        approved_by: row.get::<String>(6).ok(),
        approved_at: row
            .get::<String>(7)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_article(row: &libsql::Row) -> Result<Article> {
    let edition_id: String = row
        .get(1)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
    let retrieved_at: String = row
        .get(12)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

    Ok(Article {
        id: row
            .get(0)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        edition_id: edition_id
            .parse()
            .map_err(|e| BriefdeskError::Storage(format!("invalid edition id: {e}")))?,
        title: row
            .get(2)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        url: row.get::<String>(3).ok(),
        source: row
            .get(4)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        source_tier: row.get::<i64>(5).unwrap_or(3) as u8,
        relevance_category: row
            .get(6)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        quality_score: row.get::<f64>(7).unwrap_or(0.0),
        is_paywalled: row.get::<i64>(8).unwrap_or(0) != 0,
        is_duplicate: row.get::<i64>(9).unwrap_or(0) != 0,
        link_valid: row.get::<i64>(10).unwrap_or(1) != 0,
        raw_snippet: row.get::<String>(11).unwrap_or_default(),
        retrieved_at: parse_timestamp(&retrieved_at)?,
    })
}

fn row_to_section(row: &libsql::Row) -> Result<SectionDraft> {
    let edition_id: String = row
        .get(1)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
    let generated_at: String = row
        .get(6)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

    Ok(SectionDraft {
        id: row
            .get(0)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        edition_id: edition_id
            .parse()
            .map_err(|e| BriefdeskError::Storage(format!("invalid edition id: {e}")))?,
        section_name: row
            .get(2)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        content: row
            .get(3)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        word_count: row.get::<i64>(4).unwrap_or(0) as usize,
        model_used: row
            .get(5)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        generated_at: parse_timestamp(&generated_at)?,
    })
}

fn row_to_flag(row: &libsql::Row) -> Result<ComplianceFlag> {
    let severity: String = row
        .get(2)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

    Ok(ComplianceFlag {
        id: row
            .get(0)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        section_draft_id: row
            .get(1)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        severity: severity
            .parse::<Severity>()
            .map_err(BriefdeskError::Storage)?,
        flag_type: row
            .get(3)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        matched_text: row
            .get(4)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        rule_reference: row
            .get(5)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        explanation: row
            .get(6)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        recommended_action: row
            .get(7)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        pass_number: row.get::<i64>(8).unwrap_or(1) as u8,
        is_resolved: row.get::<i64>(9).unwrap_or(0) != 0,
        resolved_by: row.get::<String>(10).ok(),
        resolved_at: row
            .get::<String>(11)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        resolution_note: row.get::<String>(12).ok(),
    })
}

fn row_to_audit(row: &libsql::Row) -> Result<AuditEntry> {
    let edition_id: String = row
        .get(1)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;
    let created_at: String = row
        .get(5)
        .map_err(|e| BriefdeskError::Storage(e.to_string()))?;

    Ok(AuditEntry {
        id: row
            .get(0)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        edition_id: edition_id
            .parse()
            .map_err(|e| BriefdeskError::Storage(format!("invalid edition id: {e}")))?,
        actor: row
            .get(2)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        action: row
            .get(3)
            .map_err(|e| BriefdeskError::Storage(e.to_string()))?,
        details: row.get::<String>(4).ok(),
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("bd_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn sample_article(edition_id: &EditionId, title: &str) -> Article {
        Article {
            id: Uuid::now_v7().to_string(),
            edition_id: edition_id.clone(),
            title: title.into(),
            url: Some("https://example.com/story".into()),
            source: "search".into(),
            source_tier: 3,
            relevance_category: "macro".into(),
            quality_score: 0.0,
            is_paywalled: false,
            is_duplicate: false,
            link_valid: true,
            raw_snippet: "snippet".into(),
            retrieved_at: Utc::now(),
        }
    }

    fn sample_flag(section_id: &str, severity: Severity) -> ComplianceFlag {
        ComplianceFlag {
            id: Uuid::now_v7().to_string(),
            section_draft_id: section_id.into(),
            severity,
            flag_type: "guarantee_language".into(),
            matched_text: "guaranteed".into(),
            rule_reference: "2210(d)(1)(B)".into(),
            explanation: "Guarantee language is prohibited.".into(),
            recommended_action: "Remove guarantee language.".into(),
            pass_number: 1,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
        }
    }

    async fn reviewing_edition_with_section(storage: &Storage) -> (EditionId, String) {
        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();
        storage
            .update_edition_fields(&edition.id, &[("status", Value::from("reviewing".to_string()))])
            .await
            .unwrap();

        let section = SectionDraft {
            id: Uuid::now_v7().to_string(),
            edition_id: edition.id.clone(),
            section_name: "market_pulse".into(),
            content: "Calm markets this week.".into(),
            word_count: 4,
            model_used: "test".into(),
            generated_at: Utc::now(),
        };
        storage.insert_section(&section).await.unwrap();
        (edition.id, section.id)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("bd_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.schema_version().await, 1);
    }

    #[tokio::test]
    async fn admission_gate_rejects_second_run() {
        let storage = test_storage().await;

        let first = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .expect("first run starts");
        assert_eq!(first.status, EditionStatus::Generating);

        let second = storage
            .try_start_edition(GenerationMode::Guided, Some("focus on rates"))
            .await;
        assert!(second.is_err());
        assert!(second.unwrap_err().to_string().contains("already running"));

        // Exactly one generating edition exists
        let editions = storage.list_editions().await.unwrap();
        let generating = editions
            .iter()
            .filter(|e| e.status == EditionStatus::Generating)
            .count();
        assert_eq!(generating, 1);
    }

    #[tokio::test]
    async fn admission_gate_reopens_after_completion() {
        let storage = test_storage().await;
        let first = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();
        storage
            .update_edition_fields(&first.id, &[("status", Value::from("reviewing".to_string()))])
            .await
            .unwrap();

        storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .expect("gate reopens once nothing is generating");
    }

    #[tokio::test]
    async fn update_rejects_non_whitelisted_column() {
        let storage = test_storage().await;
        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();

        let result = storage
            .update_edition_fields(
                &edition.id,
                &[("editorial_brief", Value::from("sneaky".to_string()))],
            )
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not updatable"));
    }

    #[tokio::test]
    async fn article_roundtrip_and_verification_save() {
        let storage = test_storage().await;
        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();

        let mut a = sample_article(&edition.id, "Rates hold steady");
        storage.insert_articles(std::slice::from_ref(&a)).await.unwrap();

        a.source_tier = 1;
        a.quality_score = 0.8;
        a.is_paywalled = true;
        storage.save_verification_results(&[a.clone()]).await.unwrap();

        let stored = storage.articles_for_edition(&edition.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].source_tier, 1);
        assert_eq!(stored[0].quality_score, 0.8);
        assert!(stored[0].is_paywalled);
        assert!(!stored[0].is_duplicate);
    }

    #[tokio::test]
    async fn flag_resolution_is_one_way() {
        let storage = test_storage().await;
        let (_edition_id, section_id) = reviewing_edition_with_section(&storage).await;

        let flag = sample_flag(&section_id, Severity::Block);
        storage.insert_flags(std::slice::from_ref(&flag)).await.unwrap();

        let resolved = storage
            .resolve_flag(&flag.id, "reviewer", "rewrote the sentence")
            .await
            .expect("first resolve succeeds");
        assert!(resolved.is_resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("reviewer"));

        let again = storage.resolve_flag(&flag.id, "reviewer", "again").await;
        assert!(again.is_err());
        assert!(again.unwrap_err().to_string().contains("already resolved"));
    }

    #[tokio::test]
    async fn blocking_count_is_live() {
        let storage = test_storage().await;
        let (edition_id, section_id) = reviewing_edition_with_section(&storage).await;

        let block = sample_flag(&section_id, Severity::Block);
        let warning = sample_flag(&section_id, Severity::Warning);
        storage
            .insert_flags(&[block.clone(), warning])
            .await
            .unwrap();

        assert_eq!(storage.count_unresolved_blocking(&edition_id).await.unwrap(), 1);

        storage
            .resolve_flag(&block.id, "reviewer", "fixed")
            .await
            .unwrap();
        assert_eq!(storage.count_unresolved_blocking(&edition_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn approval_gated_on_blocking_flags() {
        let storage = test_storage().await;
        let (edition_id, section_id) = reviewing_edition_with_section(&storage).await;

        let flag = sample_flag(&section_id, Severity::MandatoryReview);
        storage.insert_flags(std::slice::from_ref(&flag)).await.unwrap();

        let rejected = storage.approve_edition(&edition_id, "editor").await;
        assert!(rejected.is_err());
        assert!(rejected.unwrap_err().to_string().contains("blocking"));

        // Resolving the flag immediately unlocks approval, no restart needed
        storage.resolve_flag(&flag.id, "editor", "verified").await.unwrap();
        let approved = storage
            .approve_edition(&edition_id, "editor")
            .await
            .expect("approval after resolution");
        assert_eq!(approved.status, EditionStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("editor"));
    }

    #[tokio::test]
    async fn approval_requires_reviewing_status() {
        let storage = test_storage().await;
        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();

        let result = storage.approve_edition(&edition.id, "editor").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("reviewing"));
    }

    #[tokio::test]
    async fn audit_appends_in_order() {
        let storage = test_storage().await;
        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();

        storage
            .append_audit(&edition.id, "system", "pipeline_started", None)
            .await
            .unwrap();
        storage
            .append_audit(
                &edition.id,
                "system",
                "retrieval_completed",
                Some(r#"{"article_count": 12}"#),
            )
            .await
            .unwrap();

        let entries = storage.audit_for_edition(&edition.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "pipeline_started");
        assert_eq!(entries[1].action, "retrieval_completed");
        assert!(entries[1].details.as_deref().unwrap().contains("12"));
    }

    #[tokio::test]
    async fn edition_summary_counts_articles() {
        let storage = test_storage().await;
        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();

        let articles = vec![
            sample_article(&edition.id, "one"),
            sample_article(&edition.id, "two"),
        ];
        storage.insert_articles(&articles).await.unwrap();

        let summary = storage
            .edition_summary(&edition.id)
            .await
            .unwrap()
            .expect("summary exists");
        assert_eq!(summary.article_count, 2);
        assert_eq!(summary.status, EditionStatus::Generating);
        assert_eq!(summary.pipeline_stage, "starting");
    }
}
