//! Pipeline orchestrator.
//!
//! Drives one edition through retrieval, verification, drafting, compliance,
//! and handoff to review. Stage and progress are written *before* each stage
//! executes so an interrupted run shows where it stopped; an audit entry is
//! appended after each completed stage. Any uncaught stage failure — or an
//! operator cancellation observed at a stage boundary — forces the edition
//! into `error` status with a best-effort final audit write.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use briefdesk_llm::GenerativeProvider;
use briefdesk_shared::{Article, BriefdeskError, Edition, Result};
use briefdesk_sources::SourceSet;
use briefdesk_storage::Storage;

use crate::{compliance, drafting, verification};

/// Operator-initiated cancellation signal, observed at stage boundaries.
///
/// Cloned freely; any clone can cancel. Cancellation is one-way.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { inner: Arc::new(tx) }
    }

    /// Request cancellation. The pipeline aborts at the next stage boundary.
    pub fn cancel(&self) {
        let _ = self.inner.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.borrow()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer for stage transitions, implemented by the CLI spinner.
pub trait ProgressObserver: Send + Sync {
    fn stage_started(&self, stage: &str, progress: u8);
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn stage_started(&self, _stage: &str, _progress: u8) {}
}

/// One pipeline run over a started edition.
pub struct Pipeline<'a> {
    storage: &'a Storage,
    sources: &'a SourceSet,
    provider: Option<&'a dyn GenerativeProvider>,
    observer: &'a dyn ProgressObserver,
    cancel: CancelToken,
    actor: String,
    /// Inter-call delay for drafting and compliance pass 2.
    call_delay: Duration,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        storage: &'a Storage,
        sources: &'a SourceSet,
        provider: Option<&'a dyn GenerativeProvider>,
    ) -> Self {
        Self {
            storage,
            sources,
            provider,
            observer: &SilentObserver,
            cancel: CancelToken::new(),
            actor: "system".into(),
            call_delay: drafting::DRAFT_DELAY,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Shorten the sequential-call delay (tests).
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Run all stages for `edition`. On any failure the edition is forced
    /// into `error` status; a failure of that second write is logged and
    /// swallowed so the original error always surfaces.
    pub async fn run(&self, edition: &Edition) -> Result<()> {
        match self.run_stages(edition).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(edition_id = %edition.id, error = %e, "pipeline failed");
                let action = if matches!(e, BriefdeskError::Cancelled) {
                    "pipeline_cancelled"
                } else {
                    "pipeline_failed"
                };
                if let Err(write_err) = self.storage.mark_error(&edition.id).await {
                    tracing::error!(
                        edition_id = %edition.id,
                        error = %write_err,
                        "failed to record error status"
                    );
                } else if let Err(audit_err) = self
                    .storage
                    .append_audit(&edition.id, &self.actor, action, None)
                    .await
                {
                    tracing::error!(
                        edition_id = %edition.id,
                        error = %audit_err,
                        "failed to record failure audit entry"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&self, edition: &Edition) -> Result<()> {
        let id = &edition.id;
        let brief = edition.editorial_brief.as_deref();

        // Retrieval
        self.enter_stage(edition, "retrieval", 10).await?;
        self.storage
            .append_audit(id, &self.actor, "pipeline_started", None)
            .await?;
        let candidates = self.sources.fetch_all().await;
        let articles = to_articles(edition, candidates);
        let article_count = if articles.is_empty() {
            tracing::warn!(edition_id = %id, "no articles retrieved from any source");
            0
        } else {
            self.storage.insert_articles(&articles).await?
        };
        self.storage
            .append_audit(
                id,
                &self.actor,
                "retrieval_completed",
                Some(&serde_json::json!({ "article_count": article_count }).to_string()),
            )
            .await?;

        // Verification
        self.enter_stage(edition, "verification", 30).await?;
        verification::run_verification(self.storage, id).await?;
        self.storage
            .append_audit(id, &self.actor, "verification_completed", None)
            .await?;
        self.storage.set_pipeline_progress(id, 50).await?;

        // Drafting
        self.enter_stage(edition, "drafting", 55).await?;
        drafting::run_drafting(self.storage, self.provider, id, brief, self.call_delay).await?;
        self.storage
            .append_audit(id, &self.actor, "drafting_completed", None)
            .await?;
        self.storage.set_pipeline_progress(id, 70).await?;

        // Compliance
        self.enter_stage(edition, "compliance", 70).await?;
        compliance::run_compliance(self.storage, self.provider, id, self.call_delay).await?;
        self.storage
            .append_audit(id, &self.actor, "compliance_completed", None)
            .await?;
        self.storage.set_pipeline_progress(id, 90).await?;

        // Ready for review
        self.enter_stage(edition, "review", 90).await?;
        self.storage
            .append_audit(id, &self.actor, "ready_for_review", None)
            .await?;

        // Complete: hand to human review
        self.check_cancelled()?;
        self.observer.stage_started("complete", 100);
        self.storage.mark_reviewing(id).await?;
        self.storage
            .append_audit(id, &self.actor, "pipeline_completed", None)
            .await?;
        tracing::info!(edition_id = %id, "pipeline completed");
        Ok(())
    }

    /// Stage boundary: observe cancellation, then record the stage before
    /// it executes.
    async fn enter_stage(&self, edition: &Edition, stage: &str, progress: u8) -> Result<()> {
        self.check_cancelled()?;
        self.observer.stage_started(stage, progress);
        self.storage
            .set_pipeline_position(&edition.id, stage, progress)
            .await
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BriefdeskError::Cancelled);
        }
        Ok(())
    }
}

/// Attach retrieved candidates to an edition as article rows.
fn to_articles(edition: &Edition, candidates: Vec<briefdesk_sources::Candidate>) -> Vec<Article> {
    let now = Utc::now();
    candidates
        .into_iter()
        .map(|c| Article {
            id: Uuid::now_v7().to_string(),
            edition_id: edition.id.clone(),
            title: c.title,
            url: c.url,
            source: c.source,
            source_tier: c.source_tier,
            relevance_category: c.relevance_category,
            quality_score: 0.0,
            is_paywalled: false,
            is_duplicate: false,
            link_valid: true,
            raw_snippet: c.raw_snippet,
            retrieved_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use briefdesk_shared::{EditionStatus, GenerationMode};
    use briefdesk_sources::FilingsProvider;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingObserver(Mutex<Vec<(String, u8)>>);

    impl ProgressObserver for RecordingObserver {
        fn stage_started(&self, stage: &str, progress: u8) {
            self.0
                .lock()
                .expect("observer lock")
                .push((stage.to_string(), progress));
        }
    }

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("bd_pipe_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    /// Source set backed by a single filings mock; other providers absent.
    async fn mock_sources() -> (MockServer, SourceSet) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "filings": [
                    {"entity_name": "Harbor Property Trust", "form_type": "8-K",
                     "file_date": "2026-08-15"}
                ]
            })))
            .mount(&server)
            .await;
        let sources = SourceSet::from_providers(
            None,
            None,
            FilingsProvider::new(server.uri(), "Briefdesk/0.1 (test)"),
            None,
        );
        (server, sources)
    }

    #[tokio::test]
    async fn full_run_hands_edition_to_review() {
        let storage = test_storage().await;
        let (_server, sources) = mock_sources().await;
        let provider =
            MockProvider::returning("Calm prose. We expect nothing surprising here though.");
        let observer = RecordingObserver(Mutex::new(Vec::new()));

        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();

        Pipeline::new(&storage, &sources, Some(&provider))
            .with_observer(&observer)
            .with_call_delay(Duration::from_millis(1))
            .run(&edition)
            .await
            .expect("pipeline succeeds");

        let finished = storage.get_edition(&edition.id).await.unwrap().unwrap();
        assert_eq!(finished.status, EditionStatus::Reviewing);
        assert_eq!(finished.pipeline_stage, "complete");
        assert_eq!(finished.pipeline_progress, 100);

        // One filings article retrieved and verified
        let articles = storage.articles_for_edition(&edition.id).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source_tier, 1);
        assert!(articles[0].quality_score > 0.0);

        // All sections drafted; forward-looking language flagged in pass 1
        let sections = storage.sections_for_edition(&edition.id).await.unwrap();
        assert_eq!(sections.len(), drafting::SECTION_ORDER.len());
        let flags = storage.flags_for_edition(&edition.id).await.unwrap();
        assert!(flags.iter().any(|f| f.flag_type == "forward_looking"));

        // Audit trail covers every stage in order
        let actions: Vec<String> = storage
            .audit_for_edition(&edition.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                "pipeline_started",
                "retrieval_completed",
                "verification_completed",
                "drafting_completed",
                "compliance_completed",
                "ready_for_review",
                "pipeline_completed",
            ]
        );

        // Observer saw stages with monotonically non-decreasing progress
        let seen = observer.0.lock().unwrap().clone();
        assert_eq!(seen.first().unwrap().0, "retrieval");
        assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[tokio::test]
    async fn empty_retrieval_still_completes() {
        let storage = test_storage().await;
        // Filings endpoint returns an unrecognized envelope; every provider
        // contributes nothing. The pipeline degrades, it does not fail.
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"surprise": true})),
            )
            .mount(&server)
            .await;
        let sources = SourceSet::from_providers(
            None,
            None,
            FilingsProvider::new(server.uri(), "Briefdesk/0.1 (test)"),
            None,
        );
        let provider = MockProvider::returning("text");

        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();

        Pipeline::new(&storage, &sources, Some(&provider))
            .with_call_delay(Duration::from_millis(1))
            .run(&edition)
            .await
            .expect("empty retrieval is not a failure");

        let finished = storage.get_edition(&edition.id).await.unwrap().unwrap();
        assert_eq!(finished.status, EditionStatus::Reviewing);
        assert!(
            storage
                .articles_for_edition(&edition.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn cancellation_observed_at_stage_boundary() {
        let storage = test_storage().await;
        let (_server, sources) = mock_sources().await;
        let provider = MockProvider::returning("text");

        let edition = storage
            .try_start_edition(GenerationMode::Auto, None)
            .await
            .unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();

        let result = Pipeline::new(&storage, &sources, Some(&provider))
            .with_cancel_token(cancel)
            .with_call_delay(Duration::from_millis(1))
            .run(&edition)
            .await;
        assert!(matches!(result, Err(BriefdeskError::Cancelled)));

        let aborted = storage.get_edition(&edition.id).await.unwrap().unwrap();
        assert_eq!(aborted.status, EditionStatus::Error);
        assert_eq!(aborted.pipeline_stage, "error");

        let actions: Vec<String> = storage
            .audit_for_edition(&edition.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["pipeline_cancelled"]);
    }

    #[tokio::test]
    async fn guided_mode_brief_reaches_drafting() {
        let storage = test_storage().await;
        let (_server, sources) = mock_sources().await;
        let provider = MockProvider::returning("text");

        let edition = storage
            .try_start_edition(GenerationMode::Guided, Some("emphasize industrial"))
            .await
            .unwrap();

        Pipeline::new(&storage, &sources, Some(&provider))
            .with_call_delay(Duration::from_millis(1))
            .run(&edition)
            .await
            .unwrap();

        let drafting_prompts: Vec<String> = provider
            .calls()
            .into_iter()
            .filter(|p| p.starts_with("EDITORIAL DIRECTION"))
            .collect();
        assert_eq!(drafting_prompts.len(), 4);
    }
}
