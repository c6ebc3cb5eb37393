/// Analysis pipeline: one request in, one `AnalysisOutcome` out.
///
/// Flow:
///   1. Acquire the resume's execution token (single-flight per resume id)
///   2. Build the extraction prompt
///   3. Extract via the LLM client (retry + model fallback live there)
///   4. Validate the reply into a profile or a needs_review result
///   5. Commit record + rollup atomically, retrying transient store failures
///
/// Stages only move forward. A failure at any stage ends the run as Failed and
/// leaves stored state as it was, unless failed-analysis auditing is switched on.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::extraction::{build_prompt, parse_reply};
use crate::llm_client::{ErrorKind, ExtractionError, LlmClient};
use crate::models::resume::{AnalysisStatus, NewAnalysis};
use crate::retry::RetryPolicy;
use crate::store::{AnalysisStore, PersistenceError};

pub mod handlers;
pub mod single_flight;

pub use single_flight::ResumeLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Building,
    Extracting,
    Validating,
    Persisting,
    Done,
    Failed,
}

/// Why a run failed. Serialized under the names clients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ClientInitError,
    AuthError,
    RateLimitError,
    NetworkError,
    ServiceError,
    InvalidRequest,
    ResumeNotFound,
    TransientStoreError,
    ConstraintViolation,
    StoreError,
    Timeout,
}

impl From<ErrorKind> for FailureKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ClientInit => FailureKind::ClientInitError,
            ErrorKind::Auth => FailureKind::AuthError,
            ErrorKind::RateLimit => FailureKind::RateLimitError,
            ErrorKind::Network => FailureKind::NetworkError,
            ErrorKind::Service => FailureKind::ServiceError,
            ErrorKind::InvalidRequest => FailureKind::InvalidRequest,
        }
    }
}

impl From<&PersistenceError> for FailureKind {
    fn from(error: &PersistenceError) -> Self {
        match error {
            PersistenceError::ResumeNotFound(_) => FailureKind::ResumeNotFound,
            PersistenceError::Transient(_) => FailureKind::TransientStoreError,
            PersistenceError::ConstraintViolation(_) => FailureKind::ConstraintViolation,
            PersistenceError::Store(_) => FailureKind::StoreError,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

/// Result of one analysis request. Failures are values here, not errors: the
/// caller decides how to surface them.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub resume_id: Uuid,
    pub status: AnalysisStatus,
    pub analysis_id: Option<Uuid>,
    pub model: Option<String>,
    pub used_fallback: bool,
    pub caveats: Vec<String>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

impl AnalysisOutcome {
    pub fn is_failed(&self) -> bool {
        self.status == AnalysisStatus::Failed
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bound on one request, measured from the moment the token is held.
    pub request_timeout: Duration,
    /// How long to wait on another request for the same resume before logging it as queued.
    pub queue_notice_after: Duration,
    pub persistence_retry: RetryPolicy,
    /// Store a `failed` record for extraction failures. Never touches the rollup.
    pub audit_failed_analyses: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            queue_notice_after: Duration::from_secs(5),
            persistence_retry: RetryPolicy::persistence(),
            audit_failed_analyses: false,
        }
    }
}

#[derive(Clone)]
pub struct AnalysisPipeline {
    llm: LlmClient,
    store: Arc<dyn AnalysisStore>,
    locks: ResumeLocks,
    settings: PipelineSettings,
}

impl AnalysisPipeline {
    pub fn new(llm: LlmClient, store: Arc<dyn AnalysisStore>, settings: PipelineSettings) -> Self {
        Self {
            llm,
            store,
            locks: ResumeLocks::new(),
            settings,
        }
    }

    #[cfg(test)]
    pub fn locks(&self) -> &ResumeLocks {
        &self.locks
    }

    /// Runs one analysis for `resume_id`. Requests for the same resume run one
    /// at a time in arrival order; different resumes run concurrently.
    ///
    /// Dropping the returned future releases the token and rolls back any
    /// uncommitted write.
    pub async fn analyze(&self, resume_id: Uuid, resume_text: &str) -> AnalysisOutcome {
        let _token = self
            .locks
            .acquire(resume_id, self.settings.queue_notice_after)
            .await;
        debug!(
            "Resume {resume_id} holds its token ({} resumes in flight)",
            self.locks.tracked()
        );

        let mut run = Run::new(resume_id);
        let timeout = self.settings.request_timeout;
        let result = tokio::time::timeout(timeout, self.run(&mut run, resume_text)).await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => self.timed_out(&mut run, timeout).await,
        }
    }

    /// A timeout during Persisting may have cut off the acknowledgement of a commit
    /// that landed. The store decides which outcome is true.
    async fn timed_out(&self, run: &mut Run, timeout: Duration) -> AnalysisOutcome {
        if let Some((analysis_id, status)) = run.pending {
            match self.store.analysis_exists(run.resume_id, analysis_id).await {
                Ok(true) => {
                    info!(
                        "Analysis {analysis_id} for resume {} landed before the timeout",
                        run.resume_id
                    );
                    return run.finish(status, analysis_id);
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "Could not verify analysis {analysis_id} for resume {}: {e}",
                    run.resume_id
                ),
            }
        }
        run.fail(
            FailureKind::Timeout,
            format!("analysis did not finish within {}s", timeout.as_secs()),
        )
    }

    async fn run(&self, run: &mut Run, resume_text: &str) -> AnalysisOutcome {
        run.advance(Stage::Building);
        let prompt = build_prompt(resume_text);

        run.advance(Stage::Extracting);
        let reply = match self.llm.extract(&prompt).await {
            Ok(reply) => reply,
            Err(e) => return self.extraction_failed(run, e).await,
        };
        run.model = Some(reply.model.clone());
        run.used_fallback = reply.used_fallback;

        run.advance(Stage::Validating);
        let parsed = parse_reply(&reply.content);
        for caveat in &parsed.caveats {
            debug!("Resume {} reply caveat: {caveat}", run.resume_id);
        }
        run.caveats = parsed.caveats.clone();

        run.advance(Stage::Persisting);
        let record = NewAnalysis {
            id: Uuid::new_v4(),
            status: parsed.status,
            extracted: parsed.extracted_json(),
            raw_response: parsed.raw_response,
            model: Some(reply.model),
            created_at: Utc::now(),
        };
        run.pending = Some((record.id, record.status));

        match self.persist(run.resume_id, &record).await {
            Ok(analysis_id) => run.finish(parsed.status, analysis_id),
            Err(e) => run.fail(FailureKind::from(&e), e.to_string()),
        }
    }

    async fn extraction_failed(&self, run: &mut Run, error: ExtractionError) -> AnalysisOutcome {
        if self.settings.audit_failed_analyses {
            let record = NewAnalysis {
                id: Uuid::new_v4(),
                status: AnalysisStatus::Failed,
                extracted: json!({}),
                raw_response: error.to_string(),
                model: None,
                created_at: Utc::now(),
            };
            match self.persist(run.resume_id, &record).await {
                Ok(id) => info!("Recorded failed analysis {id} for resume {}", run.resume_id),
                Err(e) => warn!(
                    "Could not record failed analysis for resume {}: {e}",
                    run.resume_id
                ),
            }
        }
        run.fail(FailureKind::from(error.kind), error.message)
    }

    /// Commits the record, retrying only transient failures. The record keeps its
    /// id across attempts, and the store acknowledges an id it already holds, so a
    /// commit whose acknowledgement was lost is not applied twice.
    async fn persist(
        &self,
        resume_id: Uuid,
        record: &NewAnalysis,
    ) -> Result<Uuid, PersistenceError> {
        let policy = &self.settings.persistence_retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.store.commit(resume_id, record).await {
                Ok(id) => return Ok(id),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = policy.delay_for(attempt, None);
                    warn!(
                        "Commit for resume {resume_id} attempt {attempt}/{max_attempts} failed ({e}), retrying after {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Progress of one run. Survives a timeout so the outcome can say where it stopped.
struct Run {
    resume_id: Uuid,
    stage: Stage,
    model: Option<String>,
    used_fallback: bool,
    caveats: Vec<String>,
    /// Record handed to the store, if any.
    pending: Option<(Uuid, AnalysisStatus)>,
}

impl Run {
    fn new(resume_id: Uuid) -> Self {
        Self {
            resume_id,
            stage: Stage::Pending,
            model: None,
            used_fallback: false,
            caveats: Vec::new(),
            pending: None,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "stage went backwards: {:?} -> {next:?}", self.stage);
        debug!("Resume {} analysis: {:?} -> {next:?}", self.resume_id, self.stage);
        self.stage = next;
    }

    fn finish(&mut self, status: AnalysisStatus, analysis_id: Uuid) -> AnalysisOutcome {
        self.advance(Stage::Done);
        info!(
            "Analysis {analysis_id} for resume {} finished as {status} ({} caveats)",
            self.resume_id,
            self.caveats.len()
        );
        AnalysisOutcome {
            resume_id: self.resume_id,
            status,
            analysis_id: Some(analysis_id),
            model: self.model.clone(),
            used_fallback: self.used_fallback,
            caveats: std::mem::take(&mut self.caveats),
            stage: Stage::Done,
            failed_at: None,
            error: None,
        }
    }

    fn fail(&mut self, kind: FailureKind, message: String) -> AnalysisOutcome {
        let failed_at = self.stage;
        self.advance(Stage::Failed);
        warn!(
            "Analysis for resume {} failed at {failed_at:?}: {kind:?}: {message}",
            self.resume_id
        );
        AnalysisOutcome {
            resume_id: self.resume_id,
            status: AnalysisStatus::Failed,
            analysis_id: None,
            model: self.model.clone(),
            used_fallback: self.used_fallback,
            caveats: std::mem::take(&mut self.caveats),
            stage: Stage::Failed,
            failed_at: Some(failed_at),
            error: Some(FailureDetail { kind, message }),
        }
    }
}
