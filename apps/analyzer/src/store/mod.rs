//! Persistence coordinator: appends analysis history and advances the resume rollup
//! in one atomic step.
//!
//! Implementations must guarantee that a commit either inserts the history row AND
//! updates the rollup, or does neither. `analysis_count` is always advanced
//! relatively (`+ 1`), never written from a value read earlier.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::resume::{AnalysisRecordRow, NewAnalysis, ResumeRow};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgAnalysisStore;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PersistenceError {
    #[error("Resume {0} not found")]
    ResumeNotFound(Uuid),

    /// Connection loss, lock contention, serialization failure. Safe to retry.
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl PersistenceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Transient(_))
    }
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Appends `analysis` to the resume's history and, for statuses that count,
    /// advances `analysis_count`, `last_analyzed_at` and `latest_analysis_id`.
    /// Committing an id that already landed for the same resume is a no-op that
    /// returns the id, so a retry after a lost acknowledgement never counts twice.
    async fn commit(&self, resume_id: Uuid, analysis: &NewAnalysis)
        -> Result<Uuid, PersistenceError>;

    /// Whether the history row `analysis_id` exists for `resume_id`.
    async fn analysis_exists(
        &self,
        resume_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<bool, PersistenceError>;

    async fn fetch_resume(&self, resume_id: Uuid) -> Result<Option<ResumeRow>, PersistenceError>;

    /// History for one resume, newest first.
    async fn list_analyses(
        &self,
        resume_id: Uuid,
    ) -> Result<Vec<AnalysisRecordRow>, PersistenceError>;
}
