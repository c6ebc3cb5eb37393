use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::resume::{AnalysisRecordRow, NewAnalysis, ResumeRow};
use crate::store::{AnalysisStore, PersistenceError};

#[derive(Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    /// One transaction: lock the resume row, INSERT the history row, bump the rollup.
    /// Dropping the future before `commit()` rolls everything back. Re-committing a
    /// record id that already landed for this resume returns that id unchanged.
    async fn commit(
        &self,
        resume_id: Uuid,
        analysis: &NewAnalysis,
    ) -> Result<Uuid, PersistenceError> {
        let map_err = |e| map_sqlx_error(e, resume_id);
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        // Row lock serializes commits for the same resume across processes.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM user_resumes WHERE id = $1 FOR UPDATE")
                .bind(resume_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_err)?;
        if locked.is_none() {
            return Err(PersistenceError::ResumeNotFound(resume_id));
        }

        // A retry after a lost COMMIT acknowledgement finds its own row already there.
        let already = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT resume_id FROM resume_analysis_history WHERE id = $1",
        )
        .bind(analysis.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?
        .flatten();
        if let Some(owner) = already {
            return committed_earlier(analysis.id, owner, resume_id);
        }

        // Append-only: history rows are never updated or deleted.
        sqlx::query(
            r#"
            INSERT INTO resume_analysis_history
                (id, resume_id, created_at, status, extracted, raw_response, model)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(analysis.id)
        .bind(resume_id)
        .bind(analysis.created_at)
        .bind(analysis.status.as_str())
        .bind(&analysis.extracted)
        .bind(&analysis.raw_response)
        .bind(analysis.model.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if analysis.status.counts_toward_rollup() {
            let updated = sqlx::query(
                r#"
                UPDATE user_resumes
                SET analysis_count = analysis_count + 1,
                    last_analyzed_at = $2,
                    latest_analysis_id = $3
                WHERE id = $1
                "#,
            )
            .bind(resume_id)
            .bind(analysis.created_at)
            .bind(analysis.id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
            .rows_affected();

            if updated != 1 {
                return Err(PersistenceError::ResumeNotFound(resume_id));
            }
        } else {
            debug!(
                "Analysis {} is {}; rollup for resume {resume_id} left unchanged",
                analysis.id, analysis.status
            );
        }

        tx.commit().await.map_err(map_err)?;

        info!(
            "Committed analysis {} ({}) for resume {resume_id}",
            analysis.id, analysis.status
        );
        Ok(analysis.id)
    }

    async fn analysis_exists(
        &self,
        resume_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<bool, PersistenceError> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM resume_analysis_history WHERE id = $1 AND resume_id = $2
            )
            "#,
        )
        .bind(analysis_id)
        .bind(resume_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, resume_id))
    }

    async fn fetch_resume(&self, resume_id: Uuid) -> Result<Option<ResumeRow>, PersistenceError> {
        sqlx::query_as::<_, ResumeRow>(
            r#"
            SELECT id, user_id, storage_ref, analysis_count, last_analyzed_at,
                   latest_analysis_id, created_at
            FROM user_resumes
            WHERE id = $1
            "#,
        )
        .bind(resume_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, resume_id))
    }

    async fn list_analyses(
        &self,
        resume_id: Uuid,
    ) -> Result<Vec<AnalysisRecordRow>, PersistenceError> {
        sqlx::query_as::<_, AnalysisRecordRow>(
            r#"
            SELECT id, resume_id, created_at, status, extracted, raw_response, model
            FROM resume_analysis_history
            WHERE resume_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(resume_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, resume_id))
    }
}

/// Outcome of a commit whose record id is already in history.
fn committed_earlier(
    analysis_id: Uuid,
    owner: Uuid,
    resume_id: Uuid,
) -> Result<Uuid, PersistenceError> {
    if owner == resume_id {
        info!("Analysis {analysis_id} was already committed for resume {resume_id}");
        Ok(analysis_id)
    } else {
        Err(PersistenceError::ConstraintViolation(format!(
            "analysis id {analysis_id} belongs to resume {owner}"
        )))
    }
}

fn map_sqlx_error(error: sqlx::Error, resume_id: Uuid) -> PersistenceError {
    match &error {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            classify_sqlstate(&code, resume_id, db.message())
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => PersistenceError::Transient(error.to_string()),
        _ => PersistenceError::Store(error.to_string()),
    }
}

/// Maps a Postgres SQLSTATE to a persistence error kind.
pub fn classify_sqlstate(code: &str, resume_id: Uuid, message: &str) -> PersistenceError {
    match code {
        // foreign_key_violation: the history row points at a missing resume
        "23503" => PersistenceError::ResumeNotFound(resume_id),
        c if c.starts_with("23") => PersistenceError::ConstraintViolation(format!("{c}: {message}")),
        // serialization_failure, deadlock_detected, lock_not_available, admin_shutdown
        "40001" | "40P01" | "55P03" | "57P01" => {
            PersistenceError::Transient(format!("{code}: {message}"))
        }
        c if c.starts_with("08") => PersistenceError::Transient(format!("{c}: {message}")),
        _ => PersistenceError::Store(format!("{code}: {message}")),
    }
}
