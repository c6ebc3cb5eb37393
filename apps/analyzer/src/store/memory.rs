//! In-memory store for tests, with fault injection for the commit path.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::resume::{AnalysisRecordRow, NewAnalysis, ResumeRow};
use crate::store::{AnalysisStore, PersistenceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The history row is staged, then the connection drops before the rollup update.
    AfterHistoryInsert,
    /// The commit fails before touching anything.
    Transient,
    ConstraintViolation,
    /// Everything is applied, then the acknowledgement is lost.
    AfterCommit,
    /// Everything is applied, then the caller waits this long for the acknowledgement.
    StallAfterCommit(Duration),
}

#[derive(Default)]
struct MemoryState {
    resumes: HashMap<Uuid, ResumeRow>,
    history: Vec<AnalysisRecordRow>,
    faults: VecDeque<Fault>,
    commit_attempts: u32,
}

#[derive(Default)]
pub struct InMemoryAnalysisStore {
    state: Mutex<MemoryState>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_resume(&self, resume: ResumeRow) {
        self.state.lock().unwrap().resumes.insert(resume.id, resume);
    }

    /// Queues a fault for the next commit attempt.
    pub fn inject(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    pub fn resume(&self, id: Uuid) -> Option<ResumeRow> {
        self.state.lock().unwrap().resumes.get(&id).cloned()
    }

    /// History in insertion order.
    pub fn history(&self, resume_id: Uuid) -> Vec<AnalysisRecordRow> {
        self.state
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|r| r.resume_id == resume_id)
            .cloned()
            .collect()
    }

    pub fn commit_attempts(&self) -> u32 {
        self.state.lock().unwrap().commit_attempts
    }
}

impl InMemoryAnalysisStore {
    fn apply(
        &self,
        resume_id: Uuid,
        analysis: &NewAnalysis,
        fault: Option<Fault>,
    ) -> Result<Uuid, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let mut resume = state
            .resumes
            .get(&resume_id)
            .cloned()
            .ok_or(PersistenceError::ResumeNotFound(resume_id))?;

        if let Some(existing) = state.history.iter().find(|r| r.id == analysis.id) {
            if existing.resume_id == resume_id {
                return Ok(analysis.id);
            }
            return Err(PersistenceError::ConstraintViolation(format!(
                "analysis id {} belongs to resume {}",
                analysis.id, existing.resume_id
            )));
        }

        // Both writes are staged and only applied together at the end.
        let record = AnalysisRecordRow {
            id: analysis.id,
            resume_id,
            created_at: analysis.created_at,
            status: analysis.status.as_str().to_string(),
            extracted: analysis.extracted.clone(),
            raw_response: analysis.raw_response.clone(),
            model: analysis.model.clone(),
        };

        if fault == Some(Fault::AfterHistoryInsert) {
            return Err(PersistenceError::Transient(
                "injected: connection lost after history insert".into(),
            ));
        }

        if analysis.status.counts_toward_rollup() {
            resume.analysis_count += 1;
            resume.last_analyzed_at = Some(analysis.created_at);
            resume.latest_analysis_id = Some(analysis.id);
        }

        state.history.push(record);
        state.resumes.insert(resume_id, resume);
        Ok(analysis.id)
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn commit(
        &self,
        resume_id: Uuid,
        analysis: &NewAnalysis,
    ) -> Result<Uuid, PersistenceError> {
        let fault = {
            let mut state = self.state.lock().unwrap();
            state.commit_attempts += 1;
            state.faults.pop_front()
        };

        match fault {
            Some(Fault::Transient) => {
                Err(PersistenceError::Transient("injected: connection reset".into()))
            }
            Some(Fault::ConstraintViolation) => {
                Err(PersistenceError::ConstraintViolation("injected: check".into()))
            }
            Some(Fault::AfterCommit) => {
                self.apply(resume_id, analysis, fault)?;
                Err(PersistenceError::Transient(
                    "injected: connection lost during COMMIT".into(),
                ))
            }
            Some(Fault::StallAfterCommit(delay)) => {
                let id = self.apply(resume_id, analysis, fault)?;
                tokio::time::sleep(delay).await;
                Ok(id)
            }
            _ => self.apply(resume_id, analysis, fault),
        }
    }

    async fn analysis_exists(
        &self,
        resume_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<bool, PersistenceError> {
        Ok(self
            .history(resume_id)
            .iter()
            .any(|r| r.id == analysis_id))
    }

    async fn fetch_resume(&self, resume_id: Uuid) -> Result<Option<ResumeRow>, PersistenceError> {
        Ok(self.resume(resume_id))
    }

    async fn list_analyses(
        &self,
        resume_id: Uuid,
    ) -> Result<Vec<AnalysisRecordRow>, PersistenceError> {
        let mut records = self.history(resume_id);
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::models::resume::AnalysisStatus;

    fn analysis(status: AnalysisStatus) -> NewAnalysis {
        NewAnalysis {
            id: Uuid::new_v4(),
            status,
            extracted: json!({"name": "Jane"}),
            raw_response: "{\"name\": \"Jane\"}".to_string(),
            model: Some("test-model".to_string()),
            created_at: Utc::now(),
        }
    }

    fn seeded() -> (InMemoryAnalysisStore, Uuid) {
        let store = InMemoryAnalysisStore::new();
        let resume = ResumeRow::uploaded(Uuid::new_v4(), None);
        let id = resume.id;
        store.insert_resume(resume);
        (store, id)
    }

    #[tokio::test]
    async fn test_commit_appends_and_advances_rollup() {
        let (store, id) = seeded();
        let new = analysis(AnalysisStatus::Completed);
        let committed = store.commit(id, &new).await.unwrap();

        let resume = store.resume(id).unwrap();
        assert_eq!(committed, new.id);
        assert_eq!(resume.analysis_count, 1);
        assert_eq!(resume.latest_analysis_id, Some(new.id));
        assert_eq!(resume.last_analyzed_at, Some(new.created_at));
        assert_eq!(store.history(id).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_record_leaves_rollup_alone() {
        let (store, id) = seeded();
        store.commit(id, &analysis(AnalysisStatus::Failed)).await.unwrap();

        let resume = store.resume(id).unwrap();
        assert_eq!(resume.analysis_count, 0);
        assert!(resume.latest_analysis_id.is_none());
        assert_eq!(store.history(id).len(), 1);
    }

    #[tokio::test]
    async fn test_fault_after_history_insert_leaves_no_trace() {
        let (store, id) = seeded();
        let first = analysis(AnalysisStatus::Completed);
        store.commit(id, &first).await.unwrap();

        store.inject(Fault::AfterHistoryInsert);
        let err = store
            .commit(id, &analysis(AnalysisStatus::Completed))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let resume = store.resume(id).unwrap();
        assert_eq!(resume.analysis_count, 1);
        assert_eq!(resume.latest_analysis_id, Some(first.id));
        assert_eq!(store.history(id).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_resume_is_not_found() {
        let store = InMemoryAnalysisStore::new();
        let id = Uuid::new_v4();
        let err = store
            .commit(id, &analysis(AnalysisStatus::Completed))
            .await
            .unwrap_err();
        assert_eq!(err, PersistenceError::ResumeNotFound(id));
    }

    #[tokio::test]
    async fn test_recommitting_same_id_counts_once() {
        let (store, id) = seeded();
        let new = analysis(AnalysisStatus::Completed);
        store.commit(id, &new).await.unwrap();
        assert_eq!(store.commit(id, &new).await.unwrap(), new.id);

        let resume = store.resume(id).unwrap();
        assert_eq!(resume.analysis_count, 1);
        assert_eq!(resume.latest_analysis_id, Some(new.id));
        assert_eq!(store.history(id).len(), 1);
    }

    #[tokio::test]
    async fn test_same_id_under_another_resume_is_constraint_violation() {
        let (store, id) = seeded();
        let other = ResumeRow::uploaded(Uuid::new_v4(), None);
        let other_id = other.id;
        store.insert_resume(other);

        let new = analysis(AnalysisStatus::Completed);
        store.commit(id, &new).await.unwrap();
        let err = store.commit(other_id, &new).await.unwrap_err();
        assert!(matches!(err, PersistenceError::ConstraintViolation(_)));
        assert_eq!(store.resume(other_id).unwrap().analysis_count, 0);
    }

    #[tokio::test]
    async fn test_lost_acknowledgement_still_applies_once() {
        let (store, id) = seeded();
        let new = analysis(AnalysisStatus::Completed);
        store.inject(Fault::AfterCommit);

        assert!(store.commit(id, &new).await.unwrap_err().is_transient());
        assert!(store.analysis_exists(id, new.id).await.unwrap());
        assert_eq!(store.commit(id, &new).await.unwrap(), new.id);
        assert_eq!(store.resume(id).unwrap().analysis_count, 1);
        assert_eq!(store.history(id).len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let (store, id) = seeded();
        let first = analysis(AnalysisStatus::Completed);
        let second = analysis(AnalysisStatus::NeedsReview);
        store.commit(id, &first).await.unwrap();
        store.commit(id, &second).await.unwrap();

        let listed = store.list_analyses(id).await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }
}
