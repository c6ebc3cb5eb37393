use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A stored resume with its analysis rollup.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub storage_ref: Option<String>,
    pub analysis_count: i32,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub latest_analysis_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ResumeRow {
    /// A resume as the upload flow creates it: no analyses yet.
    #[cfg(test)]
    pub fn uploaded(user_id: Uuid, storage_ref: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            storage_ref,
            analysis_count: 0,
            last_analyzed_at: None,
            latest_analysis_id: None,
            created_at: Utc::now(),
        }
    }
}

/// One immutable row of `resume_analysis_history`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisRecordRow {
    pub id: Uuid,
    pub resume_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub extracted: Value,
    pub raw_response: String,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
    NeedsReview,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::NeedsReview => "needs_review",
            AnalysisStatus::Failed => "failed",
        }
    }

    /// Whether a persisted record with this status advances the resume rollup.
    pub fn counts_toward_rollup(&self) -> bool {
        !matches!(self, AnalysisStatus::Failed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(AnalysisStatus::Completed),
            "needs_review" => Ok(AnalysisStatus::NeedsReview),
            "failed" => Ok(AnalysisStatus::Failed),
            other => Err(format!("unknown analysis status '{other}'")),
        }
    }
}

/// A record ready to be appended by the persistence coordinator.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub id: Uuid,
    pub status: AnalysisStatus,
    pub extracted: Value,
    pub raw_response: String,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}
