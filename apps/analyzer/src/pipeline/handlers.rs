use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::{AnalysisRecordRow, ResumeRow};
use crate::pipeline::AnalysisOutcome;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    /// Inline resume text. When absent the stored file is fetched instead.
    #[serde(default)]
    pub resume_text: Option<String>,
}

#[derive(Serialize)]
pub struct AnalysisHistoryResponse {
    pub resume_id: Uuid,
    pub analyses: Vec<AnalysisRecordRow>,
}

/// POST /api/v1/resumes/:id/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<AnalysisOutcome>, AppError> {
    let request = parse_analyze_body(&body)?;
    let resume = load_resume(&state, resume_id).await?;

    let text = match request.resume_text.filter(|t| !t.trim().is_empty()) {
        Some(text) => text,
        None => stored_text(&state, &resume).await?,
    };

    let outcome = state.pipeline.analyze(resume_id, &text).await;
    if outcome.is_failed() {
        return Err(AppError::AnalysisFailed(Box::new(outcome)));
    }
    Ok(Json(outcome))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<ResumeRow>, AppError> {
    Ok(Json(load_resume(&state, resume_id).await?))
}

/// GET /api/v1/resumes/:id/analyses
pub async fn handle_list_analyses(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<AnalysisHistoryResponse>, AppError> {
    load_resume(&state, resume_id).await?;
    let analyses = state.store.list_analyses(resume_id).await?;
    Ok(Json(AnalysisHistoryResponse {
        resume_id,
        analyses,
    }))
}

/// An empty body asks for the stored file. Anything else must be a valid request.
fn parse_analyze_body(body: &[u8]) -> Result<AnalyzeRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(AnalyzeRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid analyze request body: {e}")))
}

async fn load_resume(state: &AppState, resume_id: Uuid) -> Result<ResumeRow, AppError> {
    state
        .store
        .fetch_resume(resume_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))
}

async fn stored_text(state: &AppState, resume: &ResumeRow) -> Result<String, AppError> {
    let storage_ref = resume.storage_ref.as_deref().ok_or_else(|| {
        AppError::UnprocessableEntity(format!(
            "Resume {} has no stored file; supply resume_text",
            resume.id
        ))
    })?;
    let documents = state.documents.as_ref().ok_or_else(|| {
        AppError::UnprocessableEntity(
            "Object storage is not configured; supply resume_text".to_string(),
        )
    })?;

    info!("Fetching stored file for resume {}", resume.id);
    Ok(documents.fetch_text(storage_ref).await?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::llm_client::testing::ScriptedProvider;
    use crate::llm_client::{ErrorKind, ExtractionError, LlmClient, PREFERRED_MODEL};
    use crate::pipeline::{AnalysisPipeline, PipelineSettings};
    use crate::retry::RetryPolicy;
    use crate::routes::build_router;
    use crate::state::AppState;
    use crate::store::memory::InMemoryAnalysisStore;

    use super::*;

    const REPLY: &str = r#"{"name": "Jane Doe", "email": "jane@example.com", "skills": ["Go"]}"#;

    fn app(provider: ScriptedProvider) -> (Router, Arc<InMemoryAnalysisStore>, Uuid) {
        let store = Arc::new(InMemoryAnalysisStore::new());
        let resume = ResumeRow::uploaded(Uuid::new_v4(), Some("resumes/jane.pdf".into()));
        let resume_id = resume.id;
        store.insert_resume(resume);

        let llm = LlmClient::new(Arc::new(provider))
            .with_retry(RetryPolicy::immediate(1), Duration::from_secs(2));
        let settings = PipelineSettings {
            persistence_retry: RetryPolicy::immediate(3),
            ..PipelineSettings::default()
        };
        let state = AppState {
            pipeline: AnalysisPipeline::new(llm, store.clone(), settings),
            store: store.clone(),
            documents: None,
        };
        (build_router(state), store, resume_id)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_analyze_inline_text() {
        let provider = ScriptedProvider::new().always(PREFERRED_MODEL, Ok(REPLY.into()));
        let (app, store, id) = app(provider);

        let (status, body) = send(
            app,
            "POST",
            &format!("/api/v1/resumes/{id}/analyze"),
            Some(json!({"resume_text": "Jane Doe\njane@example.com"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["model"], PREFERRED_MODEL);
        assert_eq!(store.resume(id).unwrap().analysis_count, 1);
    }

    #[tokio::test]
    async fn test_analyze_without_text_or_storage_is_unprocessable() {
        let (app, store, id) = app(ScriptedProvider::new());
        let (status, body) = send(app, "POST", &format!("/api/v1/resumes/{id}/analyze"), None).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "UNPROCESSABLE_ENTITY");
        assert!(store.history(id).is_empty());
    }

    async fn send_raw(app: Router, uri: &str, content_type: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_analyze_rejects_mistyped_resume_text() {
        let (app, store, id) = app(ScriptedProvider::new());
        let (status, body) = send(
            app,
            "POST",
            &format!("/api/v1/resumes/{id}/analyze"),
            Some(json!({"resume_text": 42})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(store.history(id).is_empty());
    }

    #[tokio::test]
    async fn test_analyze_rejects_body_that_is_not_json() {
        let (app, store, id) = app(ScriptedProvider::new());
        let (status, body) = send_raw(
            app,
            &format!("/api/v1/resumes/{id}/analyze"),
            "text/plain",
            "Jane Doe, engineer",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(store.commit_attempts(), 0);
    }

    #[test]
    fn test_blank_body_means_no_inline_text() {
        assert!(parse_analyze_body(b"").unwrap().resume_text.is_none());
        assert!(parse_analyze_body(b" \n").unwrap().resume_text.is_none());
        assert_eq!(
            parse_analyze_body(br#"{"resume_text": "Jane"}"#)
                .unwrap()
                .resume_text
                .as_deref(),
            Some("Jane")
        );
        assert!(parse_analyze_body(b"{}").unwrap().resume_text.is_none());
    }

    #[tokio::test]
    async fn test_analyze_unknown_resume_is_not_found() {
        let (app, _, _) = app(ScriptedProvider::new());
        let (status, _) = send(
            app,
            "POST",
            &format!("/api/v1/resumes/{}/analyze", Uuid::new_v4()),
            Some(json!({"resume_text": "text"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_analysis_echoes_outcome() {
        let provider = ScriptedProvider::new().always(
            PREFERRED_MODEL,
            Err(ExtractionError::new(ErrorKind::RateLimit, "slow down")),
        );
        let (app, store, id) = app(provider);

        let (status, body) = send(
            app,
            "POST",
            &format!("/api/v1/resumes/{id}/analyze"),
            Some(json!({"resume_text": "Jane Doe"})),
        )
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "ANALYSIS_FAILED");
        assert_eq!(body["outcome"]["error"]["kind"], "RateLimitError");
        assert_eq!(body["outcome"]["status"], "failed");
        assert_eq!(store.resume(id).unwrap().analysis_count, 0);
    }

    #[tokio::test]
    async fn test_resume_and_history_reads() {
        let provider = ScriptedProvider::new().always(PREFERRED_MODEL, Ok(REPLY.into()));
        let (app, _, id) = app(provider);

        send(
            app.clone(),
            "POST",
            &format!("/api/v1/resumes/{id}/analyze"),
            Some(json!({"resume_text": "Jane Doe"})),
        )
        .await;

        let (status, resume) = send(app.clone(), "GET", &format!("/api/v1/resumes/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resume["analysis_count"], 1);

        let (status, history) =
            send(app, "GET", &format!("/api/v1/resumes/{id}/analyses"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["analyses"].as_array().unwrap().len(), 1);
        assert_eq!(history["analyses"][0]["id"], resume["latest_analysis_id"]);
    }
}
