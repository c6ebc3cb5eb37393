use std::sync::Arc;

use crate::documents::ResumeDocuments;
use crate::pipeline::AnalysisPipeline;
use crate::store::AnalysisStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: AnalysisPipeline,
    /// Read side of the store. Writes only happen inside the pipeline.
    pub store: Arc<dyn AnalysisStore>,
    /// `None` when object storage is not configured; analysis then needs inline text.
    pub documents: Option<ResumeDocuments>,
}
