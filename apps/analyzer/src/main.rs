mod config;
mod db;
mod documents;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod pipeline;
mod retry;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{mask_secret, Config, S3Settings};
use crate::db::{create_pool, run_migrations};
use crate::documents::ResumeDocuments;
use crate::llm_client::groq::{GroqClient, CLIENT_STRATEGIES};
use crate::llm_client::LlmClient;
use crate::pipeline::{AnalysisPipeline, PipelineSettings};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{AnalysisStore, PgAnalysisStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // load .env if present; ignore if missing

    // Logging comes up first so configuration warnings are not lost
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Fail fast: nothing is constructed on an unusable configuration
    let config = Config::from_env().context("invalid configuration")?;

    info!("Starting resume analyzer v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    if config.run_migrations {
        run_migrations(&db).await?;
    } else {
        warn!("RUN_MIGRATIONS is off; assuming the schema is current");
    }
    let store: Arc<dyn AnalysisStore> = Arc::new(PgAnalysisStore::new(db));

    // Initialize S3 / MinIO
    let documents = match &config.s3 {
        Some(s3) => {
            let client = build_s3_client(s3).await;
            info!("S3 client initialized (bucket: {})", s3.bucket);
            Some(ResumeDocuments::new(client, s3.bucket.clone()))
        }
        None => {
            warn!("S3 is not configured; analysis requests must carry resume_text");
            None
        }
    };

    // Initialize LLM client
    let groq = GroqClient::connect(&config.groq_api_key, &config.llm_base_url, &CLIENT_STRATEGIES)
        .context("failed to construct the LLM client")?;
    let strategy = groq.strategy();
    let llm = LlmClient::new(Arc::new(groq));
    info!(
        "LLM client initialized via {strategy:?} (key: {}, models: {})",
        mask_secret(&config.groq_api_key),
        llm.models().join(" -> ")
    );

    let settings = PipelineSettings {
        audit_failed_analyses: config.audit_failed_analyses,
        ..PipelineSettings::default()
    };
    if settings.audit_failed_analyses {
        info!("Failed analyses will be recorded in history");
    }

    // Build app state
    let state = AppState {
        pipeline: AnalysisPipeline::new(llm, store.clone(), settings),
        store,
        documents,
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(settings: &S3Settings) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &settings.access_key_id,
        &settings.secret_access_key,
        None,
        None,
        "analyzer-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&settings.endpoint)
        .load()
        .await;

    // MinIO serves buckets by path, not by subdomain
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
