//! Stored resume files: fetch from object storage and turn them into plain text.
//!
//! PDF text extraction is CPU-bound and runs on the blocking pool. A panic inside
//! the PDF parser surfaces as an extraction error instead of taking the worker down.

use aws_sdk_s3::Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("Unsupported resume file type: {0}")]
    UnsupportedType(String),

    #[error("Resume file not found: {0}")]
    NotFound(String),

    #[error("Resume file contains no text")]
    Empty,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    /// Picks the decoder from the file extension of a storage reference.
    pub fn from_ref(storage_ref: &str) -> Result<Self, DocumentError> {
        let file_name = storage_ref.rsplit('/').next().unwrap_or(storage_ref);
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "txt" | "md" => Ok(DocumentKind::PlainText),
            _ => Err(DocumentError::UnsupportedType(file_name.to_string())),
        }
    }
}

/// Splits `s3://bucket/key` into its parts; a bare key uses the default bucket.
pub fn resolve_location<'a>(storage_ref: &'a str, default_bucket: &'a str) -> (&'a str, &'a str) {
    match storage_ref.strip_prefix("s3://").and_then(|rest| rest.split_once('/')) {
        Some((bucket, key)) => (bucket, key),
        None => (default_bucket, storage_ref.trim_start_matches('/')),
    }
}

#[derive(Clone)]
pub struct ResumeDocuments {
    s3: Client,
    bucket: String,
}

impl ResumeDocuments {
    pub fn new(s3: Client, bucket: String) -> Self {
        Self { s3, bucket }
    }

    pub async fn fetch_text(&self, storage_ref: &str) -> Result<String, DocumentError> {
        let kind = DocumentKind::from_ref(storage_ref)?;
        let (bucket, key) = resolve_location(storage_ref, &self.bucket);

        let object = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    DocumentError::NotFound(storage_ref.to_string())
                } else {
                    DocumentError::Storage(format!("get s3://{bucket}/{key}: {e}"))
                }
            })?;

        let body = object
            .body
            .collect()
            .await
            .map_err(|e| DocumentError::Storage(format!("read s3://{bucket}/{key}: {e}")))?
            .into_bytes();
        debug!("Fetched s3://{bucket}/{key} ({} bytes)", body.len());

        let text = extract_text(kind, body).await?;
        info!("Extracted {} chars from {storage_ref}", text.chars().count());
        Ok(text)
    }
}

pub async fn extract_text(kind: DocumentKind, body: Bytes) -> Result<String, DocumentError> {
    let text = match kind {
        DocumentKind::PlainText => String::from_utf8(body.to_vec())
            .map_err(|e| DocumentError::Extraction(format!("not valid UTF-8: {e}")))?,
        DocumentKind::Pdf => tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&body)
                .map_err(|e| DocumentError::Extraction(e.to_string()))
        })
        .await
        .map_err(|e| DocumentError::Extraction(format!("pdf parser aborted: {e}")))??,
    };

    if text.trim().is_empty() {
        return Err(DocumentError::Empty);
    }
    Ok(text)
}
