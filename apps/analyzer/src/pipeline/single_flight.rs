//! Per-resume execution tokens: at most one analysis in flight per resume id.
//!
//! Tokens for different resumes never contend. Waiters for the same resume are
//! served in arrival order (tokio's mutex is FIFO). A token is released when it is
//! dropped, including when the owning future is cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct ResumeLocks {
    handles: Arc<Mutex<HashMap<Uuid, Weak<AsyncMutex<()>>>>>,
}

/// Held for the whole life of one analysis request.
pub struct ResumeToken {
    _guard: OwnedMutexGuard<()>,
}

impl ResumeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the resume's token. After `patience` the request is logged as
    /// queued and keeps its place in line; it is never rejected.
    pub async fn acquire(&self, resume_id: Uuid, patience: Duration) -> ResumeToken {
        let lock = self.handle(resume_id).lock_owned();
        tokio::pin!(lock);

        let guard = match tokio::time::timeout(patience, &mut lock).await {
            Ok(guard) => guard,
            Err(_) => {
                info!(
                    "Analysis for resume {resume_id} queued behind an in-flight request (waited {}ms)",
                    patience.as_millis()
                );
                lock.await
            }
        };

        ResumeToken { _guard: guard }
    }

    /// Number of resumes with a live token or waiter.
    pub fn tracked(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn handle(&self, resume_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handles.retain(|_, weak| weak.strong_count() > 0);

        if let Some(existing) = handles.get(&resume_id).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Arc::new(AsyncMutex::new(()));
        handles.insert(resume_id, Arc::downgrade(&fresh));
        fresh
    }
}
