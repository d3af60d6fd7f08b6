use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;

pub const DEFAULT_REMOTE_CONCURRENCY: usize = 1;

/// Bounds how many orchestrator calls run at once.
///
/// Clones share the same permits, so one executor built at startup limits the
/// whole process.
#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl Default for RemoteExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_REMOTE_CONCURRENCY)
    }
}

impl RemoteExecutor {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `call` once a permit is free; the permit is released when the
    /// call completes or the returned future is dropped.
    pub async fn run<F>(&self, call: F) -> F::Output
    where
        F: Future,
    {
        // Never closed.
        let _permit = self.permits.acquire().await.ok();
        call.await
    }
}
