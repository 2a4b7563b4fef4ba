//! Bounded worker pool abstraction (§5, §9).
//!
//! The spec leaves pool implementation to the host language; this
//! workspace is `tokio`-based throughout (as the teacher's `sg-daemon`
//! already is), so a bounded pool is just a `tokio::sync::Semaphore`
//! guarding a fixed number of concurrent permits. Every component that
//! needs batch-local parallelism (vision batches, section-detection
//! batches, section-content extraction, per-section comparison analysis)
//! owns one `WorkerPool` sized per its documented default width.

use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    width: usize,
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(width.max(1))),
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Acquire a permit, blocking (asynchronously) until one is free. The
    /// orchestrator's "will not start a vision stage if the pool is
    /// saturated — it waits" backpressure rule (§5) falls directly out of
    /// this: callers simply `.acquire().await` before starting a batch.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("WorkerPool semaphore is never closed")
    }

    /// Run a collection of futures with at most `width` running
    /// concurrently, returning results in the same order as the input
    /// regardless of completion order — callers that need page-order or
    /// batch-index stitching rely on this ordering guarantee (§5: "Batches
    /// may complete out of order but are stitched in page order").
    pub async fn run_all<F, Fut, T>(&self, items: Vec<F>) -> Vec<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let pool = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = pool.acquire().await;
                item().await
            }));
        }
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.expect("worker task panicked"));
        }
        results
    }
}
