//! Background worker pools.
//!
//! Blocking I/O (stream reads, durable copies, dataset reloads) runs on tokio's blocking
//! pool. Algorithm execution runs on a dedicated rayon pool sized near the core count, so
//! it never competes with the task that applies state transitions.

use crate::error::{PipelineError, PipelineResult};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::error;

#[derive(Clone)]
pub struct Workers {
    cpu: Arc<rayon::ThreadPool>,
}

impl Workers {
    pub fn new(cpu_threads: usize) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cpu_threads.max(1))
            .thread_name(|i| format!("automl-cpu-{i}"))
            .panic_handler(|_| error!("cpu worker panicked"))
            .build()?;
        Ok(Self {
            cpu: Arc::new(pool),
        })
    }

    /// Run blocking I/O off the interactive task.
    pub async fn io<T, F>(&self, f: F) -> PipelineResult<T>
    where
        F: FnOnce() -> PipelineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| PipelineError::Worker(format!("io task failed: {e}")))?
    }

    /// Run CPU-bound work on the rayon pool.
    pub async fn cpu<T, F>(&self, f: F) -> PipelineResult<T>
    where
        F: FnOnce() -> PipelineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.cpu.spawn(move || {
            let _ = tx.send(f());
        });
        // A panicking job drops `tx` without sending.
        rx.await
            .map_err(|_| PipelineError::Worker("cpu task did not complete".into()))?
    }
}
