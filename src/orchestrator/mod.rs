//! Pipeline orchestration.
//!
//! Three per-stage controllers (upload, selection/run, results) communicate only through the
//! shared `PipelineStore`. Each is built fresh per stage visit from a `PipelineContext` and
//! re-derives what it needs from the store. The driver in `controller` owns whichever one is
//! current, feeds it UI commands and advances stages on `StageSignal`s.

mod controller;
mod execute;
mod ingest;
mod post_process;
mod results;

pub(crate) use controller::{run_controller, PipelineEvent, StageView, UiCommand};
pub(crate) use execute::ExecutionController;
pub(crate) use ingest::IngestionController;
pub(crate) use post_process::process_results;
pub(crate) use results::ResultsController;

use crate::engine::Services;
use crate::model::{DataHandle, PipelineConfig};
use crate::store::PipelineStore;
use crate::workers::Workers;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Everything a controller needs, constructed once and shared by every stage visit.
#[derive(Clone)]
pub(crate) struct PipelineContext {
    pub store: Arc<PipelineStore>,
    pub services: Services,
    pub workers: Workers,
    pub config: Arc<PipelineConfig>,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        let workers = Workers::new(config.cpu_threads)?;
        let services = Services::from_config(&config);
        Ok(Self::with_services(config, services, workers))
    }

    pub fn with_services(config: PipelineConfig, services: Services, workers: Workers) -> Self {
        Self {
            store: Arc::new(PipelineStore::new()),
            services,
            workers,
            config: Arc::new(config),
        }
    }

    /// Delete a durable copy on the I/O pool. Failures are logged, never surfaced.
    pub fn discard_copy(&self, handle: DataHandle) -> JoinHandle<()> {
        let vault = self.services.vault.clone();
        let workers = self.workers.clone();
        tokio::spawn(async move {
            if let Err(e) = workers.io(move || vault.discard(&handle)).await {
                warn!("failed to delete dataset copy: {e}");
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::engine::{AlgorithmExecutor, ExecutionOptions};
    use crate::error::PipelineResult;
    use crate::model::{Dataset, ExecutionResult};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            vault_dir: dir.join("vault"),
            cpu_threads: 2,
            ack_delay: Duration::from_millis(20),
            time_scale: 0.0,
            options: ExecutionOptions::new(),
        }
    }

    pub fn context(dir: &Path) -> PipelineContext {
        PipelineContext::new(config(dir)).unwrap()
    }

    pub fn context_with_executor(
        dir: &Path,
        executor: std::sync::Arc<dyn AlgorithmExecutor>,
    ) -> PipelineContext {
        let cfg = config(dir);
        let mut services = crate::engine::Services::from_config(&cfg);
        services.executor = executor;
        let workers = Workers::new(cfg.cpu_threads).unwrap();
        PipelineContext::with_services(cfg, services, workers)
    }

    /// Files currently in the vault directory; zero when it was never created.
    pub fn vault_files(ctx: &PipelineContext) -> usize {
        std::fs::read_dir(&ctx.config.vault_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Poll until `done` holds or about half a second has passed.
    pub async fn eventually(done: impl Fn() -> bool) {
        for _ in 0..50 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    /// Executor double that counts calls and can be told to fail.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        pub calls: AtomicUsize,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl AlgorithmExecutor for ScriptedExecutor {
        fn execute(
            &self,
            _dataset: &Dataset,
            names: &[String],
            _options: &ExecutionOptions,
        ) -> PipelineResult<Vec<ExecutionResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(crate::error::PipelineError::Execution("scripted failure".into()));
            }
            Ok(names
                .iter()
                .map(|n| ExecutionResult {
                    algorithm: n.clone(),
                    accuracy: 0.9,
                    auc_roc: 0.95,
                    loss: 0.05,
                    execution_time_ms: 1,
                })
                .collect())
        }
    }
}
