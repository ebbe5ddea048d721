//! Selection/run stage controller.
//!
//! LoadingHandle → Idle | NoHandle → Running → Succeeded | RunFailed. The dataset is reloaded
//! from the durable copy on every run (I/O pool) and handed to the executor (CPU pool).

use super::PipelineContext;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{
    AlgorithmSelection, DataHandle, ExecutionResult, ResultSet, SelectionState, StageSignal,
};
use std::pin::Pin;
use tokio::sync::{mpsc::UnboundedSender, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

enum Pending {
    Run {
        requested: Vec<String>,
        task: JoinHandle<PipelineResult<Vec<ExecutionResult>>>,
    },
    /// Empty-selection failure clears itself after the configured delay.
    AutoAcknowledge(Pin<Box<Sleep>>),
}

pub(crate) struct ExecutionController {
    ctx: PipelineContext,
    state_tx: watch::Sender<SelectionState>,
    signal_tx: UnboundedSender<StageSignal>,
    selection: AlgorithmSelection,
    handle: Option<DataHandle>,
    pending: Option<Pending>,
}

impl ExecutionController {
    /// Build the controller and immediately resolve the shared data handle.
    pub fn new(ctx: PipelineContext, signal_tx: UnboundedSender<StageSignal>) -> Self {
        let (state_tx, _) = watch::channel(SelectionState::LoadingHandle);
        let mut ctrl = Self {
            ctx,
            state_tx,
            signal_tx,
            selection: AlgorithmSelection::default(),
            handle: None,
            pending: None,
        };
        ctrl.resolve_handle();
        ctrl
    }

    pub fn state(&self) -> SelectionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SelectionState> {
        self.state_tx.subscribe()
    }

    pub fn selection(&self) -> &AlgorithmSelection {
        &self.selection
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn set_state(&self, next: SelectionState) {
        debug!(state = ?next, "selection state");
        self.state_tx.send_replace(next);
    }

    /// Re-read the shared handle and check its backing file. A missing or stale handle is
    /// retracted from the store.
    pub fn resolve_handle(&mut self) {
        self.set_state(SelectionState::LoadingHandle);
        match self.ctx.store.data_handle() {
            Some(handle) if handle.exists() => {
                info!(dataset = %handle.display_name, "dataset handle resolved");
                let dataset_label = format!("Using dataset: {}", handle.display_name);
                self.handle = Some(handle);
                self.set_state(SelectionState::Idle { dataset_label });
            }
            Some(stale) => {
                warn!(path = %stale.path.display(), "dataset handle points at a missing file");
                self.ctx.store.retract_data_handle(&stale);
                self.handle = None;
                self.set_state(SelectionState::NoHandle);
            }
            None => {
                warn!("no dataset handle in the store");
                self.handle = None;
                self.set_state(SelectionState::NoHandle);
            }
        }
    }

    /// Flip `name`. Only while Idle; unknown names are ignored.
    pub fn toggle_selection(&mut self, name: &str) -> bool {
        if !matches!(self.state(), SelectionState::Idle { .. }) {
            return false;
        }
        match self.selection.toggle(name) {
            Some(on) => {
                debug!(algorithm = name, selected = on, "selection toggled");
                true
            }
            None => false,
        }
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.selection.selected()
    }

    /// Start a run of the selected algorithms. Returns false outside Idle.
    pub fn run(&mut self) -> bool {
        if !matches!(self.state(), SelectionState::Idle { .. }) {
            debug!("run ignored outside Idle");
            return false;
        }
        let requested = self.selected_names();
        if requested.is_empty() {
            warn!("run requested with no algorithms selected");
            self.set_state(SelectionState::RunFailed {
                message: PipelineError::NoSelection.to_string(),
            });
            self.pending = Some(Pending::AutoAcknowledge(Box::pin(tokio::time::sleep(
                self.ctx.config.ack_delay,
            ))));
            return true;
        }
        let Some(handle) = self.handle.clone() else {
            // Idle always carries a resolved handle.
            self.resolve_handle();
            return false;
        };

        info!(algorithms = ?requested, dataset = %handle.display_name, "run started");
        self.set_state(SelectionState::Running {
            algorithms: requested.clone(),
        });

        let workers = self.ctx.workers.clone();
        let services = self.ctx.services.clone();
        let options = self.ctx.config.options.clone();
        let names = requested.clone();
        let task = tokio::spawn(async move {
            let loader = services.clone();
            let dataset = workers
                .io(move || loader.load_dataset(&handle))
                .await
                .map_err(|e| PipelineError::DatasetLoad(Box::new(e)))?;

            let executor = services.executor.clone();
            workers
                .cpu(move || executor.execute(&dataset, &names, &options))
                .await
        });
        self.pending = Some(Pending::Run { requested, task });
        true
    }

    /// Wait for the in-flight run (or the automatic acknowledgement) and apply it.
    /// Cancel-safe; returns immediately when nothing is pending.
    pub async fn settle(&mut self) {
        match self.pending.as_mut() {
            None => {}
            Some(Pending::AutoAcknowledge(sleep)) => {
                sleep.as_mut().await;
                self.pending = None;
                self.acknowledge_failure();
            }
            Some(Pending::Run { task, .. }) => {
                let joined = task.await;
                let Some(Pending::Run { requested, .. }) = self.pending.take() else {
                    return;
                };
                let outcome = joined
                    .unwrap_or_else(|e| Err(PipelineError::Worker(e.to_string())))
                    .and_then(|results| {
                        if results.len() == requested.len() {
                            Ok(results)
                        } else {
                            Err(PipelineError::Execution(format!(
                                "expected {} results, got {}",
                                requested.len(),
                                results.len()
                            )))
                        }
                    });
                self.finish_run(requested, outcome);
            }
        }
    }

    fn finish_run(
        &mut self,
        requested: Vec<String>,
        outcome: PipelineResult<Vec<ExecutionResult>>,
    ) {
        match outcome {
            Ok(results) => {
                let result_count = results.len();
                self.ctx
                    .store
                    .publish_results(ResultSet { requested, results });
                self.set_state(SelectionState::Succeeded { result_count });
                let _ = self.signal_tx.send(StageSignal::ResultsReady);
            }
            Err(e) => {
                warn!("run failed: {e}");
                // Never leave an earlier run's results behind a failed one.
                self.ctx.store.clear_results();
                self.set_state(SelectionState::RunFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Leave RunFailed by re-deriving the handle from the store.
    pub fn acknowledge_failure(&mut self) -> bool {
        if !matches!(self.state(), SelectionState::RunFailed { .. }) {
            return false;
        }
        if matches!(self.pending, Some(Pending::AutoAcknowledge(_))) {
            self.pending = None;
        }
        self.resolve_handle();
        true
    }
}

impl Drop for ExecutionController {
    fn drop(&mut self) {
        if let Some(Pending::Run { task, .. }) = self.pending.take() {
            debug!("abandoning in-flight run");
            task.abort();
        }
    }
}
