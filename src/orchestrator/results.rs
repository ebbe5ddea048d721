//! Results stage controller. Read-only consumer of the store's result slot.

use super::PipelineContext;
use crate::model::ResultsState;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub(crate) struct ResultsController {
    ctx: PipelineContext,
    state_tx: watch::Sender<ResultsState>,
}

impl ResultsController {
    pub fn new(ctx: PipelineContext) -> Self {
        let (state_tx, _) = watch::channel(ResultsState::Loading);
        let mut ctrl = Self { ctx, state_tx };
        ctrl.load();
        ctrl
    }

    pub fn state(&self) -> ResultsState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResultsState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, next: ResultsState) {
        debug!(state = ?next, "results state");
        self.state_tx.send_replace(next);
    }

    /// Snapshot the result slot. The state owns its own copy of the results.
    pub fn load(&mut self) {
        self.set_state(ResultsState::Loading);
        let next = match self.ctx.store.results() {
            None => ResultsState::NoResults,
            Some(set) if set.results.is_empty() => ResultsState::NoResults,
            Some(set) if !set.is_complete() => {
                warn!(
                    requested = set.requested.len(),
                    received = set.results.len(),
                    "stored result set is incomplete"
                );
                ResultsState::Failed {
                    message: format!(
                        "Incomplete results: expected {}, found {}",
                        set.requested.len(),
                        set.results.len()
                    ),
                }
            }
            Some(set) => {
                info!(count = set.results.len(), "results loaded");
                ResultsState::Succeeded {
                    results: set.results.clone(),
                }
            }
        };
        self.set_state(next);
    }

    pub fn refresh(&mut self) {
        self.load();
    }
}
