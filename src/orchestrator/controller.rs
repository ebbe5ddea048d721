//! Pipeline driver.
//!
//! Owns the current stage's controller, maps UI commands onto it and emits a snapshot for
//! presentation layers whenever the stage, its observable state or its selection changes.

use super::{ExecutionController, IngestionController, PipelineContext, ResultsController};
use crate::model::{ResultsState, SelectionState, StageSignal, UploadState};
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::debug;

/// Commands emitted by UI layers to drive the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UiCommand {
    /// `None` means the picker was cancelled.
    ChooseFile { path: Option<PathBuf> },
    PrepareAndLoad,
    Retry,
    ClearSelection,
    ToggleAlgorithm(String),
    Run,
    Acknowledge,
    Refresh,
    Back,
    Quit,
}

/// Read-only view of the current stage.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StageView {
    Upload(UploadState),
    Selection {
        state: SelectionState,
        entries: Vec<(String, bool)>,
    },
    Results(ResultsState),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PipelineEvent {
    Snapshot(StageView),
    Info(String),
}

/// The current controller paired with a subscription to its observable state.
enum Stage {
    Upload(IngestionController, watch::Receiver<UploadState>),
    Selection(ExecutionController, watch::Receiver<SelectionState>),
    Results(ResultsController, watch::Receiver<ResultsState>),
}

impl Stage {
    fn upload(c: IngestionController) -> Self {
        let rx = c.subscribe();
        Stage::Upload(c, rx)
    }

    fn selection(c: ExecutionController) -> Self {
        let rx = c.subscribe();
        Stage::Selection(c, rx)
    }

    fn results(c: ResultsController) -> Self {
        let rx = c.subscribe();
        Stage::Results(c, rx)
    }

    /// Whether the controller published a state the driver has not rendered yet.
    fn has_changed(&self) -> bool {
        let changed = match self {
            Stage::Upload(_, rx) => rx.has_changed(),
            Stage::Selection(_, rx) => rx.has_changed(),
            Stage::Results(_, rx) => rx.has_changed(),
        };
        changed.unwrap_or(false)
    }

    /// Render the latest observed state and mark it seen.
    fn view(&mut self) -> StageView {
        match self {
            Stage::Upload(_, rx) => StageView::Upload(rx.borrow_and_update().clone()),
            Stage::Selection(c, rx) => StageView::Selection {
                state: rx.borrow_and_update().clone(),
                entries: c.selection().entries(),
            },
            Stage::Results(_, rx) => StageView::Results(rx.borrow_and_update().clone()),
        }
    }

    fn is_busy(&self) -> bool {
        match self {
            Stage::Upload(c, _) => c.is_busy(),
            Stage::Selection(c, _) => c.is_busy(),
            Stage::Results(..) => false,
        }
    }

    async fn settle(&mut self) {
        match self {
            Stage::Upload(c, _) => c.settle().await,
            Stage::Selection(c, _) => c.settle().await,
            Stage::Results(..) => {}
        }
    }

    /// Forward a stage-local command. Returns false when the current stage rejects it.
    fn apply(&mut self, cmd: UiCommand) -> bool {
        match (self, cmd) {
            (Stage::Upload(c, _), UiCommand::ChooseFile { path }) => {
                let name = path
                    .as_deref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned());
                c.choose_file(path, name);
                true
            }
            (Stage::Upload(c, _), UiCommand::PrepareAndLoad) => c.prepare_and_load(),
            (Stage::Upload(c, _), UiCommand::Retry) => c.retry(),
            (Stage::Upload(c, _), UiCommand::ClearSelection) => c.clear_selection(),
            (Stage::Selection(c, _), UiCommand::ToggleAlgorithm(name)) => c.toggle_selection(&name),
            (Stage::Selection(c, _), UiCommand::Run) => c.run(),
            (Stage::Selection(c, _), UiCommand::Acknowledge) => c.acknowledge_failure(),
            (Stage::Results(c, _), UiCommand::Refresh) => {
                c.refresh();
                true
            }
            _ => false,
        }
    }
}

struct Driver {
    ctx: PipelineContext,
    stage: Stage,
    signal_tx: UnboundedSender<StageSignal>,
    signal_rx: UnboundedReceiver<StageSignal>,
    event_tx: UnboundedSender<PipelineEvent>,
}

impl Driver {
    fn new(ctx: PipelineContext, event_tx: UnboundedSender<PipelineEvent>) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let stage = Stage::upload(IngestionController::new(ctx.clone(), signal_tx.clone()));
        Self {
            ctx,
            stage,
            signal_tx,
            signal_rx,
            event_tx,
        }
    }

    fn emit(&mut self) {
        let view = self.stage.view();
        let _ = self.event_tx.send(PipelineEvent::Snapshot(view));
    }

    fn info(&self, msg: impl Into<String>) {
        let _ = self.event_tx.send(PipelineEvent::Info(msg.into()));
    }

    fn upload(&self) -> Stage {
        Stage::upload(IngestionController::new(self.ctx.clone(), self.signal_tx.clone()))
    }

    fn selection(&self) -> Stage {
        Stage::selection(ExecutionController::new(
            self.ctx.clone(),
            self.signal_tx.clone(),
        ))
    }

    fn results(&self) -> Stage {
        Stage::results(ResultsController::new(self.ctx.clone()))
    }

    /// Apply queued stage signals. Only the stage that owns a signal may advance on it.
    /// Returns true when the stage changed.
    fn advance(&mut self) -> bool {
        let mut advanced = false;
        while let Ok(signal) = self.signal_rx.try_recv() {
            let next = match (&self.stage, signal) {
                (Stage::Upload(..), StageSignal::DatasetReady) => self.selection(),
                (Stage::Selection(..), StageSignal::ResultsReady) => self.results(),
                (_, signal) => {
                    debug!(?signal, "stage signal ignored");
                    continue;
                }
            };
            debug!(?signal, "advancing stage");
            self.stage = next;
            advanced = true;
        }
        advanced
    }

    /// Leave the current stage for the previous one. An in-flight task is abandoned.
    fn back(&mut self) -> bool {
        let prev = match self.stage {
            Stage::Upload(..) => return false,
            Stage::Selection(..) => self.upload(),
            Stage::Results(..) => self.selection(),
        };
        self.stage = prev;
        true
    }

    /// Returns whether the command was accepted.
    fn handle(&mut self, cmd: UiCommand) -> bool {
        let accepted = match cmd.clone() {
            UiCommand::Back => self.back(),
            cmd => self.stage.apply(cmd),
        };
        if !accepted {
            debug!(?cmd, "command ignored in current state");
            self.info(format!("{cmd:?} is not available right now"));
        }
        accepted
    }

    /// Release the published dataset's copy before the process goes away.
    async fn shutdown(self) {
        let Driver { ctx, stage, .. } = self;
        // Abandon any in-flight work before the handle is cleared.
        drop(stage);
        if let Some(handle) = ctx.store.clear_data_handle() {
            let _ = ctx.discard_copy(handle).await;
        }
    }
}

/// Drive the pipeline from UI commands and emit snapshots back to presentation layers.
/// Returns when `Quit` arrives or the command channel closes.
pub(crate) async fn run_controller(
    ctx: PipelineContext,
    event_tx: UnboundedSender<PipelineEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut driver = Driver::new(ctx, event_tx);
    driver.emit();

    loop {
        let mut dirty = false;
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Quit) | None => break,
                    Some(cmd) => dirty = driver.handle(cmd),
                }
            }
            // `settle` keeps the join handle until it completes, so losing this race is harmless.
            _ = async {
                if driver.stage.is_busy() {
                    driver.stage.settle().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {}
        }
        dirty |= driver.advance();
        if dirty || driver.stage.has_changed() {
            driver.emit();
        }
    }

    driver.shutdown().await;
    Ok(())
}
