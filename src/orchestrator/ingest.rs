//! Upload stage controller.
//!
//! Idle → FileChosen → Processing → LoadSucceeded | Failed. Parsing and the durable copy run
//! on the I/O pool; the outcome is applied by `settle()` on the owning task.

use super::PipelineContext;
use crate::engine::open_source;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{DataHandle, StageSignal, UploadState};
use std::path::PathBuf;
use tokio::sync::{mpsc::UnboundedSender, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A finished background load, not yet published.
struct Loaded {
    name: String,
    handle: DataHandle,
}

pub(crate) struct IngestionController {
    ctx: PipelineContext,
    state_tx: watch::Sender<UploadState>,
    signal_tx: UnboundedSender<StageSignal>,
    pending: Option<JoinHandle<PipelineResult<Loaded>>>,
}

impl IngestionController {
    pub fn new(ctx: PipelineContext, signal_tx: UnboundedSender<StageSignal>) -> Self {
        let (state_tx, _) = watch::channel(UploadState::Idle);
        Self {
            ctx,
            state_tx,
            signal_tx,
            pending: None,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn set_state(&self, next: UploadState) {
        debug!(state = ?next, "upload state");
        self.state_tx.send_replace(next);
    }

    /// Unpublish the current handle and delete the copy behind it.
    fn drop_published(&self) {
        if let Some(previous) = self.ctx.store.clear_data_handle() {
            debug!(path = %previous.path.display(), "discarding unpublished copy");
            self.ctx.discard_copy(previous);
        }
    }

    /// A new selection invalidates the published handle before anything else happens.
    /// Either argument missing means the picker was cancelled.
    pub fn choose_file(&mut self, source: Option<PathBuf>, display_name: Option<String>) {
        let locked = matches!(
            self.state(),
            UploadState::Processing { .. } | UploadState::LoadSucceeded { .. }
        );
        match (source, display_name) {
            (Some(source), Some(name)) => {
                if locked {
                    debug!("file chosen while busy or finished; ignored");
                    return;
                }
                self.drop_published();
                info!(file = %name, "file chosen");
                self.set_state(UploadState::FileChosen { name, source });
            }
            _ => {
                warn!("file selection cancelled");
                if !locked {
                    self.set_state(UploadState::Idle);
                }
            }
        }
    }

    /// Parse the chosen file, then copy it into the vault. Returns false when not in
    /// `FileChosen` (including while a load is already in flight).
    pub fn prepare_and_load(&mut self) -> bool {
        let UploadState::FileChosen { name, source } = self.state() else {
            debug!("prepare_and_load ignored outside FileChosen");
            return false;
        };
        self.set_state(UploadState::Processing { name: name.clone() });

        let workers = self.ctx.workers.clone();
        let services = self.ctx.services.clone();
        self.pending = Some(tokio::spawn(async move {
            let parse_source = source.clone();
            let parser = services.parser.clone();
            let dataset = workers
                .io(move || parser.parse(open_source(&parse_source)?))
                .await?;
            debug!(
                records = dataset.record_count(),
                features = dataset.feature_count(),
                "upload parsed"
            );

            // Parsing consumed the stream; reopen it for the durable copy.
            let vault = services.vault.clone();
            let copy_name = name.clone();
            let handle = workers
                .io(move || {
                    let mut reader = open_source(&source)?;
                    vault.persist(&mut reader, &copy_name)
                })
                .await?;
            Ok::<_, PipelineError>(Loaded { name, handle })
        }));
        true
    }

    /// Wait for an in-flight load and apply its outcome. Returns immediately when idle.
    /// Cancel-safe: the join handle is kept until it has completed.
    pub async fn settle(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let joined = pending.await;
        self.pending = None;

        let outcome = joined.unwrap_or_else(|e| Err(PipelineError::Worker(e.to_string())));
        match outcome {
            Ok(Loaded { name, handle }) => {
                if let Some(previous) = self.ctx.store.publish_data_handle(handle.clone()) {
                    if previous != handle {
                        self.ctx.discard_copy(previous);
                    }
                }
                self.set_state(UploadState::LoadSucceeded { name, handle });
                let _ = self.signal_tx.send(StageSignal::DatasetReady);
            }
            Err(e) => {
                warn!("dataset load failed: {e}");
                self.drop_published();
                self.set_state(UploadState::Failed {
                    message: e.to_string(),
                });
            }
        }
    }

    pub fn retry(&mut self) -> bool {
        if !matches!(self.state(), UploadState::Failed { .. }) {
            return false;
        }
        self.drop_published();
        self.set_state(UploadState::Idle);
        true
    }

    /// Drop the published dataset and delete its durable copy.
    pub fn clear_selection(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.set_state(UploadState::Idle);
        self.drop_published();
        true
    }
}

impl Drop for IngestionController {
    // An abandoned load never publishes; remove the copy it leaves behind.
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let ctx = self.ctx.clone();
        rt.spawn(async move {
            if let Ok(Ok(loaded)) = pending.await {
                debug!(path = %loaded.handle.path.display(), "discarding copy from abandoned load");
                let _ = ctx.discard_copy(loaded.handle).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::{context, eventually, vault_files, write_csv};
    use tokio::sync::mpsc;

    fn controller(
        ctx: &PipelineContext,
    ) -> (IngestionController, mpsc::UnboundedReceiver<StageSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (IngestionController::new(ctx.clone(), tx), rx)
    }

    #[tokio::test]
    async fn test_load_publishes_durable_handle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let src = write_csv(dir.path(), "data.csv", "a,b,label\n1,2,0\n3,4,1\n");
        let (mut ingest, mut signals) = controller(&ctx);

        let observed = ingest.subscribe();
        ingest.choose_file(Some(src.clone()), Some("data.csv".into()));
        assert!(ingest.prepare_and_load());
        assert!(matches!(*observed.borrow(), UploadState::Processing { .. }));
        ingest.settle().await;
        assert!(matches!(*observed.borrow(), UploadState::LoadSucceeded { .. }));

        let UploadState::LoadSucceeded { name, handle } = ingest.state() else {
            panic!("unexpected state {:?}", ingest.state());
        };
        assert_eq!(name, "data.csv");
        assert_eq!(ctx.store.data_handle(), Some(handle.clone()));
        assert_ne!(handle.path, src);
        assert!(handle.exists());
        assert_eq!(signals.try_recv().unwrap(), StageSignal::DatasetReady);
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_choice_clears_published_handle_first() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.store
            .publish_data_handle(DataHandle::new(dir.path().join("old.csv"), "old.csv"));
        let (mut ingest, _signals) = controller(&ctx);

        ingest.choose_file(Some(dir.path().join("next.csv")), Some("next.csv".into()));
        assert!(ctx.store.data_handle().is_none());
        assert!(matches!(ingest.state(), UploadState::FileChosen { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_choice_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let (mut ingest, _signals) = controller(&ctx);
        ingest.choose_file(Some(dir.path().join("a.csv")), Some("a.csv".into()));
        ingest.choose_file(None, Some("a.csv".into()));
        assert_eq!(ingest.state(), UploadState::Idle);
    }

    #[tokio::test]
    async fn test_cancelled_choice_keeps_published_handle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let published = DataHandle::new(dir.path().join("kept.csv"), "kept.csv");
        ctx.store.publish_data_handle(published.clone());
        let (mut ingest, _signals) = controller(&ctx);
        ingest.choose_file(None, None);
        assert_eq!(ingest.state(), UploadState::Idle);
        assert_eq!(ctx.store.data_handle(), Some(published));
    }

    #[tokio::test]
    async fn test_second_prepare_while_processing_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let src = write_csv(dir.path(), "d.csv", "x\n1\n");
        let (mut ingest, _signals) = controller(&ctx);
        ingest.choose_file(Some(src), Some("d.csv".into()));
        assert!(ingest.prepare_and_load());
        assert!(!ingest.prepare_and_load());
        ingest.choose_file(Some(dir.path().join("e.csv")), Some("e.csv".into()));
        assert!(matches!(ingest.state(), UploadState::Processing { .. }));
        ingest.settle().await;
        assert!(matches!(ingest.state(), UploadState::LoadSucceeded { .. }));
    }

    #[tokio::test]
    async fn test_parse_failure_leaves_store_empty_and_allows_retry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let src = write_csv(dir.path(), "bad.csv", "a,b\n1,2\n3\n");
        let (mut ingest, mut signals) = controller(&ctx);

        ingest.choose_file(Some(src), Some("bad.csv".into()));
        ingest.prepare_and_load();
        ingest.settle().await;

        let UploadState::Failed { message } = ingest.state() else {
            panic!("expected failure");
        };
        assert!(message.contains("parse"));
        assert!(ctx.store.data_handle().is_none());
        assert!(signals.try_recv().is_err());
        // Nothing was copied because parsing failed first.
        assert!(!ctx.config.vault_dir.exists());

        assert!(ingest.retry());
        assert_eq!(ingest.state(), UploadState::Idle);
        assert!(!ingest.retry());
    }

    #[tokio::test]
    async fn test_copy_failure_reports_io_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = crate::orchestrator::testing::config(dir.path());
        // A regular file where the vault directory should be.
        let blocker = write_csv(dir.path(), "blocker", "");
        cfg.vault_dir = blocker.join("vault");
        let ctx = PipelineContext::new(cfg).unwrap();
        let src = write_csv(dir.path(), "ok.csv", "a\n1\n");
        let (mut ingest, _signals) = controller(&ctx);

        ingest.choose_file(Some(src), Some("ok.csv".into()));
        ingest.prepare_and_load();
        ingest.settle().await;

        let UploadState::Failed { message } = ingest.state() else {
            panic!("expected failure");
        };
        assert!(message.starts_with("I/O failure"));
        assert!(ctx.store.data_handle().is_none());
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let (mut ingest, _signals) = controller(&ctx);
        ingest.choose_file(Some(dir.path().join("nope.csv")), Some("nope.csv".into()));
        ingest.prepare_and_load();
        ingest.settle().await;
        assert!(matches!(ingest.state(), UploadState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_clear_selection_deletes_copy() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let src = write_csv(dir.path(), "c.csv", "a\n1\n");
        let (mut ingest, _signals) = controller(&ctx);
        ingest.choose_file(Some(src), Some("c.csv".into()));
        ingest.prepare_and_load();
        ingest.settle().await;
        let handle = ctx.store.data_handle().unwrap();

        assert!(ingest.clear_selection());
        assert!(ctx.store.data_handle().is_none());
        assert_eq!(ingest.state(), UploadState::Idle);
        eventually(|| !handle.exists()).await;
        assert!(!handle.exists());
    }

    #[tokio::test]
    async fn test_replacing_a_dataset_discards_the_old_copy() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let a = write_csv(dir.path(), "a.csv", "x\n1\n");
        let b = write_csv(dir.path(), "b.csv", "x\n2\n");

        let (mut first, _signals) = controller(&ctx);
        first.choose_file(Some(a), Some("a.csv".into()));
        first.prepare_and_load();
        first.settle().await;
        let old = ctx.store.data_handle().unwrap();
        drop(first);

        let (mut second, _signals) = controller(&ctx);
        second.choose_file(Some(b), Some("b.csv".into()));
        second.prepare_and_load();
        second.settle().await;
        let current = ctx.store.data_handle().unwrap();

        eventually(|| !old.exists()).await;
        assert!(!old.exists());
        assert!(current.exists());
        assert_eq!(vault_files(&ctx), 1);
    }

    #[tokio::test]
    async fn test_dropping_mid_load_discards_copy_and_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let src = write_csv(dir.path(), "gone.csv", "a,b\n1,2\n3,4\n");
        let (mut ingest, mut signals) = controller(&ctx);
        ingest.choose_file(Some(src), Some("gone.csv".into()));
        assert!(ingest.prepare_and_load());
        assert!(matches!(ingest.state(), UploadState::Processing { .. }));
        drop(ingest);

        // The abandoned load still finishes its copy before the cleanup removes it.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        eventually(|| vault_files(&ctx) == 0).await;
        assert_eq!(vault_files(&ctx), 0);
        assert!(ctx.store.data_handle().is_none());
        assert!(signals.try_recv().is_err());
    }
}
