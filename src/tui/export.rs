use crate::model::ExecutionResult;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Clipboard writes are serialized through one long-lived thread, started on first use.
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

fn dataset_label(state: &UiState) -> &str {
    state.dataset_name.as_deref().unwrap_or("unknown")
}

/// Export results as JSON into the current directory. Returns the absolute path.
pub fn export_results_json(results: &[ExecutionResult], state: &UiState) -> Result<PathBuf> {
    let path = crate::storage::default_export_path("json")?;
    crate::storage::export_json(&path, dataset_label(state), results)?;
    Ok(path)
}

/// Export results as CSV into the current directory. Returns the absolute path.
pub fn export_results_csv(results: &[ExecutionResult]) -> Result<PathBuf> {
    let path = crate::storage::default_export_path("csv")?;
    crate::storage::export_csv(&path, results)?;
    Ok(path)
}

/// Export and report the outcome in the footer.
pub fn export_and_show_path(state: &mut UiState, csv: bool) {
    let Some(results) = state.results().map(|r| r.to_vec()) else {
        state.info = "No results to export yet.".into();
        return;
    };
    let (kind, outcome) = if csv {
        ("CSV", export_results_csv(&results))
    } else {
        ("JSON", export_results_json(&results, state))
    };
    match outcome {
        Ok(p) => {
            state.last_exported_path = Some(p.to_string_lossy().into_owned());
            state.info = format!("Exported {kind}: {} (press 'y' to copy path)", p.display());
        }
        Err(e) => state.info = format!("{kind} export failed: {e:#}"),
    }
}

fn clipboard_sender() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::spawn(move || {
            for text in rx {
                if let Ok(mut clipboard) = arboard::Clipboard::new() {
                    // Clipboard managers on Linux read lazily; keep the owner alive a while.
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });
        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue `text` for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    clipboard_sender()?
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))
}
