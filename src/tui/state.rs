use crate::model::{ExecutionResult, ResultsState, SelectionState, UploadState};
use crate::orchestrator::{PipelineEvent, StageView};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};

/// Presentation state. Owned by the UI thread; only updated from `PipelineEvent`s and keys.
pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub view: StageView,
    /// Cursor into the algorithm list on the selection stage.
    pub cursor: usize,
    pub path_input: String,
    pub editing_path: bool,
    /// Name of the last successfully uploaded dataset, for export metadata.
    pub dataset_name: Option<String>,
    pub last_exported_path: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            info: "Press 'o' to choose a CSV file".into(),
            view: StageView::Upload(UploadState::Idle),
            cursor: 0,
            path_input: String::new(),
            editing_path: false,
            dataset_name: None,
            last_exported_path: None,
        }
    }
}

impl UiState {
    pub fn apply_event(&mut self, ev: PipelineEvent) {
        match ev {
            PipelineEvent::Info(msg) => self.info = msg,
            PipelineEvent::Snapshot(view) => {
                if let Some(msg) = transition_message(&self.view, &view) {
                    self.info = msg;
                }
                if let StageView::Upload(UploadState::LoadSucceeded { name, .. }) = &view {
                    self.dataset_name = Some(name.clone());
                }
                if let StageView::Selection { entries, .. } = &view {
                    self.cursor = self.cursor.min(entries.len().saturating_sub(1));
                }
                self.view = view;
            }
        }
    }

    pub fn results(&self) -> Option<&[ExecutionResult]> {
        match &self.view {
            StageView::Results(ResultsState::Succeeded { results }) => Some(results),
            _ => None,
        }
    }

    /// Catalog name under the cursor, if the selection stage is showing.
    pub fn cursor_algorithm(&self) -> Option<&str> {
        match &self.view {
            StageView::Selection { entries, .. } => {
                entries.get(self.cursor).map(|(name, _)| name.as_str())
            }
            _ => None,
        }
    }

    pub fn move_cursor(&mut self, down: bool) {
        let len = match &self.view {
            StageView::Selection { entries, .. } => entries.len(),
            _ => return,
        };
        if down {
            self.cursor = (self.cursor + 1).min(len.saturating_sub(1));
        } else {
            self.cursor = self.cursor.saturating_sub(1);
        }
    }

    /// One status line for the current stage.
    pub fn status_line(&self) -> Line<'static> {
        let (label, color) = match &self.view {
            StageView::Upload(s) => match s {
                UploadState::Idle => ("No file selected".to_string(), Color::Gray),
                UploadState::FileChosen { name, .. } => {
                    (format!("Selected: {name} (press Enter to load)"), Color::Cyan)
                }
                UploadState::Processing { name } => (format!("Processing {name}…"), Color::Yellow),
                UploadState::LoadSucceeded { name, .. } => (format!("Loaded {name}"), Color::Green),
                UploadState::Failed { message } => (message.clone(), Color::Red),
            },
            StageView::Selection { state, .. } => match state {
                SelectionState::LoadingHandle => ("Checking dataset…".to_string(), Color::Yellow),
                SelectionState::Idle { dataset_label } => (dataset_label.clone(), Color::Cyan),
                SelectionState::NoHandle => (
                    "No dataset loaded. Go back and upload one.".to_string(),
                    Color::Red,
                ),
                SelectionState::Running { algorithms } => {
                    (format!("Running {}…", algorithms.join(", ")), Color::Yellow)
                }
                SelectionState::Succeeded { result_count } => {
                    (format!("Finished {result_count} algorithm(s)"), Color::Green)
                }
                SelectionState::RunFailed { message } => (message.clone(), Color::Red),
            },
            StageView::Results(s) => match s {
                ResultsState::Loading => ("Loading results…".to_string(), Color::Yellow),
                ResultsState::Succeeded { results } => {
                    (format!("{} result(s)", results.len()), Color::Green)
                }
                ResultsState::NoResults => ("No results available".to_string(), Color::Gray),
                ResultsState::Failed { message } => (message.clone(), Color::Red),
            },
        };
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::styled(label, Style::default().fg(color)),
        ])
    }
}

/// Footer message when the stage itself changes.
fn transition_message(prev: &StageView, next: &StageView) -> Option<String> {
    match (prev, next) {
        (StageView::Upload(_), StageView::Selection { .. }) => {
            Some("Dataset ready. Space toggles, Enter runs.".into())
        }
        (StageView::Selection { .. }, StageView::Results(_)) => {
            Some("Run complete. 'e'/'c' export, 'b' goes back.".into())
        }
        (StageView::Results(_), StageView::Selection { .. }) => Some("Back to selection".into()),
        (StageView::Selection { .. }, StageView::Upload(_)) => Some("Back to upload".into()),
        _ => None,
    }
}
