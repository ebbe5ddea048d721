use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Supported algorithm names, in display and execution order.
pub const ALGORITHM_CATALOG: [&str; 6] = ["Genetic Algorithm", "IGPSO", "WWO", "BPSO", "ASO", "NNP"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Private directory holding durable copies of uploaded datasets.
    pub vault_dir: PathBuf,
    pub cpu_threads: usize,
    /// How long an empty-selection failure stays visible before returning to Idle.
    #[serde(with = "humantime_serde")]
    pub ack_delay: Duration,
    /// Multiplier applied to each algorithm's simulated running time.
    pub time_scale: f64,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Durable reference to a validated dataset copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHandle {
    pub path: PathBuf,
    pub display_name: String,
}

impl DataHandle {
    pub fn new(path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file is still present.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Parsed tabular data. Never stored in the pipeline store; reloaded from a `DataHandle`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub algorithm: String,
    pub accuracy: f64,
    pub auc_roc: f64,
    pub loss: f64,
    pub execution_time_ms: u64,
}

/// Contents of the store's result slot: the names a run asked for and what it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub requested: Vec<String>,
    pub results: Vec<ExecutionResult>,
}

impl ResultSet {
    /// One result per requested algorithm.
    pub fn is_complete(&self) -> bool {
        self.requested.len() == self.results.len()
    }
}

/// Selected flag per catalog entry. Keys never change after construction.
#[derive(Debug, Clone)]
pub struct AlgorithmSelection {
    flags: Vec<(&'static str, bool)>,
}

impl Default for AlgorithmSelection {
    fn default() -> Self {
        Self {
            flags: ALGORITHM_CATALOG.iter().map(|name| (*name, false)).collect(),
        }
    }
}

impl AlgorithmSelection {
    /// Flip `name`; returns the new flag, or `None` when `name` is not in the catalog.
    pub fn toggle(&mut self, name: &str) -> Option<bool> {
        let entry = self.flags.iter_mut().find(|(n, _)| *n == name)?;
        entry.1 = !entry.1;
        Some(entry.1)
    }

    /// Names currently flagged, in catalog order.
    pub fn selected(&self) -> Vec<String> {
        self.flags
            .iter()
            .filter(|(_, on)| *on)
            .map(|(n, _)| n.to_string())
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, bool)> {
        self.flags.iter().map(|(n, on)| (n.to_string(), *on)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    FileChosen { name: String, source: PathBuf },
    Processing { name: String },
    LoadSucceeded { name: String, handle: DataHandle },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionState {
    LoadingHandle,
    Idle { dataset_label: String },
    NoHandle,
    Running { algorithms: Vec<String> },
    Succeeded { result_count: usize },
    RunFailed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultsState {
    Loading,
    Succeeded { results: Vec<ExecutionResult> },
    NoResults,
    Failed { message: String },
}

/// Emitted once when a stage's visit completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSignal {
    DatasetReady,
    ResultsReady,
}
