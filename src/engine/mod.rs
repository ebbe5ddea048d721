mod algorithms;
mod csv_parser;
mod vault;

pub use algorithms::MockExecutor;
pub use csv_parser::CsvParser;
pub use vault::DatasetVault;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{DataHandle, Dataset, ExecutionResult, PipelineConfig};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Free-form options forwarded to the executor.
pub type ExecutionOptions = serde_json::Map<String, serde_json::Value>;

/// Turns a byte stream into a `Dataset`, consuming the stream fully.
pub trait DatasetParser: Send + Sync {
    fn parse(&self, reader: Box<dyn Read + Send>) -> PipelineResult<Dataset>;
}

/// Produces a long-lived private copy of a stream.
pub trait DurableCopy: Send + Sync {
    fn persist(&self, source: &mut dyn Read, display_name: &str) -> PipelineResult<DataHandle>;
    fn discard(&self, handle: &DataHandle) -> PipelineResult<()>;
}

/// Runs named algorithms against a dataset. All-or-nothing: one result per name, or an error.
pub trait AlgorithmExecutor: Send + Sync {
    fn execute(
        &self,
        dataset: &Dataset,
        names: &[String],
        options: &ExecutionOptions,
    ) -> PipelineResult<Vec<ExecutionResult>>;
}

/// The collaborators every controller talks to.
#[derive(Clone)]
pub struct Services {
    pub parser: Arc<dyn DatasetParser>,
    pub vault: Arc<dyn DurableCopy>,
    pub executor: Arc<dyn AlgorithmExecutor>,
}

impl Services {
    /// Default wiring: CSV parser, on-disk vault, simulated executor.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            parser: Arc::new(CsvParser),
            vault: Arc::new(DatasetVault::new(cfg.vault_dir.clone())),
            executor: Arc::new(MockExecutor::new(cfg.time_scale)),
        }
    }

    /// Reload a dataset from its durable copy. Blocking.
    pub fn load_dataset(&self, handle: &DataHandle) -> PipelineResult<Dataset> {
        if !handle.exists() {
            return Err(PipelineError::HandleInvalid(format!(
                "{} is missing",
                handle.path.display()
            )));
        }
        let is_csv = handle
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            return Err(PipelineError::Io(format!(
                "unsupported file type: {}",
                handle.path.display()
            )));
        }
        debug!(path = %handle.path.display(), "reloading dataset");
        self.parser.parse(open_source(handle.path())?)
    }
}

/// Open a chosen resource for streaming reads.
pub fn open_source(path: &Path) -> PipelineResult<Box<dyn Read + Send>> {
    let file = File::open(path)
        .map_err(|e| PipelineError::io(&format!("failed to open {}", path.display()), e))?;
    Ok(Box::new(BufReader::new(file)))
}
