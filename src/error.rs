use thiserror::Error;

/// Failures raised by background pipeline work. Carried inside stage states, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Failed to parse dataset: {0}")]
    Parse(String),

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Dataset is no longer available: {0}")]
    HandleInvalid(String),

    #[error("Please select at least one algorithm.")]
    NoSelection,

    #[error("Failed to load data: {0}")]
    DatasetLoad(Box<PipelineError>),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Background worker failed: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn io(context: &str, err: std::io::Error) -> Self {
        PipelineError::Io(format!("{context}: {err}"))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
