use crate::model::{PipelineConfig, ResultsState, SelectionState, StageSignal, UploadState};
use crate::orchestrator::{
    process_results, ExecutionController, IngestionController, PipelineContext,
    ResultsController,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "automl-cli",
    version,
    about = "Run ML algorithms against a CSV dataset, with optional TUI"
)]
pub struct Cli {
    /// CSV dataset to upload (runs headless when given)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Comma-separated algorithms to run, e.g. "Genetic Algorithm,BPSO"
    #[arg(long, value_delimiter = ',')]
    pub algorithms: Vec<String>,

    /// Print JSON result and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Export results as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export results as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Directory holding private copies of uploaded datasets
    #[arg(long)]
    pub vault_dir: Option<PathBuf>,

    /// Worker threads for algorithm execution (default: available cores)
    #[arg(long)]
    pub cpu_threads: Option<usize>,

    /// How long an empty-selection error stays up before clearing itself
    #[arg(long, default_value = "2s")]
    pub ack_delay: humantime::Duration,

    /// Multiplier for simulated algorithm running times (0 disables the delay)
    #[arg(long, default_value_t = 1.0)]
    pub time_scale: f64,

    /// Extra execution option, repeatable (e.g. --option seed=7)
    #[arg(long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}

impl Cli {
    /// Any of these flags selects the non-interactive path.
    pub fn is_headless(&self) -> bool {
        self.file.is_some()
            || self.json
            || self.text
            || self.export_json.is_some()
            || self.export_csv.is_some()
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if !args.is_headless() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            bail!("built without TUI support; pass --file to run headless");
        }
    }

    run_headless(args).await
}

fn default_vault_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("automl-cli")
        .join("datasets")
}

/// Parse `key=value`; the value is taken as JSON when it parses, otherwise as a string.
fn parse_option(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("option '{raw}' is not of the form key=value"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("option '{raw}' has an empty key");
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

/// Build a `PipelineConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<PipelineConfig> {
    if !args.time_scale.is_finite() || args.time_scale < 0.0 {
        bail!("--time-scale must be a non-negative number");
    }
    let cpu_threads = match args.cpu_threads {
        Some(0) => bail!("--cpu-threads must be at least 1"),
        Some(n) => n,
        None => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4),
    };
    let mut options = serde_json::Map::new();
    for raw in &args.options {
        let (k, v) = parse_option(raw)?;
        options.insert(k, v);
    }
    Ok(PipelineConfig {
        vault_dir: args.vault_dir.clone().unwrap_or_else(default_vault_dir),
        cpu_threads,
        ack_delay: Duration::from(args.ack_delay),
        time_scale: args.time_scale,
        options,
    })
}

/// Walk the three stages without a UI: upload `--file`, run `--algorithms`, print results.
async fn run_headless(args: Cli) -> Result<()> {
    let source = args
        .file
        .clone()
        .context("--file is required when running without the TUI")?;
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("--file must name a file")?;
    let ctx = PipelineContext::new(build_config(&args)?)?;
    let outcome = walk_stages(&args, &ctx, source, name).await;
    // The copy only lives as long as this process.
    if let Some(handle) = ctx.store.clear_data_handle() {
        let _ = ctx.discard_copy(handle).await;
    }
    outcome
}

async fn walk_stages(
    args: &Cli,
    ctx: &PipelineContext,
    source: PathBuf,
    name: String,
) -> Result<()> {
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

    let mut ingest = IngestionController::new(ctx.clone(), signal_tx.clone());
    ingest.choose_file(Some(source), Some(name.clone()));
    ingest.prepare_and_load();
    ingest.settle().await;
    if let UploadState::Failed { message } = ingest.state() {
        bail!(message);
    }
    if signal_rx.try_recv().ok() != Some(StageSignal::DatasetReady) {
        bail!("upload did not complete");
    }
    drop(ingest);

    let mut exec = ExecutionController::new(ctx.clone(), signal_tx);
    if let SelectionState::NoHandle = exec.state() {
        bail!("uploaded dataset is no longer available");
    }
    for algorithm in &args.algorithms {
        if !exec.toggle_selection(algorithm.trim()) {
            bail!(
                "unknown algorithm '{}'; choose from: {}",
                algorithm.trim(),
                crate::model::ALGORITHM_CATALOG.join(", ")
            );
        }
    }
    exec.run();
    // An empty selection fails synchronously; settling would only wait out the auto-return.
    if let SelectionState::RunFailed { message } = exec.state() {
        bail!(message);
    }
    exec.settle().await;
    if let SelectionState::RunFailed { message } = exec.state() {
        bail!(message);
    }
    if signal_rx.try_recv().ok() != Some(StageSignal::ResultsReady) {
        bail!("run did not complete");
    }
    drop(exec);

    let results = match ResultsController::new(ctx.clone()).state() {
        ResultsState::Succeeded { results } => results,
        ResultsState::NoResults => bail!("no results"),
        ResultsState::Failed { message } => bail!(message),
        ResultsState::Loading => bail!("results not ready"),
    };
    info!(count = results.len(), "run complete");

    let processed = process_results(args, &name, &results);
    let (out_tx, out_handle) = spawn_output_writer();
    if args.json {
        let out = serde_json::to_string_pretty(&serde_json::json!({
            "dataset": name,
            "results": results,
            "summary": processed.summary,
        }))?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(&name, &results).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_parses_flags() {
        let args = Cli::parse_from([
            "automl-cli",
            "--algorithms",
            "Genetic Algorithm,BPSO",
            "--cpu-threads",
            "3",
            "--ack-delay",
            "500ms",
            "--time-scale",
            "0.5",
            "--option",
            "seed=7",
            "--option",
            "label=target",
            "--vault-dir",
            "/tmp/vault",
        ]);
        assert_eq!(args.algorithms, vec!["Genetic Algorithm", "BPSO"]);
        let cfg = build_config(&args).unwrap();
        assert_eq!(cfg.cpu_threads, 3);
        assert_eq!(cfg.ack_delay, Duration::from_millis(500));
        assert_eq!(cfg.time_scale, 0.5);
        assert_eq!(cfg.options["seed"], 7);
        assert_eq!(cfg.options["label"], "target");
        assert_eq!(cfg.vault_dir, PathBuf::from("/tmp/vault"));
    }

    #[test]
    fn test_defaults() {
        let args = Cli::parse_from(["automl-cli"]);
        assert!(!args.is_headless());
        let cfg = build_config(&args).unwrap();
        assert_eq!(cfg.ack_delay, Duration::from_secs(2));
        assert!(cfg.cpu_threads >= 1);
        assert!(cfg.vault_dir.ends_with("automl-cli/datasets"));
    }

    #[test]
    fn test_rejects_bad_options() {
        assert!(parse_option("novalue").is_err());
        assert!(parse_option("=1").is_err());
        let args = Cli::parse_from(["automl-cli", "--cpu-threads", "0"]);
        assert!(build_config(&args).is_err());
    }

    #[tokio::test]
    async fn test_headless_run_exports_results() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("d.csv");
        std::fs::write(&data, "x,y\n1,0\n2,1\n").unwrap();
        let out = dir.path().join("out.csv");
        let args = Cli::parse_from([
            "automl-cli",
            "--file",
            data.to_str().unwrap(),
            "--algorithms",
            "ASO,NNP",
            "--time-scale",
            "0",
            "--vault-dir",
            dir.path().join("vault").to_str().unwrap(),
            "--export-csv",
            out.to_str().unwrap(),
        ]);
        run_headless(args).await.unwrap();
        let body = std::fs::read_to_string(&out).unwrap();
        assert_eq!(body.lines().count(), 3);
        let vault = std::fs::read_dir(dir.path().join("vault")).unwrap();
        assert_eq!(vault.count(), 0);
    }

    #[tokio::test]
    async fn test_headless_run_requires_selection() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("d.csv");
        std::fs::write(&data, "x\n1\n").unwrap();
        let args = Cli::parse_from([
            "automl-cli",
            "--file",
            data.to_str().unwrap(),
            "--vault-dir",
            dir.path().join("vault").to_str().unwrap(),
        ]);
        let err = run_headless(args).await.unwrap_err();
        assert_eq!(err.to_string(), "Please select at least one algorithm.");
        // The failed run still removes its copy.
        let vault = std::fs::read_dir(dir.path().join("vault")).unwrap();
        assert_eq!(vault.count(), 0);
    }
}
