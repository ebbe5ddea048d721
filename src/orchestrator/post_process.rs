//! Post-run processing utilities.
//!
//! Summarizes a finished run and performs the exports requested on the command line.

use crate::cli::Cli;
use crate::metrics::{self, RunSummary};
use crate::model::ExecutionResult;
use crate::storage;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedResults {
    pub summary: RunSummary,
    pub export_messages: Vec<String>,
}

/// Summarize `results` and write any requested exports. Export failures are reported as
/// messages rather than failing the run.
pub(crate) fn process_results(
    args: &Cli,
    dataset: &str,
    results: &[ExecutionResult],
) -> ProcessedResults {
    let mut export_messages = Vec::new();
    if let Some(export_path) = args.export_json.as_deref() {
        match storage::export_json(export_path, dataset, results) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = args.export_csv.as_deref() {
        match storage::export_csv(export_path, results) {
            Ok(_) => export_messages.push(format!("Exported CSV: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export CSV failed: {e:#}")),
        }
    }

    ProcessedResults {
        summary: metrics::summarize(results),
        export_messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_exports_report_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("r.json");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let csv = blocker.join("r.csv");
        let args = Cli::parse_from([
            "automl-cli",
            "--export-json",
            json.to_str().unwrap(),
            "--export-csv",
            csv.to_str().unwrap(),
        ]);
        let results = vec![ExecutionResult {
            algorithm: "ASO".into(),
            accuracy: 0.88,
            auc_roc: 0.9,
            loss: 0.05,
            execution_time_ms: 3,
        }];

        let processed = process_results(&args, "d.csv", &results);
        assert_eq!(processed.summary.count, 1);
        assert!(processed.export_messages[0].starts_with("Exported JSON"));
        assert!(processed.export_messages[1].starts_with("Export CSV failed"));
        assert!(json.exists());
    }
}
