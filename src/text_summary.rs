//! Text summary builder for CLI output.
//!
//! Formats a results table followed by aggregate lines for text mode.

use crate::metrics;
use crate::model::ExecutionResult;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".into())
}

/// Build the table and summary lines for a finished run.
pub(crate) fn build_text_summary(dataset: &str, results: &[ExecutionResult]) -> TextSummary {
    let mut lines = vec![format!("Dataset: {dataset}")];

    let width = results
        .iter()
        .map(|r| r.algorithm.len())
        .max()
        .unwrap_or(0)
        .max("Algorithm".len());
    lines.push(format!(
        "{:<width$}  {:>8}  {:>8}  {:>8}  {:>9}",
        "Algorithm", "Accuracy", "AUC-ROC", "Loss", "Time (ms)"
    ));
    for r in results {
        lines.push(format!(
            "{:<width$}  {:>8.4}  {:>8.4}  {:>8.4}  {:>9}",
            r.algorithm, r.accuracy, r.auc_roc, r.loss, r.execution_time_ms
        ));
    }

    let summary = metrics::summarize(results);
    if let Some((name, acc)) = summary.best.as_ref() {
        lines.push(format!("Best: {name} (accuracy {acc:.4})"));
    }
    lines.push(format!(
        "Mean accuracy {} / mean AUC-ROC {} over {} algorithm(s), {} ms total",
        fmt_opt(summary.mean_accuracy),
        fmt_opt(summary.mean_auc_roc),
        summary.count,
        summary.total_time_ms
    ));

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_one_row_per_result() {
        let results = vec![
            ExecutionResult {
                algorithm: "Genetic Algorithm".into(),
                accuracy: 0.9,
                auc_roc: 0.95,
                loss: 0.03,
                execution_time_ms: 12,
            },
            ExecutionResult {
                algorithm: "BPSO".into(),
                accuracy: 0.85,
                auc_roc: 0.9,
                loss: 0.05,
                execution_time_ms: 8,
            },
        ];
        let summary = build_text_summary("iris.csv", &results);
        assert_eq!(summary.lines[0], "Dataset: iris.csv");
        assert!(summary.lines[2].starts_with("Genetic Algorithm"));
        assert!(summary.lines[3].starts_with("BPSO"));
        assert!(summary
            .lines
            .iter()
            .any(|l| l == "Best: Genetic Algorithm (accuracy 0.9000)"));
        assert!(summary.lines.last().unwrap().contains("20 ms total"));
    }
}
