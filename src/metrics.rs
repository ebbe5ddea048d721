use crate::model::ExecutionResult;
use serde::Serialize;

/// Aggregate view over one run's results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub count: usize,
    /// Algorithm with the highest accuracy, and that accuracy.
    pub best: Option<(String, f64)>,
    pub mean_accuracy: Option<f64>,
    pub mean_auc_roc: Option<f64>,
    pub total_time_ms: u64,
}

/// Mean of the finite values; `None` when there are none.
fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Compute summary metrics. NaN metrics are skipped rather than poisoning the aggregates.
pub fn summarize(results: &[ExecutionResult]) -> RunSummary {
    let best = results
        .iter()
        .filter(|r| r.accuracy.is_finite())
        .max_by(|a, b| a.accuracy.total_cmp(&b.accuracy))
        .map(|r| (r.algorithm.clone(), r.accuracy));

    RunSummary {
        count: results.len(),
        best,
        mean_accuracy: finite_mean(results.iter().map(|r| r.accuracy)),
        mean_auc_roc: finite_mean(results.iter().map(|r| r.auc_roc)),
        total_time_ms: results.iter().map(|r| r.execution_time_ms).sum(),
    }
}
