//! Simulated algorithm execution.
//!
//! Each catalog entry sleeps for a nominal running time (scaled) and reports metrics drawn
//! from an RNG seeded by the algorithm name, so repeated runs are reproducible.

use crate::engine::{AlgorithmExecutor, ExecutionOptions};
use crate::error::{PipelineError, PipelineResult};
use crate::model::{Dataset, ExecutionResult, ALGORITHM_CATALOG};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Nominal running time per algorithm, in milliseconds.
fn nominal_ms(name: &str) -> Option<u64> {
    match name {
        "Genetic Algorithm" => Some(2500),
        "IGPSO" => Some(1800),
        "WWO" => Some(1500),
        "BPSO" => Some(1200),
        "ASO" => Some(2000),
        "NNP" => Some(900),
        _ => None,
    }
}

/// FNV-1a; stable across builds and platforms, unlike `DefaultHasher`.
fn name_seed(name: &str) -> u64 {
    name.bytes().fold(0xcbf29ce484222325u64, |h, b| {
        (h ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[derive(Debug, Clone)]
pub struct MockExecutor {
    time_scale: f64,
}

impl MockExecutor {
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale: time_scale.max(0.0),
        }
    }

    fn run_one(
        &self,
        name: &str,
        dataset: &Dataset,
        time_scale: f64,
        seed: u64,
    ) -> PipelineResult<ExecutionResult> {
        let nominal = nominal_ms(name)
            .ok_or_else(|| PipelineError::Execution(format!("unknown algorithm '{name}'")))?;
        debug!(
            algorithm = name,
            records = dataset.record_count(),
            features = dataset.feature_count(),
            "running algorithm"
        );

        let started = Instant::now();
        let simulated = Duration::try_from_secs_f64(nominal as f64 / 1000.0 * time_scale)
            .map_err(|e| {
                PipelineError::Execution(format!("time scale {time_scale} is unusable: {e}"))
            })?;
        if !simulated.is_zero() {
            std::thread::sleep(simulated);
        }

        let mut rng = StdRng::seed_from_u64(name_seed(name) ^ seed);
        let accuracy: f64 = 0.80 + rng.gen::<f64>() * 0.18;
        let auc_roc: f64 = 0.85 + rng.gen::<f64>() * 0.14;
        let loss: f64 = 0.02 + rng.gen::<f64>() * 0.1;

        Ok(ExecutionResult {
            algorithm: name.to_string(),
            accuracy: accuracy.clamp(0.0, 1.0),
            auc_roc: auc_roc.clamp(0.0, 1.0),
            loss: loss.max(0.0),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

impl AlgorithmExecutor for MockExecutor {
    fn execute(
        &self,
        dataset: &Dataset,
        names: &[String],
        options: &ExecutionOptions,
    ) -> PipelineResult<Vec<ExecutionResult>> {
        if dataset.record_count() == 0 {
            return Err(PipelineError::Execution(
                "cannot execute on a dataset without records".into(),
            ));
        }
        if let Some(bad) = names.iter().find(|n| !ALGORITHM_CATALOG.contains(&n.as_str())) {
            return Err(PipelineError::Execution(format!("unknown algorithm '{bad}'")));
        }

        let time_scale = options
            .get("time_scale")
            .and_then(|v| v.as_f64())
            .unwrap_or(self.time_scale)
            .max(0.0);
        let seed = options.get("seed").and_then(|v| v.as_u64()).unwrap_or(0);

        info!(count = names.len(), "executing algorithms");
        // Ordered collect keeps results aligned with `names`.
        names
            .par_iter()
            .map(|name| self.run_one(name, dataset, time_scale, seed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, ColumnKind};

    fn dataset(rows: usize) -> Dataset {
        Dataset {
            columns: vec![Column {
                name: "x".into(),
                kind: ColumnKind::Numeric,
            }],
            rows: (0..rows).map(|i| vec![i.to_string()]).collect(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_results_follow_requested_order() {
        let exec = MockExecutor::new(0.0);
        let out = exec
            .execute(&dataset(3), &names(&["Genetic Algorithm", "BPSO"]), &ExecutionOptions::new())
            .unwrap();
        let got: Vec<_> = out.iter().map(|r| r.algorithm.as_str()).collect();
        assert_eq!(got, vec!["Genetic Algorithm", "BPSO"]);
        for r in &out {
            assert!((0.80..=0.98).contains(&r.accuracy));
            assert!((0.85..=0.99).contains(&r.auc_roc));
            assert!(r.loss >= 0.02);
        }
    }

    #[test]
    fn test_metrics_are_reproducible() {
        let exec = MockExecutor::new(0.0);
        let opts = ExecutionOptions::new();
        let a = exec.execute(&dataset(1), &names(&["WWO"]), &opts).unwrap();
        let b = exec.execute(&dataset(1), &names(&["WWO"]), &opts).unwrap();
        assert_eq!(a[0].accuracy, b[0].accuracy);
        assert_eq!(a[0].loss, b[0].loss);
    }

    #[test]
    fn test_empty_dataset_fails_whole_run() {
        let exec = MockExecutor::new(0.0);
        let err = exec
            .execute(&dataset(0), &names(&["ASO"]), &ExecutionOptions::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Execution(_)));
    }

    #[test]
    fn test_unknown_name_fails_whole_run() {
        let exec = MockExecutor::new(0.0);
        let err = exec
            .execute(&dataset(2), &names(&["NNP", "SVM"]), &ExecutionOptions::new())
            .unwrap_err();
        assert!(err.to_string().contains("SVM"));
    }

    #[test]
    fn test_oversized_time_scale_is_an_execution_error() {
        let exec = MockExecutor::new(0.0);
        let mut opts = ExecutionOptions::new();
        opts.insert("time_scale".into(), serde_json::json!(1e300));
        let err = exec.execute(&dataset(1), &names(&["NNP"]), &opts).unwrap_err();
        assert!(matches!(err, PipelineError::Execution(ref m) if m.contains("time scale")));
    }
}
