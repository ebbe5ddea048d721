//! Result exports.

use crate::model::ExecutionResult;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

/// Serialized shape of an export: the dataset name plus its results.
#[derive(Debug, Serialize)]
struct ResultsExport<'a> {
    dataset: &'a str,
    exported_at_utc: String,
    results: &'a [ExecutionResult],
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Default export file name, e.g. `automl-results-2026-01-02_03-04-05.json`.
pub fn default_export_name(ext: &str) -> String {
    let now = OffsetDateTime::now_utc();
    let stamp = now
        .format(format_description!(
            "[year]-[month]-[day]_[hour]-[minute]-[second]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("automl-results-{stamp}.{ext}")
}

pub fn export_json(path: &Path, dataset: &str, results: &[ExecutionResult]) -> Result<()> {
    ensure_parent(path)?;
    let exported_at_utc = OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("format export timestamp")?;
    let body = serde_json::to_string_pretty(&ResultsExport {
        dataset,
        exported_at_utc,
        results,
    })?;
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn export_csv(path: &Path, results: &[ExecutionResult]) -> Result<()> {
    ensure_parent(path)?;
    let mut w = csv::Writer::from_path(path).with_context(|| format!("open {}", path.display()))?;
    for r in results {
        w.serialize(r)?;
    }
    w.flush()?;
    Ok(())
}

/// Absolute path for a default-named export in the current directory.
pub fn default_export_path(ext: &str) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("get current directory")?;
    Ok(cwd.join(default_export_name(ext)))
}
