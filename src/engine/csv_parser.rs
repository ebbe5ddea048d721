use crate::engine::DatasetParser;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{Column, ColumnKind, Dataset};
use std::io::Read;
use tracing::{debug, warn};

/// Header-first CSV reader. Trims fields, skips blank lines, rejects ragged rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvParser;

impl DatasetParser for CsvParser {
    fn parse(&self, reader: Box<dyn Read + Send>) -> PipelineResult<Dataset> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| PipelineError::Parse(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(PipelineError::Parse(
                "could not read a header row; the source is empty".into(),
            ));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| PipelineError::Parse(e.to_string()))?;
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }
            rows.push(record.iter().map(|f| f.to_string()).collect::<Vec<_>>());
        }

        if rows.is_empty() {
            warn!(features = headers.len(), "dataset has headers but no records");
        } else {
            debug!(records = rows.len(), features = headers.len(), "dataset parsed");
        }

        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(i, name)| Column {
                kind: infer_kind(&rows, i),
                name,
            })
            .collect();

        Ok(Dataset { columns, rows })
    }
}

/// Numeric when every non-empty cell parses as a float and at least one cell is present.
fn infer_kind(rows: &[Vec<String>], col: usize) -> ColumnKind {
    let mut seen = false;
    for cell in rows.iter().filter_map(|r| r.get(col)).filter(|c| !c.is_empty()) {
        if cell.parse::<f64>().is_err() {
            return ColumnKind::Text;
        }
        seen = true;
    }
    if seen {
        ColumnKind::Numeric
    } else {
        ColumnKind::Text
    }
}
