use crate::engine::DurableCopy;
use crate::error::{PipelineError, PipelineResult};
use crate::model::DataHandle;
use rand::Rng;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

const MAX_PREFIX_LEN: usize = 50;

/// Private, app-scoped directory holding durable copies of uploaded datasets.
#[derive(Debug, Clone)]
pub struct DatasetVault {
    root: PathBuf,
}

impl DatasetVault {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create a fresh, uniquely named file for `display_name`.
    fn create_target(&self, display_name: &str) -> io::Result<(PathBuf, File)> {
        fs::create_dir_all(&self.root)?;
        let (prefix, ext) = split_name(display_name);
        let mut rng = rand::thread_rng();
        loop {
            let suffix: u32 = rng.gen();
            let file_name = match ext.as_deref() {
                Some(ext) => format!("{prefix}_{suffix:08x}.{ext}"),
                None => format!("{prefix}_{suffix:08x}"),
            };
            let path = self.root.join(file_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

fn copy_into(source: &mut dyn Read, file: File) -> io::Result<u64> {
    let mut out = BufWriter::new(file);
    let n = io::copy(source, &mut out)?;
    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(n)
}

impl DurableCopy for DatasetVault {
    fn persist(&self, source: &mut dyn Read, display_name: &str) -> PipelineResult<DataHandle> {
        let (path, file) = self
            .create_target(display_name)
            .map_err(|e| PipelineError::io("failed to create dataset copy", e))?;

        match copy_into(source, file) {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes, "dataset copy written");
                Ok(DataHandle::new(path, display_name))
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&path) {
                    warn!(path = %path.display(), "failed to remove partial copy: {rm}");
                }
                Err(PipelineError::io("failed to write dataset copy", e))
            }
        }
    }

    fn discard(&self, handle: &DataHandle) -> PipelineResult<()> {
        match fs::remove_file(&handle.path) {
            Ok(()) => {
                debug!(path = %handle.path.display(), "dataset copy discarded");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::io("failed to delete dataset copy", e)),
        }
    }
}

/// Sanitized file-name prefix and extension for a display name.
fn split_name(display_name: &str) -> (String, Option<String>) {
    let (stem, ext) = match display_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(sanitize(ext))),
        _ => (display_name, None),
    };
    let mut prefix: String = sanitize(stem).chars().take(MAX_PREFIX_LEN).collect();
    if prefix.is_empty() {
        prefix.push_str("dataset");
    }
    (prefix, ext)
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
