//! Output writer
//!
//! Mirrors source-relative paths under a target's output root. Every output
//! path is claimed by exactly one source file per target; a second source
//! mapping to the same path is refused instead of silently overwriting it.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;

use crate::error::WriteError;

/// Shared writer for one build
#[derive(Debug, Default)]
pub struct OutputWriter {
    /// (target, relative output path) -> source that owns it
    claimed: Mutex<HashMap<(String, PathBuf), PathBuf>>,
    written: AtomicUsize,
}

impl OutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `relative` under `target` for `source`.
    ///
    /// Claiming a path already owned by the same source succeeds.
    pub fn claim(&self, target: &str, relative: &Path, source: &Path) -> Result<(), WriteError> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (target.to_string(), relative.to_path_buf());

        match claimed.get(&key) {
            Some(owner) if owner != source => Err(WriteError::Collision {
                target: target.to_string(),
                path: relative.to_path_buf(),
                claimed_by: owner.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                claimed.insert(key, source.to_path_buf());
                Ok(())
            }
        }
    }

    /// Write `content` to `output_root/relative`, creating parent directories.
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// readers never observe partial output.
    pub fn write(
        &self,
        target: &str,
        output_root: &Path,
        relative: &Path,
        source: &Path,
        content: &[u8],
    ) -> Result<PathBuf, WriteError> {
        self.claim(target, relative, source)?;

        let destination = output_root.join(relative);
        let parent = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| output_root.to_path_buf());
        let io_error = |source| WriteError::Io {
            path: destination.clone(),
            source,
        };

        fs::create_dir_all(&parent).map_err(io_error)?;
        let mut temp = NamedTempFile::new_in(&parent).map_err(io_error)?;
        temp.write_all(content).map_err(io_error)?;
        temp.persist(&destination).map_err(|e| io_error(e.error))?;

        self.written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(path = %destination.display(), bytes = content.len(), "wrote output");
        Ok(destination)
    }

    /// Number of files written so far
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}
