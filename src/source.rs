//! Source tree enumeration
//!
//! Walks a target's source root with its include/exclude globs and hands out
//! [`SourceFile`]s whose content is read lazily, at most once, no matter how
//! many targets use the file. Content is dropped again once the last unit
//! using it has finished.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use crate::config::BundlessConfig;
use crate::error::{BuildError, Result};

#[derive(Debug)]
enum Content {
    Unread,
    Loaded(Arc<[u8]>),
    Failed(io::ErrorKind, String),
    Released,
}

/// A file in the source tree
#[derive(Debug)]
pub struct SourceFile {
    relative_path: PathBuf,
    absolute_path: PathBuf,
    content: Mutex<Content>,
    /// Planned units that still need the content
    users: AtomicUsize,
}

impl SourceFile {
    pub fn new(absolute_path: impl Into<PathBuf>, relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            absolute_path: absolute_path.into(),
            content: Mutex::new(Content::Unread),
            users: AtomicUsize::new(0),
        }
    }

    /// Path relative to the source root
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// Raw content, read from disk on first access
    pub fn content(&self) -> Result<Arc<[u8]>> {
        let mut content = self.content.lock().unwrap_or_else(PoisonError::into_inner);

        if matches!(*content, Content::Unread | Content::Released) {
            tracing::trace!(path = %self.absolute_path.display(), "reading source");
            *content = match std::fs::read(&self.absolute_path) {
                Ok(bytes) => Content::Loaded(Arc::from(bytes)),
                Err(e) => Content::Failed(e.kind(), e.to_string()),
            };
        }

        match &*content {
            Content::Loaded(bytes) => Ok(Arc::clone(bytes)),
            Content::Failed(kind, message) => Err(BuildError::Io {
                path: self.absolute_path.clone(),
                source: io::Error::new(*kind, message.clone()),
            }),
            Content::Unread | Content::Released => Err(BuildError::Io {
                path: self.absolute_path.clone(),
                source: io::Error::new(io::ErrorKind::Other, "source content unavailable"),
            }),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(
            *self.content.lock().unwrap_or_else(PoisonError::into_inner),
            Content::Loaded(_)
        )
    }

    /// Register one more unit that will read this file
    pub fn retain(&self) {
        self.users.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark one unit as done; the last one drops the cached content
    pub fn release(&self) {
        let previous = self
            .users
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 {
            let mut content = self.content.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*content, Content::Loaded(_)) {
                *content = Content::Released;
            }
        }
    }
}

/// Relative paths of every file under the target's source root that passes its
/// include/exclude globs, sorted. Paths in `skip` that lie strictly inside
/// the source root (e.g. nested output roots) are not entered; other entries
/// of `skip` are ignored.
pub fn enumerate(config: &BundlessConfig, skip: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let root = &config.source_root;
    if !root.is_dir() {
        return Err(BuildError::Io {
            path: root.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, "source root is not a directory"),
        });
    }

    let mut overrides = OverrideBuilder::new(root);
    for glob in &config.include {
        overrides.add(glob).map_err(|e| invalid_glob(config, glob, e))?;
    }
    for glob in &config.exclude {
        overrides
            .add(&format!("!{}", glob))
            .map_err(|e| invalid_glob(config, glob, e))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| BuildError::Config(format!("target '{}': {}", config.id, e)))?;

    let skip: Vec<PathBuf> = skip
        .iter()
        .filter(|s| s.starts_with(root) && s.as_path() != root.as_path())
        .cloned()
        .collect();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .overrides(overrides)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| !skip.iter().any(|s| entry.path().starts_with(s)))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path().to_path_buf());
        files.push(relative);
    }

    files.sort();
    tracing::debug!(target_id = %config.id, files = files.len(), "enumerated sources");
    Ok(files)
}

fn invalid_glob(config: &BundlessConfig, glob: &str, err: ignore::Error) -> BuildError {
    BuildError::Config(format!(
        "target '{}': invalid glob '{}': {}",
        config.id, glob, err
    ))
}

fn walk_error(root: &Path, err: ignore::Error) -> BuildError {
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
    BuildError::Io {
        path: root.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative).unwrap();
    }

    #[test]
    fn test_enumerate_sorted_with_globs() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        touch(&src, "b.ts");
        touch(&src, "a.ts");
        touch(&src, "nested/c.ts");
        touch(&src, "nested/c.test.ts");
        touch(&src, "style.css");

        let config = BundlessConfig::new("esm", &src, dir.path().join("dist"))
            .include("**/*.ts")
            .exclude("**/*.test.ts");

        let files = enumerate(&config, &[]).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("a.ts"),
                PathBuf::from("b.ts"),
                PathBuf::from("nested/c.ts"),
            ]
        );
    }

    #[test]
    fn test_enumerate_skips_nested_output() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "index.js");
        touch(dir.path(), "dist/index.js");

        let config = BundlessConfig::new("esm", dir.path(), dir.path().join("dist"));
        let files = enumerate(&config, &[dir.path().join("dist")]).unwrap();
        assert_eq!(files, vec![PathBuf::from("index.js")]);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let config = BundlessConfig::new("esm", dir.path().join("nope"), dir.path().join("dist"));
        assert!(matches!(enumerate(&config, &[]), Err(BuildError::Io { .. })));
    }

    #[test]
    fn test_content_read_once() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.ts");
        let file = SourceFile::new(dir.path().join("a.ts"), "a.ts");
        assert!(!file.is_loaded());

        assert_eq!(&*file.content().unwrap(), b"a.ts");
        fs::remove_file(dir.path().join("a.ts")).unwrap();
        assert_eq!(&*file.content().unwrap(), b"a.ts");
    }

    #[test]
    fn test_ancestor_skip_path_ignored() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "src/a.js");

        let src = dir.path().join("src");
        let config = BundlessConfig::new("esm", &src, dir.path());
        let skip = [dir.path().to_path_buf(), src.clone()];
        assert_eq!(enumerate(&config, &skip).unwrap(), vec![PathBuf::from("a.js")]);
    }

    #[test]
    fn test_content_released_after_last_user() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.ts");
        let file = SourceFile::new(dir.path().join("a.ts"), "a.ts");
        file.retain();
        file.retain();

        file.content().unwrap();
        file.release();
        assert!(file.is_loaded());
        file.release();
        assert!(!file.is_loaded());

        // extra releases are harmless
        file.release();
        assert!(!file.is_loaded());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let file = SourceFile::new(dir.path().join("gone.ts"), "gone.ts");
        assert!(matches!(file.content(), Err(BuildError::Io { .. })));
    }
}
