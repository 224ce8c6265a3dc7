//! File watching seam.
//!
//! The cache registers every file a resource was produced from through
//! [`FileWatcher::add`]; whoever owns the watcher feeds the resulting
//! [`FileEvent`]s back into the cache in arrival order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Kind of file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Added,
    Changed,
    Removed,
}

impl FileEventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        }
    }
}

/// A change to a watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    #[must_use]
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Registers individual files for change notification.
pub trait FileWatcher: Send + Sync {
    /// Start watching `path`. Errors are the watcher's to log.
    fn add(&self, path: &Path);

    /// Stop watching `path`.
    fn remove(&self, path: &Path);
}

/// Watcher that only remembers what it was asked to watch.
///
/// Used when no file system notifications are wanted, and in tests.
#[derive(Debug, Default)]
pub struct ManualWatcher {
    watched: Mutex<HashSet<PathBuf>>,
}

impl ManualWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.lock().unwrap().contains(path)
    }

    #[must_use]
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.watched.lock().unwrap().iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl FileWatcher for ManualWatcher {
    fn add(&self, path: &Path) {
        self.watched.lock().unwrap().insert(path.to_path_buf());
    }

    fn remove(&self, path: &Path) {
        self.watched.lock().unwrap().remove(path);
    }
}
