//! File system notifications for the resource cache.
//!
//! [`NotifyWatcher`] watches exactly the files the cache asks for and
//! forwards their events over one unbounded channel. A single consumer
//! task applies them to the cache in arrival order.

use esmserve_core::{FileEvent, FileEventKind, FileWatcher, ResourceCache};
use notify::{
    event::ModifyKind, Config as NotifyConfig, Event, EventKind, RecommendedWatcher,
    RecursiveMode, Watcher,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Per-file notify watcher feeding a [`FileEvent`] channel.
pub struct NotifyWatcher {
    inner: Mutex<RecommendedWatcher>,
    watched: Mutex<HashSet<PathBuf>>,
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("watched", &self.watched.lock().map(|w| w.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl NotifyWatcher {
    /// Create the watcher and the receiving end of its event channel.
    pub fn new() -> notify::Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel::<FileEvent>();

        let inner = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(kind) = file_event_kind(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        if let Err(e) = tx.send(FileEvent::new(kind, path)) {
                            warn!(error = %e, "Failed to send watch event");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Watch error");
                }
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        Ok((
            Self {
                inner: Mutex::new(inner),
                watched: Mutex::new(HashSet::new()),
            },
            rx,
        ))
    }

    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.watched.lock().unwrap().len()
    }
}

impl FileWatcher for NotifyWatcher {
    fn add(&self, path: &Path) {
        let mut watched = self.watched.lock().unwrap();
        if watched.contains(path) {
            return;
        }
        match self
            .inner
            .lock()
            .unwrap()
            .watch(path, RecursiveMode::NonRecursive)
        {
            Ok(()) => {
                trace!(path = %path.display(), "Watching file");
                watched.insert(path.to_path_buf());
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to watch file"),
        }
    }

    fn remove(&self, path: &Path) {
        if !self.watched.lock().unwrap().remove(path) {
            return;
        }
        if let Err(e) = self.inner.lock().unwrap().unwatch(path) {
            debug!(path = %path.display(), error = %e, "Failed to unwatch file");
        }
    }
}

/// Map a notify event kind onto the cache's view. Access and metadata-only
/// events carry no content change.
fn file_event_kind(kind: &EventKind) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Added),
        EventKind::Remove(_) => Some(FileEventKind::Removed),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileEventKind::Changed),
        _ => None,
    }
}

/// Apply file events to `cache`, strictly in order, until the channel closes.
pub fn spawn_event_loop(
    mut rx: mpsc::UnboundedReceiver<FileEvent>,
    cache: Arc<ResourceCache>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let evicted = cache.on_file_event(&event);
            if !evicted.is_empty() {
                debug!(
                    kind = event.kind.as_str(),
                    path = %event.path.display(),
                    count = evicted.len(),
                    "Evicted cached resources"
                );
            }
        }
        debug!("Watch event channel closed");
    })
}
