//! Resource cache keyed by URL.
//!
//! Every entry records the files it was produced from. A reverse index
//! (filename → URLs) lets a single change event evict exactly the entries
//! that depend on the changed file.

use crate::watch::{FileEvent, FileEventKind, FileWatcher};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A produced resource, ready to be written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Response body.
    pub content: Bytes,
    /// Response headers (lower-case names).
    pub headers: BTreeMap<String, String>,
    /// Files whose change invalidates this resource.
    pub dependencies: Vec<PathBuf>,
    /// URLs the resource imports, in discovery order.
    pub imports: Vec<String>,
}

impl Resource {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }
}

#[derive(Debug)]
struct CachedEntry {
    resource: Arc<Resource>,
    deps: Vec<PathBuf>,
}

/// URL → resource cache with file-based invalidation.
///
/// Every change or removal event advances an epoch. A production that
/// snapshots the epoch before reading its inputs stores its result through
/// [`put_since`](ResourceCache::put_since), which refuses results built
/// from a file that changed in the meantime.
pub struct ResourceCache {
    /// Cache entries: url -> entry
    entries: RwLock<HashMap<String, CachedEntry>>,
    /// Reverse index: dependency file -> urls produced from it
    reverse_index: RwLock<HashMap<PathBuf, HashSet<String>>>,
    /// Epoch of the last change event per file
    changed_at: RwLock<HashMap<PathBuf, u64>>,
    epoch: AtomicU64,
    watcher: Arc<dyn FileWatcher>,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ResourceCache {
    #[must_use]
    pub fn new(watcher: Arc<dyn FileWatcher>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            reverse_index: RwLock::new(HashMap::new()),
            changed_at: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            watcher,
        }
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<Arc<Resource>> {
        self.entries
            .read()
            .unwrap()
            .get(url)
            .map(|entry| Arc::clone(&entry.resource))
    }

    /// Current change epoch. Snapshot it before reading any input.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Store a resource, replacing any previous entry for `url`.
    ///
    /// Each dependency not yet indexed is registered with the watcher.
    pub fn put(&self, url: &str, resource: Arc<Resource>, deps: &[PathBuf]) {
        let mut entries = self.entries.write().unwrap();
        self.store(&mut entries, url, resource, deps);
    }

    /// Store a resource produced from inputs read after `epoch`.
    ///
    /// Returns `false` without storing when any dependency changed since
    /// `epoch`; the next request produces it again.
    pub fn put_since(
        &self,
        url: &str,
        resource: Arc<Resource>,
        deps: &[PathBuf],
        epoch: u64,
    ) -> bool {
        let mut entries = self.entries.write().unwrap();
        {
            let changed_at = self.changed_at.read().unwrap();
            if let Some(dep) = deps
                .iter()
                .find(|dep| changed_at.get(*dep).is_some_and(|&at| at > epoch))
            {
                debug!(url, dep = %dep.display(), "Discarded resource built from a changed file");
                return false;
            }
        }
        self.store(&mut entries, url, resource, deps);
        true
    }

    fn store(
        &self,
        entries: &mut HashMap<String, CachedEntry>,
        url: &str,
        resource: Arc<Resource>,
        deps: &[PathBuf],
    ) {
        let mut index = self.reverse_index.write().unwrap();

        if let Some(previous) = entries.remove(url) {
            for dep in &previous.deps {
                if let Some(urls) = index.get_mut(dep) {
                    urls.remove(url);
                }
            }
        }

        for dep in deps {
            let urls = index.entry(dep.clone()).or_default();
            if urls.is_empty() {
                self.watcher.add(dep);
            }
            urls.insert(url.to_string());
        }

        entries.insert(
            url.to_string(),
            CachedEntry {
                resource,
                deps: deps.to_vec(),
            },
        );
    }

    /// Apply a file event. Returns the evicted URLs.
    ///
    /// Completes before returning, so no later `get` observes an entry
    /// produced from the old file contents.
    pub fn on_file_event(&self, event: &FileEvent) -> Vec<String> {
        match event.kind {
            FileEventKind::Added => Vec::new(),
            FileEventKind::Changed => self.invalidate_path(&event.path),
            FileEventKind::Removed => {
                let evicted = self.invalidate_path(&event.path);
                self.watcher.remove(&event.path);
                evicted
            }
        }
    }

    /// Evict every entry that depends on `path`.
    pub fn invalidate_path(&self, path: &Path) -> Vec<String> {
        let mut entries = self.entries.write().unwrap();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.changed_at
            .write()
            .unwrap()
            .insert(path.to_path_buf(), epoch);
        let mut index = self.reverse_index.write().unwrap();

        let Some(urls) = index.remove(path) else {
            return Vec::new();
        };

        let mut evicted: Vec<String> = urls.into_iter().collect();
        evicted.sort();

        for url in &evicted {
            if let Some(entry) = entries.remove(url) {
                // Drop the evicted url from its other dependencies' index sets
                for dep in entry.deps.iter().filter(|d| d.as_path() != path) {
                    if let Some(set) = index.get_mut(dep) {
                        set.remove(url);
                    }
                }
            }
        }

        debug!(path = %path.display(), count = evicted.len(), "Invalidated cached resources");
        evicted
    }

    /// Drop every entry. Watches stay registered.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
        self.reverse_index
            .write()
            .unwrap()
            .values_mut()
            .for_each(HashSet::clear);
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap();
        let index = self.reverse_index.read().unwrap();
        CacheStats {
            entry_count: entries.len(),
            indexed_paths: index.values().filter(|urls| !urls.is_empty()).count(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub indexed_paths: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::ManualWatcher;

    fn resource(body: &str) -> Arc<Resource> {
        Arc::new(Resource {
            content: Bytes::from(body.to_string()),
            headers: BTreeMap::new(),
            dependencies: Vec::new(),
            imports: Vec::new(),
        })
    }

    fn setup() -> (Arc<ManualWatcher>, ResourceCache) {
        let watcher = Arc::new(ManualWatcher::new());
        let cache = ResourceCache::new(watcher.clone());
        (watcher, cache)
    }

    #[test]
    fn test_get_after_put_returns_entry() {
        let (watcher, cache) = setup();
        let entry = resource("<html></html>");
        let deps = vec![PathBuf::from("/p/a.html"), PathBuf::from("/p/b.js")];

        cache.put("/a.html", Arc::clone(&entry), &deps);

        let got = cache.get("/a.html").unwrap();
        assert!(Arc::ptr_eq(&got, &entry));
        assert!(watcher.is_watching(Path::new("/p/a.html")));
        assert!(watcher.is_watching(Path::new("/p/b.js")));
    }

    #[test]
    fn test_change_of_dependency_invalidates() {
        let (_watcher, cache) = setup();
        cache.put(
            "/a.html",
            resource("a"),
            &[PathBuf::from("/p/a.html"), PathBuf::from("/p/b.js")],
        );

        let unrelated = cache.on_file_event(&FileEvent::new(FileEventKind::Changed, "/p/c.css"));
        assert!(unrelated.is_empty());
        assert!(cache.get("/a.html").is_some());

        let evicted = cache.on_file_event(&FileEvent::new(FileEventKind::Changed, "/p/b.js"));
        assert_eq!(evicted, vec!["/a.html".to_string()]);
        assert!(cache.get("/a.html").is_none());
        assert_eq!(cache.stats().indexed_paths, 0);
    }

    #[test]
    fn test_shared_dependency_evicts_all_dependents() {
        let (_watcher, cache) = setup();
        let shared = PathBuf::from("/p/shared.js");
        cache.put("/one.js", resource("1"), &[PathBuf::from("/p/one.js"), shared.clone()]);
        cache.put("/two.js", resource("2"), &[PathBuf::from("/p/two.js"), shared.clone()]);

        let evicted = cache.on_file_event(&FileEvent::new(FileEventKind::Changed, &shared));
        assert_eq!(evicted, vec!["/one.js".to_string(), "/two.js".to_string()]);
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn test_remove_stops_watching() {
        let (watcher, cache) = setup();
        cache.put("/x.js", resource("x"), &[PathBuf::from("/p/x.js")]);

        cache.on_file_event(&FileEvent::new(FileEventKind::Removed, "/p/x.js"));
        assert!(cache.get("/x.js").is_none());
        assert!(!watcher.is_watching(Path::new("/p/x.js")));
    }

    #[test]
    fn test_added_event_is_ignored() {
        let (_watcher, cache) = setup();
        cache.put("/x.js", resource("x"), &[PathBuf::from("/p/x.js")]);
        let evicted = cache.on_file_event(&FileEvent::new(FileEventKind::Added, "/p/x.js"));
        assert!(evicted.is_empty());
        assert!(cache.get("/x.js").is_some());
    }

    #[test]
    fn test_replacing_entry_drops_stale_index() {
        let (_watcher, cache) = setup();
        cache.put("/x.js", resource("v1"), &[PathBuf::from("/p/old.js")]);
        cache.put("/x.js", resource("v2"), &[PathBuf::from("/p/new.js")]);

        // The old dependency no longer evicts the replacement
        assert!(cache
            .on_file_event(&FileEvent::new(FileEventKind::Changed, "/p/old.js"))
            .is_empty());
        assert_eq!(cache.get("/x.js").unwrap().content, Bytes::from("v2"));
    }

    #[test]
    fn test_put_since_refuses_result_of_changed_file() {
        let (_watcher, cache) = setup();
        let source = PathBuf::from("/p/a.js");
        cache.put("/a.js", resource("v0"), &[source.clone()]);
        cache.on_file_event(&FileEvent::new(FileEventKind::Changed, &source));

        // A production snapshots the epoch, then the file changes again
        // while it is still running. The index entry is already gone.
        let epoch = cache.epoch();
        let evicted = cache.on_file_event(&FileEvent::new(FileEventKind::Changed, &source));
        assert!(evicted.is_empty());

        assert!(!cache.put_since("/a.js", resource("v1"), &[source.clone()], epoch));
        assert!(cache.get("/a.js").is_none());

        let epoch = cache.epoch();
        assert!(cache.put_since("/a.js", resource("v2"), &[source], epoch));
        assert_eq!(cache.get("/a.js").unwrap().content, Bytes::from("v2"));
    }

    #[test]
    fn test_unrelated_change_does_not_block_put() {
        let (_watcher, cache) = setup();
        let epoch = cache.epoch();
        cache.on_file_event(&FileEvent::new(FileEventKind::Changed, "/p/other.js"));
        assert!(cache.put_since("/a.js", resource("a"), &[PathBuf::from("/p/a.js")], epoch));
        assert!(cache.get("/a.js").is_some());
    }
}
