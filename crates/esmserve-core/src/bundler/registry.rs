//! Persisted package descriptors.
//!
//! Descriptors live in memory and as JSON at
//! `<mount_dir>/.registry/<name>.json`, apart from the chunk directories so
//! no file a package ships can collide with one. Reads are lazy; every update is
//! written through atomically so a restarted server picks up where the last
//! one stopped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::descriptor::PackageDescriptor;
use crate::error::{Error, Result};

/// Directory under the mount holding persisted descriptors. Package names
/// never start with `.`, so it cannot shadow a package.
pub const REGISTRY_DIR: &str = ".registry";

#[derive(Debug)]
pub struct PackageRegistry {
    mount_dir: PathBuf,
    /// `None` records a confirmed miss on disk.
    entries: RwLock<HashMap<String, Option<Arc<PackageDescriptor>>>>,
    /// Serializes read-modify-write cycles.
    write: Mutex<()>,
}

impl PackageRegistry {
    #[must_use]
    pub fn new(mount_dir: PathBuf) -> Self {
        Self {
            mount_dir,
            entries: RwLock::new(HashMap::new()),
            write: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn mount_dir(&self) -> &Path {
        &self.mount_dir
    }

    /// Directory holding a package's chunks.
    #[must_use]
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.mount_dir.join(name)
    }

    fn registry_dir(&self) -> PathBuf {
        self.mount_dir.join(REGISTRY_DIR)
    }

    #[must_use]
    pub fn descriptor_path(&self, name: &str) -> PathBuf {
        self.registry_dir().join(format!("{name}.json"))
    }

    /// Descriptor for `name`, from memory or disk.
    ///
    /// An unreadable descriptor is treated as absent so the package gets
    /// rebuilt.
    pub fn get(&self, name: &str) -> Option<Arc<PackageDescriptor>> {
        if let Some(entry) = self.entries.read().unwrap().get(name) {
            return entry.clone();
        }

        let loaded = self.load(name).map(Arc::new);
        self.entries
            .write()
            .unwrap()
            .entry(name.to_string())
            .or_insert(loaded)
            .clone()
    }

    fn load(&self, name: &str) -> Option<PackageDescriptor> {
        let path = self.descriptor_path(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read package descriptor");
                return None;
            }
        };

        match serde_json::from_str::<PackageDescriptor>(&content) {
            Ok(descriptor) if descriptor.name == name => {
                debug!(package = name, bundled = descriptor.bundle.len(), "Loaded package descriptor");
                Some(descriptor)
            }
            Ok(descriptor) => {
                warn!(
                    path = %path.display(),
                    found = %descriptor.name,
                    "Package descriptor names another package"
                );
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt package descriptor");
                None
            }
        }
    }

    /// Store and persist a descriptor, replacing any previous one.
    pub fn insert(&self, descriptor: PackageDescriptor) -> Result<Arc<PackageDescriptor>> {
        let _guard = self.write.lock().unwrap();
        self.persist(descriptor)
    }

    /// Apply `update` to the latest descriptor for `name` and persist it.
    ///
    /// Runs under the registry write lock, so concurrent updates to the
    /// same package never lose each other's bundled sub-paths.
    pub fn update<F>(&self, name: &str, update: F) -> Result<Arc<PackageDescriptor>>
    where
        F: FnOnce(&mut PackageDescriptor) -> bool,
    {
        let _guard = self.write.lock().unwrap();
        let current = self.get(name).ok_or_else(|| Error::Registry {
            path: self.descriptor_path(name),
            message: format!("no descriptor for {name}"),
        })?;

        let mut next = (*current).clone();
        if !update(&mut next) {
            return Ok(current);
        }
        self.persist(next)
    }

    fn persist(&self, descriptor: PackageDescriptor) -> Result<Arc<PackageDescriptor>> {
        let path = self.descriptor_path(&descriptor.name);
        let json = serde_json::to_vec_pretty(&descriptor).map_err(|e| Error::Registry {
            path: path.clone(),
            message: e.to_string(),
        })?;
        esmserve_util::fs::atomic_write(&path, &json).map_err(|e| Error::io(&path, e))?;

        let descriptor = Arc::new(descriptor);
        self.entries
            .write()
            .unwrap()
            .insert(descriptor.name.clone(), Some(Arc::clone(&descriptor)));
        debug!(
            package = %descriptor.name,
            bundled = descriptor.bundle.len(),
            "Persisted package descriptor"
        );
        Ok(descriptor)
    }

    /// Forget a package and delete its chunks and descriptor.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let _guard = self.write.lock().unwrap();
        self.entries.write().unwrap().remove(name);
        let dir = self.package_dir(name);
        let path = self.descriptor_path(name);
        let existed = dir.exists() || path.exists();
        esmserve_util::fs::remove_all(&path).map_err(|e| Error::io(&path, e))?;
        esmserve_util::fs::remove_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(existed)
    }

    /// Forget every package and delete the whole mount directory.
    pub fn remove_all(&self) -> Result<()> {
        let _guard = self.write.lock().unwrap();
        self.entries.write().unwrap().clear();
        esmserve_util::fs::remove_all(&self.mount_dir).map_err(|e| Error::io(&self.mount_dir, e))
    }

    /// Drop the in-memory view; the next lookup rereads disk.
    pub fn clear_memory(&self) {
        self.entries.write().unwrap().clear();
    }

    /// Every persisted descriptor, sorted by package name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<PackageDescriptor>> {
        let registry_dir = self.registry_dir();
        let mut names: Vec<String> = WalkDir::new(&registry_dir)
            .min_depth(1)
            .max_depth(2)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "json")
            })
            .filter_map(|entry| {
                let rel = crate::resolver::specifier::relative_slash(entry.path(), &registry_dir)?;
                rel.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        names.sort();
        names.dedup();

        names.iter().filter_map(|name| self.get(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(name: &str) -> PackageDescriptor {
        let mut d = PackageDescriptor::new(name, "index.js", PathBuf::from("/o").join(name));
        d.record_bundled("index.js", ["index.js"]);
        d
    }

    #[test]
    fn test_insert_and_reload() {
        let dir = TempDir::new().unwrap();
        let registry = PackageRegistry::new(dir.path().to_path_buf());
        registry.insert(descriptor("pkg")).unwrap();
        assert!(registry.descriptor_path("pkg").is_file());

        let reopened = PackageRegistry::new(dir.path().to_path_buf());
        let loaded = reopened.get("pkg").unwrap();
        assert_eq!(*loaded, descriptor("pkg"));
        assert!(reopened.get("missing").is_none());
    }

    #[test]
    fn test_update_grows_bundle() {
        let dir = TempDir::new().unwrap();
        let registry = PackageRegistry::new(dir.path().to_path_buf());
        registry.insert(descriptor("pkg")).unwrap();

        let updated = registry
            .update("pkg", |d| d.record_bundled("sub/path.js", ["sub/path.js"]))
            .unwrap();
        assert!(updated.bundle.contains("sub/path.js"));

        registry.clear_memory();
        assert!(registry.get("pkg").unwrap().bundle.contains("sub/path.js"));
        assert!(registry.update("missing", |_| true).is_err());
    }

    #[test]
    fn test_corrupt_descriptor_is_absent() {
        let dir = TempDir::new().unwrap();
        let registry = PackageRegistry::new(dir.path().to_path_buf());
        let path = registry.descriptor_path("pkg");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(registry.get("pkg").is_none());
    }

    #[test]
    fn test_shipped_descriptor_json_chunk_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let registry = PackageRegistry::new(dir.path().to_path_buf());
        registry.insert(descriptor("pkg")).unwrap();

        let chunk = registry.package_dir("pkg").join("descriptor.json");
        std::fs::create_dir_all(registry.package_dir("pkg")).unwrap();
        std::fs::write(&chunk, "{\"shipped\":true}").unwrap();
        registry
            .update("pkg", |d| d.record_bundled("descriptor.json", ["descriptor.json"]))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&chunk).unwrap(), "{\"shipped\":true}");
        assert!(!registry.descriptor_path("pkg").starts_with(registry.package_dir("pkg")));
        registry.clear_memory();
        assert!(registry.get("pkg").unwrap().bundle.contains("descriptor.json"));
    }

    #[test]
    fn test_list_and_remove() {
        let dir = TempDir::new().unwrap();
        let registry = PackageRegistry::new(dir.path().to_path_buf());
        registry.insert(descriptor("zeta")).unwrap();
        registry.insert(descriptor("@scope/pkg")).unwrap();
        registry.insert(descriptor("alpha")).unwrap();

        let names: Vec<_> = registry.list().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["@scope/pkg", "alpha", "zeta"]);

        assert!(registry.remove("alpha").unwrap());
        assert!(!registry.remove("alpha").unwrap());
        assert_eq!(registry.list().len(), 2);

        registry.remove_all().unwrap();
        assert!(registry.list().is_empty());
    }
}
