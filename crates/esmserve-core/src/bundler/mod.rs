//! Lazy package materialization.
//!
//! A package is bundled the first time something imports it: its entry
//! chunk first, then each sub-path the first time it is asked for. What
//! has been folded into chunks is recorded in the package's descriptor
//! and persisted, so a sub-path is never bundled twice across restarts.

mod descriptor;
mod passthrough;
mod registry;

pub use descriptor::PackageDescriptor;
pub use passthrough::{BundleError, BundleOutput, BundleRequest, Bundler, PassthroughBundler};
pub use registry::{PackageRegistry, REGISTRY_DIR};

use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::resolver::native::{self, PackageManifest};
use crate::resolver::specifier::relative_slash;
use crate::sync::Dedup;

pub struct PackageBundler {
    root: PathBuf,
    registry: Arc<PackageRegistry>,
    bundler: Arc<dyn Bundler>,
    packages: Dedup<String, Result<Arc<PackageDescriptor>>>,
    subpaths: Dedup<(String, String), Result<PathBuf>>,
}

impl std::fmt::Debug for PackageBundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageBundler")
            .field("root", &self.root)
            .field("mount_dir", &self.registry.mount_dir())
            .field("packages_in_flight", &self.packages.len())
            .field("subpaths_in_flight", &self.subpaths.len())
            .finish_non_exhaustive()
    }
}

impl PackageBundler {
    #[must_use]
    pub fn new(root: PathBuf, registry: Arc<PackageRegistry>, bundler: Arc<dyn Bundler>) -> Self {
        Self {
            root,
            registry,
            bundler,
            packages: Dedup::new(),
            subpaths: Dedup::new(),
        }
    }

    /// Bundler over `<mount_dir>` using the pass-through collaborator.
    #[must_use]
    pub fn passthrough(root: PathBuf, mount_dir: PathBuf) -> Self {
        Self::new(
            root,
            Arc::new(PackageRegistry::new(mount_dir)),
            Arc::new(PassthroughBundler),
        )
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PackageRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn mount_dir(&self) -> &Path {
        self.registry.mount_dir()
    }

    /// Descriptor for `name`, bundling its entry on first use.
    pub async fn resolve_package(self: &Arc<Self>, name: &str) -> Result<Arc<PackageDescriptor>> {
        self.resolve_package_from(name, &self.root).await
    }

    /// Like [`resolve_package`](Self::resolve_package), locating the package
    /// through the `node_modules` chain of `from_dir`.
    pub fn resolve_package_from(
        self: &Arc<Self>,
        name: &str,
        from_dir: &Path,
    ) -> BoxFuture<'static, Result<Arc<PackageDescriptor>>> {
        if let Some(descriptor) = self.registry.get(name) {
            return futures::future::ready(Ok(descriptor)).boxed();
        }

        let this = Arc::clone(self);
        let key = name.to_string();
        let from_dir = from_dir.to_path_buf();
        self.packages
            .run(key.clone(), move || async move {
                this.build_package(&key, &from_dir).await
            })
            .boxed()
    }

    async fn build_package(
        self: Arc<Self>,
        name: &str,
        from_dir: &Path,
    ) -> Result<Arc<PackageDescriptor>> {
        // Lost a race with a finished build.
        if let Some(descriptor) = self.registry.get(name) {
            return Ok(descriptor);
        }

        let mut chain = native::node_modules_chain(from_dir);
        for nm in native::node_modules_chain(&self.root) {
            if !chain.contains(&nm) {
                chain.push(nm);
            }
        }
        let origin = native::locate_package(&chain, name).ok_or_else(|| Error::PackageNotFound {
            name: name.to_string(),
            root: from_dir.to_path_buf(),
        })?;

        let manifest = PackageManifest::read(&origin).map_err(|e| Error::Bundle {
            package: name.to_string(),
            sub_path: String::new(),
            message: e.to_string(),
        })?;
        let entry = manifest.entry_file().ok_or_else(|| Error::Bundle {
            package: name.to_string(),
            sub_path: String::new(),
            message: "no entry file (module, main or index)".to_string(),
        })?;

        for dep in &manifest.dependencies {
            if dep == name || self.packages.is_pending(dep) {
                debug!(package = name, dependency = %dep, "Skipping dependency already in flight");
                continue;
            }
            if let Err(e) = self.resolve_package_from(dep, &origin).await {
                warn!(package = name, dependency = %dep, error = %e, "Dependency not bundled");
            }
        }

        let output = self.bundle(name, "", entry.clone(), &origin).await?;
        let main = self.chunk_rel(name, &output.chunk_path)?;

        let mut descriptor = PackageDescriptor::new(name, main.clone(), origin.clone());
        descriptor.dependencies = manifest.dependencies.clone();
        let consumed = consumed_rels(&output.consumed_files, &origin);
        descriptor.record_bundled(&main, consumed.into_iter().chain(relative_slash(&entry, &origin)));

        info!(package = name, entry = %main, bundled = descriptor.bundle.len(), "Bundled package");
        self.registry.insert(descriptor)
    }

    /// Output chunk for `sub_path` of a package, bundling it on first use.
    ///
    /// An empty sub-path is the entry chunk. Sub-paths already folded into
    /// a chunk never reach the collaborator.
    pub async fn resolve_subpath(
        self: &Arc<Self>,
        descriptor: &PackageDescriptor,
        sub_path: &str,
    ) -> Result<PathBuf> {
        let sub = sub_path.trim_matches('/').trim_start_matches("./").to_string();
        let package_dir = self.registry.package_dir(&descriptor.name);

        if let Some(chunk) = descriptor.chunk_for(&sub) {
            return Ok(package_dir.join(chunk));
        }
        if let Some(latest) = self.registry.get(&descriptor.name) {
            if let Some(chunk) = latest.chunk_for(&sub) {
                return Ok(package_dir.join(chunk));
            }
        }

        // Spellings of one file share a key.
        let not_found = || Error::SubpathNotFound {
            package: descriptor.name.clone(),
            sub_path: sub.clone(),
        };
        let file = native::probe_file(&descriptor.origin.join(&sub)).ok_or_else(not_found)?;
        let rel = relative_slash(&file, &descriptor.origin).ok_or_else(not_found)?;

        let this = Arc::clone(self);
        let base = descriptor.clone();
        self.subpaths
            .run((descriptor.name.clone(), rel.clone()), move || async move {
                this.build_subpath(base, sub, file, rel).await
            })
            .await
    }

    async fn build_subpath(
        self: Arc<Self>,
        base: PackageDescriptor,
        sub: String,
        file: PathBuf,
        rel: String,
    ) -> Result<PathBuf> {
        let name = base.name.clone();
        let package_dir = self.registry.package_dir(&name);

        let latest = self
            .registry
            .get(&name)
            .unwrap_or_else(|| Arc::new(base.clone()));
        if let Some(chunk) = latest.owning_chunk(&rel) {
            debug!(package = %name, sub_path = %sub, chunk, "Sub-path already bundled");
            return Ok(package_dir.join(chunk));
        }

        let output = self.bundle(&name, &rel, file, &base.origin).await?;
        let chunk = self.chunk_rel(&name, &output.chunk_path)?;

        let mut recorded = consumed_rels(&output.consumed_files, &base.origin);
        recorded.push(rel);
        recorded.push(sub.clone());
        self.record(&base, &chunk, recorded)?;

        debug!(package = %name, sub_path = %sub, chunk = %chunk, "Bundled sub-path");
        Ok(package_dir.join(chunk))
    }

    /// Merge newly bundled sub-paths into the latest descriptor and persist.
    fn record(&self, base: &PackageDescriptor, chunk: &str, sub_paths: Vec<String>) -> Result<()> {
        if self.registry.get(&base.name).is_none() {
            let mut fresh = base.clone();
            fresh.record_bundled(chunk, sub_paths);
            self.registry.insert(fresh)?;
            return Ok(());
        }
        self.registry
            .update(&base.name, |d| d.record_bundled(chunk, sub_paths))?;
        Ok(())
    }

    async fn bundle(
        &self,
        name: &str,
        sub_path: &str,
        entry_file: PathBuf,
        origin: &Path,
    ) -> Result<BundleOutput> {
        let request = BundleRequest {
            package: name.to_string(),
            sub_path: sub_path.to_string(),
            entry_file,
            origin: origin.to_path_buf(),
            out_dir: self.registry.package_dir(name),
        };
        self.bundler
            .bundle(request)
            .await
            .map_err(|e| Error::Bundle {
                package: name.to_string(),
                sub_path: sub_path.to_string(),
                message: e.message,
            })
    }

    fn chunk_rel(&self, name: &str, chunk_path: &Path) -> Result<String> {
        relative_slash(chunk_path, &self.registry.package_dir(name)).ok_or_else(|| Error::Bundle {
            package: name.to_string(),
            sub_path: String::new(),
            message: format!("chunk {} written outside the package mount", chunk_path.display()),
        })
    }

    /// Package owning a file inside the mount directory.
    #[must_use]
    pub fn owner_of(&self, file: &Path) -> Option<String> {
        let rel = relative_slash(file, self.registry.mount_dir())?;
        let mut parts = rel.split('/');
        let first = parts.next()?;
        if first.starts_with('@') {
            Some(format!("{first}/{}", parts.next()?))
        } else if first.starts_with('.') || rel == first {
            None
        } else {
            Some(first.to_string())
        }
    }

    /// Delete one package's descriptor and chunks.
    pub fn reset(&self, name: &str) -> Result<bool> {
        let removed = self.registry.remove(name)?;
        if removed {
            info!(package = name, "Reset package");
        }
        Ok(removed)
    }

    /// Delete every descriptor and chunk.
    pub fn reset_all(&self) -> Result<()> {
        self.registry.remove_all()?;
        info!(mount_dir = %self.registry.mount_dir().display(), "Reset all packages");
        Ok(())
    }
}

fn consumed_rels(files: &[PathBuf], origin: &Path) -> Vec<String> {
    files
        .iter()
        .filter_map(|file| relative_slash(file, origin))
        .collect()
}
