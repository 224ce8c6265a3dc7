//! Import specifier resolution to served URLs.
//!
//! Project files resolve to `/`-rooted URLs; packages resolve to chunks
//! under the package mount, bundling them on demand.

pub mod native;
pub mod specifier;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use crate::bundler::PackageBundler;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sync::Memoize;
use crate::transform::SpecifierResolver;
use specifier::{classify, normalize, relative_slash, split_bare, SpecifierKind};

/// Where lookups from one referencing file start.
#[derive(Debug)]
struct Referrer {
    dir: PathBuf,
    /// `node_modules` directories visible from the referrer, nearest first.
    chain: Vec<PathBuf>,
    /// Set when the referrer is a chunk under the package mount.
    owner: Option<String>,
}

#[derive(Debug)]
pub struct ModuleResolver {
    root: PathBuf,
    mount_prefix: String,
    bundler: Arc<PackageBundler>,
    /// Consecutive lookups mostly come from the same file.
    referrer: Memoize<PathBuf, Arc<Referrer>>,
}

impl ModuleResolver {
    #[must_use]
    pub fn new(config: &Config, bundler: Arc<PackageBundler>) -> Self {
        let root = dunce::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());
        Self {
            root,
            mount_prefix: config.mount_prefix.clone(),
            bundler,
            referrer: Memoize::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `specifier` imported from `referencing_file` to the URL it is
    /// served at.
    pub async fn resolve(&self, referencing_file: &Path, specifier: &str) -> Result<String> {
        let fail = |reason: String| Error::ModuleNotFound {
            specifier: specifier.to_string(),
            referrer: referencing_file.to_path_buf(),
            reason,
        };

        let url = match classify(specifier) {
            SpecifierKind::PassThrough => return Ok(specifier.to_string()),
            SpecifierKind::Absolute if specifier.starts_with(&self.mount_prefix) => {
                return Ok(specifier.to_string());
            }
            SpecifierKind::Absolute => {
                let path = normalize(&self.root.join(specifier.trim_start_matches('/')));
                self.resolve_project_file(&path).map_err(fail)?
            }
            SpecifierKind::Relative => {
                let referrer = self.referrer(referencing_file);
                match &referrer.owner {
                    Some(owner) => self
                        .resolve_chunk_relative(owner, &referrer.dir, specifier)
                        .await
                        .map_err(|e| fail(e.to_string()))?,
                    None => self
                        .resolve_project_file(&normalize(&referrer.dir.join(specifier)))
                        .map_err(fail)?,
                }
            }
            SpecifierKind::Bare => {
                let (name, sub_path) = split_bare(specifier)
                    .ok_or_else(|| fail("invalid package specifier".to_string()))?;
                self.resolve_bare(referencing_file, &name, &sub_path)
                    .await
                    .map_err(|e| fail(e.to_string()))?
            }
        };

        trace!(specifier, referrer = %referencing_file.display(), url = %url, "Resolved import");
        Ok(url)
    }

    fn referrer(&self, referencing_file: &Path) -> Arc<Referrer> {
        self.referrer.get(referencing_file.to_path_buf(), |file| {
            let dir = file.parent().map_or_else(|| self.root.clone(), Path::to_path_buf);
            let owner = self.bundler.owner_of(file);
            let search_from = owner
                .as_deref()
                .and_then(|name| self.bundler.registry().get(name))
                .map_or_else(|| dir.clone(), |d| d.origin.clone());
            let mut chain = native::node_modules_chain(&search_from);
            for nm in native::node_modules_chain(&self.root) {
                if !chain.contains(&nm) {
                    chain.push(nm);
                }
            }
            Arc::new(Referrer { dir, chain, owner })
        })
    }

    /// A project file URL: `/` + root-relative path.
    fn resolve_project_file(&self, base: &Path) -> std::result::Result<String, String> {
        let file = native::probe_file(base).ok_or_else(|| "no such file".to_string())?;
        let rel = relative_slash(&file, &self.root)
            .ok_or_else(|| format!("{} is outside the project root", file.display()))?;
        Ok(format!("/{rel}"))
    }

    /// A relative import inside a chunk is a sub-path of the chunk's package.
    async fn resolve_chunk_relative(&self, owner: &str, dir: &Path, specifier: &str) -> Result<String> {
        let package_dir = self.bundler.registry().package_dir(owner);
        let sub_path = relative_slash(&normalize(&dir.join(specifier)), &package_dir).ok_or_else(|| {
            Error::SubpathNotFound {
                package: owner.to_string(),
                sub_path: specifier.to_string(),
            }
        })?;

        let descriptor = self.bundler.resolve_package(owner).await?;
        let chunk = self.bundler.resolve_subpath(&descriptor, &sub_path).await?;
        self.chunk_url(owner, &chunk)
    }

    async fn resolve_bare(&self, referencing_file: &Path, name: &str, sub_path: &str) -> Result<String> {
        let referrer = self.referrer(referencing_file);
        if self.bundler.registry().get(name).is_none()
            && native::locate_package(&referrer.chain, name).is_none()
        {
            return Err(Error::PackageNotFound {
                name: name.to_string(),
                root: referrer.dir.clone(),
            });
        }

        let descriptor = self.bundler.resolve_package_from(name, &referrer.dir).await?;
        let chunk = self.bundler.resolve_subpath(&descriptor, sub_path).await?;
        self.chunk_url(name, &chunk)
    }

    /// `<mount_prefix><name>/<chunk>`
    fn chunk_url(&self, name: &str, chunk: &Path) -> Result<String> {
        let package_dir = self.bundler.registry().package_dir(name);
        let rel = relative_slash(chunk, &package_dir).ok_or_else(|| Error::Bundle {
            package: name.to_string(),
            sub_path: String::new(),
            message: format!("chunk {} is outside the package mount", chunk.display()),
        })?;
        Ok(format!("{}{name}/{rel}", self.mount_prefix))
    }
}

#[async_trait]
impl SpecifierResolver for ModuleResolver {
    async fn resolve(&self, referencing_file: &Path, specifier: &str) -> Result<String> {
        ModuleResolver::resolve(self, referencing_file, specifier).await
    }
}
