//! The long-lived engine state, built once per server.

use std::sync::Arc;
use tracing::debug;

use crate::bundler::{Bundler, PackageBundler, PackageRegistry, PassthroughBundler};
use crate::cache::ResourceCache;
use crate::config::{default_mount_dir, Config};
use crate::pipeline::PipelineOrchestrator;
use crate::resolver::ModuleResolver;
use crate::transform::{EsmTransformer, Transformer};
use crate::watch::FileWatcher;

/// Everything a request handler needs, wired together.
#[derive(Debug)]
pub struct DevContext {
    pub config: Arc<Config>,
    pub cache: Arc<ResourceCache>,
    pub bundler: Arc<PackageBundler>,
    pub resolver: Arc<ModuleResolver>,
    pub pipeline: Arc<PipelineOrchestrator>,
}

impl DevContext {
    /// Context with the default collaborators: pass-through bundler and
    /// import-rewriting transformer.
    #[must_use]
    pub fn new(config: Config, watcher: Arc<dyn FileWatcher>) -> Self {
        Self::with_collaborators(
            config,
            watcher,
            Arc::new(PassthroughBundler),
            Arc::new(EsmTransformer::new()),
        )
    }

    #[must_use]
    pub fn with_collaborators(
        config: Config,
        watcher: Arc<dyn FileWatcher>,
        bundler: Arc<dyn Bundler>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        let config = Arc::new(canonical_config(config));
        let cache = Arc::new(ResourceCache::new(watcher));
        let registry = Arc::new(PackageRegistry::new(config.mount_dir.clone()));
        let bundler = Arc::new(PackageBundler::new(config.root.clone(), registry, bundler));
        let resolver = Arc::new(ModuleResolver::new(&config, Arc::clone(&bundler)));
        let pipeline = Arc::new(PipelineOrchestrator::new(
            Arc::clone(&config),
            Arc::clone(&cache),
            Arc::clone(&resolver),
            transformer,
        ));

        debug!(
            root = %config.root.display(),
            mount_dir = %config.mount_dir.display(),
            link = config.link_strategy().as_str(),
            "Created dev context"
        );

        Self {
            config,
            cache,
            bundler,
            resolver,
            pipeline,
        }
    }

    /// Drop every cached resource and the in-memory package view.
    ///
    /// Persisted descriptors stay; use [`PackageBundler::reset_all`] to
    /// remove those too.
    pub fn reset(&self) {
        self.cache.clear();
        self.bundler.registry().clear_memory();
        debug!("Reset dev context");
    }
}

/// Canonicalize the root so file paths from every component agree.
fn canonical_config(mut config: Config) -> Config {
    let Ok(root) = dunce::canonicalize(&config.root) else {
        return config;
    };
    if config.mount_dir == default_mount_dir(&config.root) {
        config.mount_dir = default_mount_dir(&root);
    } else if let Ok(rest) = config.mount_dir.strip_prefix(&config.root) {
        config.mount_dir = root.join(rest);
    }
    config.root = root;
    config
}
