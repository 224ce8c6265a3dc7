//! Resource production.
//!
//! `provide(url)` answers from the cache or produces the resource once:
//! map the URL to a file, read it, run it through the transformer (which
//! resolves imports, bundling packages on demand), assemble headers, then
//! cache it keyed by the files it came from.

pub mod headers;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::bundler::REGISTRY_DIR;
use crate::cache::{Resource, ResourceCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::resolver::ModuleResolver;
use crate::sync::Dedup;
use self::headers::FileStamp;
use crate::transform::{
    ContentCategory, SpecifierResolver, TransformError, TransformRequest, Transformer,
};

pub struct PipelineOrchestrator {
    config: Arc<Config>,
    cache: Arc<ResourceCache>,
    resolver: Arc<ModuleResolver>,
    transformer: Arc<dyn Transformer>,
    inflight: Dedup<String, Result<Arc<Resource>>>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("root", &self.config.root)
            .field("in_flight", &self.inflight.len())
            .finish_non_exhaustive()
    }
}

/// Where a URL points on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    file: PathBuf,
    mount: bool,
}

impl PipelineOrchestrator {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        cache: Arc<ResourceCache>,
        resolver: Arc<ModuleResolver>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            config,
            cache,
            resolver,
            transformer,
            inflight: Dedup::new(),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// The resource served at `url`.
    ///
    /// Concurrent requests for the same uncached URL share one production,
    /// which keeps running even if every requester goes away.
    pub async fn provide(self: &Arc<Self>, url: &str) -> Result<Arc<Resource>> {
        let url = url.split(['?', '#']).next().unwrap_or(url);
        if let Some(resource) = self.cache.get(url) {
            return Ok(resource);
        }

        let this = Arc::clone(self);
        let key = url.to_string();
        self.inflight
            .run(key.clone(), move || async move { this.produce(&key).await })
            .await
    }

    async fn produce(&self, url: &str) -> Result<Arc<Resource>> {
        // Finished between the cache check and joining.
        if let Some(resource) = self.cache.get(url) {
            return Ok(resource);
        }

        let epoch = self.cache.epoch();
        let target = self.map_url(url)?;
        let metadata = match tokio::fs::metadata(&target.file).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(self.missing(url));
            }
            Err(e) => return Err(Error::io(&target.file, e)),
        };

        if metadata.is_dir() {
            return Err(Error::Redirect {
                location: format!("{}/index.html", url.trim_end_matches('/')),
            });
        }

        let source = tokio::fs::read(&target.file)
            .await
            .map_err(|e| Error::io(&target.file, e))?;
        let modified = metadata.modified().map_err(|e| Error::io(&target.file, e))?;
        let category = ContentCategory::from_path(&target.file);

        let recorder = RecordingResolver {
            inner: &self.resolver,
            imports: Mutex::new(Vec::new()),
        };
        let (content, content_type, mut dependencies) = if category.is_transformable() {
            let request = TransformRequest {
                filename: &target.file,
                category,
                source: &source,
            };
            let output = self
                .transformer
                .transform(request, &recorder)
                .await
                .map_err(|e| match e {
                    TransformError::Resolve(e) => e,
                    TransformError::Diagnostic(diagnostic) => {
                        warn!(file = %target.file.display(), %diagnostic, "Transform failed");
                        Error::Transform {
                            file: target.file.clone(),
                            diagnostic,
                        }
                    }
                })?;
            (output.content, output.content_type, output.dependency_files)
        } else {
            let content_type = mime_guess::from_path(&target.file)
                .first_or_octet_stream()
                .to_string();
            (source, content_type, Vec::new())
        };

        let imports = recorder.into_imports();
        dependencies.retain(|dep| *dep != target.file);
        dependencies.sort();
        dependencies.dedup();
        let stamped = stat_all(&dependencies).await;
        let stamps: Vec<FileStamp<'_>> = stamped
            .iter()
            .map(|(path, size, modified)| FileStamp {
                path,
                size: *size,
                modified: *modified,
            })
            .collect();
        let headers = headers::build(&headers::HeaderFacts {
            source: FileStamp {
                path: &target.file,
                size: metadata.len(),
                modified,
            },
            dependencies: &stamps,
            content_type: &content_type,
            content_length: content.len(),
            transformed: category.is_transformable(),
            mount: target.mount,
            imports: &imports,
            strategy: self.config.link_strategy(),
        });

        dependencies.insert(0, target.file.clone());

        let resource = Arc::new(Resource {
            content: Bytes::from(content),
            headers,
            dependencies: dependencies.clone(),
            imports,
        });
        self.cache
            .put_since(url, Arc::clone(&resource), &dependencies, epoch);

        debug!(
            url,
            file = %target.file.display(),
            bytes = resource.content.len(),
            imports = resource.imports.len(),
            "Produced resource"
        );
        Ok(resource)
    }

    /// Missing file: the legacy icon redirects, anything else is not found.
    fn missing(&self, url: &str) -> Error {
        match &self.config.icon_redirect {
            Some((path, fallback)) if path == url => Error::Redirect {
                location: fallback.clone(),
            },
            _ => Error::ResourceNotFound {
                url: url.to_string(),
            },
        }
    }

    /// Map a URL path onto the mount dir or the project root.
    ///
    /// Segments are percent-decoded; any `..` or undecodable segment makes
    /// the URL unservable.
    fn map_url(&self, url: &str) -> Result<Target> {
        let not_found = || Error::ResourceNotFound {
            url: url.to_string(),
        };

        let (base, rest, mount) = match url.strip_prefix(&self.config.mount_prefix) {
            Some(rest) => (&self.config.mount_dir, rest, true),
            None => (&self.config.root, url.trim_start_matches('/'), false),
        };

        if mount && rest.split('/').next() == Some(REGISTRY_DIR) {
            return Err(not_found());
        }

        let mut file = base.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            let decoded = percent_decode_str(segment)
                .decode_utf8()
                .map_err(|_| not_found())?;
            if decoded == "." || decoded == ".." || decoded.contains(['/', '\\']) {
                return Err(not_found());
            }
            file.push(&*decoded);
        }
        Ok(Target { file, mount })
    }
}

/// Size and mtime of each readable file; unreadable ones are left out.
async fn stat_all(paths: &[PathBuf]) -> Vec<(PathBuf, u64, SystemTime)> {
    let mut stamped = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => {
                if let Ok(modified) = metadata.modified() {
                    stamped.push((path.clone(), metadata.len(), modified));
                }
            }
            Err(e) => debug!(path = %path.display(), error = %e, "Dependency not stat-able"),
        }
    }
    stamped
}

/// Forwards to the module resolver, remembering every URL it hands out.
struct RecordingResolver<'a> {
    inner: &'a ModuleResolver,
    imports: Mutex<Vec<String>>,
}

impl RecordingResolver<'_> {
    fn into_imports(self) -> Vec<String> {
        self.imports.into_inner().unwrap_or_default()
    }
}

#[async_trait]
impl SpecifierResolver for RecordingResolver<'_> {
    async fn resolve(&self, referencing_file: &Path, specifier: &str) -> Result<String> {
        let url = self.inner.resolve(referencing_file, specifier).await?;
        let mut imports = self.imports.lock().unwrap();
        if !imports.contains(&url) {
            imports.push(url.clone());
        }
        Ok(url)
    }
}
