//! The bundler collaborator seam and its default implementation.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::trace;

/// One chunk to produce.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Package name (e.g., "react", "@scope/pkg").
    pub package: String,
    /// Origin-relative sub-path being bundled; empty for the entry.
    pub sub_path: String,
    /// Resolved source file to start from.
    pub entry_file: PathBuf,
    /// Package directory inside `node_modules`.
    pub origin: PathBuf,
    /// Package mount directory the chunk must be written under.
    pub out_dir: PathBuf,
}

/// A produced chunk.
#[derive(Debug, Clone)]
pub struct BundleOutput {
    /// Absolute path of the written chunk, inside `out_dir`.
    pub chunk_path: PathBuf,
    /// Source files folded into the chunk.
    pub consumed_files: Vec<PathBuf>,
}

/// Bundler failure.
#[derive(Debug, Clone)]
pub struct BundleError {
    pub message: String,
}

impl BundleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BundleError {}

/// Materializes package chunks.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput, BundleError>;
}

/// Copies each requested file verbatim to the same relative location under
/// the package mount, one source file per chunk.
///
/// Sibling imports stay relative, so chunks keep resolving as package
/// sub-paths when they are served.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughBundler;

#[async_trait]
impl Bundler for PassthroughBundler {
    async fn bundle(&self, request: BundleRequest) -> Result<BundleOutput, BundleError> {
        let rel = request
            .entry_file
            .strip_prefix(&request.origin)
            .map_err(|_| {
                BundleError::new(format!(
                    "{} is outside package {}",
                    request.entry_file.display(),
                    request.origin.display()
                ))
            })?
            .to_path_buf();
        let chunk_path = request.out_dir.join(&rel);

        let source = request.entry_file.clone();
        let target = chunk_path.clone();
        tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&source)
                .map_err(|e| BundleError::new(format!("read {}: {e}", source.display())))?;
            esmserve_util::fs::atomic_write(&target, &bytes)
                .map_err(|e| BundleError::new(format!("write {}: {e}", target.display())))
        })
        .await
        .map_err(|e| BundleError::new(format!("bundler task failed: {e}")))??;

        trace!(
            package = %request.package,
            chunk = %chunk_path.display(),
            "Copied chunk"
        );

        Ok(BundleOutput {
            chunk_path,
            consumed_files: vec![request.entry_file],
        })
    }
}
