//! Transformer seam.
//!
//! Content rewriting (syntax lowering, stylesheet compilation, import
//! rewriting) happens behind [`Transformer`]. The pipeline hands it the
//! source bytes and a [`SpecifierResolver`] to call for every import it
//! discovers; the transformer reports which extra files contributed to its
//! output so the cache can watch them.

mod esm;

pub use esm::{find_specifiers, EsmTransformer, SpecifierSpan};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Content category, by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCategory {
    /// `.js`, `.mjs`, `.ts`, `.tsx`, `.jsx`, `.mts`
    Script,
    /// `.css`
    Style,
    /// `.html`, `.htm`
    Markup,
    /// `.json`
    Json,
    /// Everything else, served verbatim.
    Asset,
}

impl ContentCategory {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "js" | "mjs" | "ts" | "tsx" | "jsx" | "mts" => Self::Script,
            "css" => Self::Style,
            "html" | "htm" => Self::Markup,
            "json" => Self::Json,
            _ => Self::Asset,
        }
    }

    /// Whether this category goes through the transformer.
    #[must_use]
    pub fn is_transformable(&self) -> bool {
        !matches!(self, Self::Asset)
    }
}

/// Resolves an import specifier found in `referencing_file` to a served URL.
#[async_trait]
pub trait SpecifierResolver: Send + Sync {
    async fn resolve(&self, referencing_file: &Path, specifier: &str) -> crate::Result<String>;
}

/// Input to a transform.
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub filename: &'a Path,
    pub category: ContentCategory,
    pub source: &'a [u8],
}

/// Transformed content.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub content: Vec<u8>,
    pub content_type: String,
    /// Files other than the source that contributed to `content`.
    pub dependency_files: Vec<PathBuf>,
}

/// Transform failure.
#[derive(Error, Debug)]
pub enum TransformError {
    /// The transformer rejected the source; carries its diagnostic.
    #[error("{0}")]
    Diagnostic(String),

    /// A specifier could not be resolved.
    #[error(transparent)]
    Resolve(#[from] crate::Error),
}

/// Rewrites served content.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        request: TransformRequest<'_>,
        resolver: &dyn SpecifierResolver,
    ) -> Result<TransformOutput, TransformError>;
}
