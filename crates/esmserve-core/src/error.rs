use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result alias for esmserve operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error type for esmserve operations.
///
/// `Clone` because a deduplicated production hands the same outcome to
/// every caller attached to it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("No route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Route already registered: {method} {pattern}")]
    DuplicateRoute { method: String, pattern: String },

    #[error("Not found: {url}")]
    ResourceNotFound { url: String },

    #[error("Redirect to {location}")]
    Redirect { location: String },

    #[error("Cannot resolve {specifier:?} imported from {referrer}: {reason}")]
    ModuleNotFound {
        specifier: String,
        referrer: PathBuf,
        reason: String,
    },

    #[error("Package not found: {name} (searched from {root})")]
    PackageNotFound { name: String, root: PathBuf },

    #[error("Package {package} has no file for sub-path {sub_path:?}")]
    SubpathNotFound { package: String, sub_path: String },

    #[error("Transform failed for {file}: {diagnostic}")]
    Transform { file: PathBuf, diagnostic: String },

    #[error("Bundling {package}{} failed: {message}", display_sub_path(.sub_path))]
    Bundle {
        package: String,
        sub_path: String,
        message: String,
    },

    #[error("Package registry error at {path}: {message}")]
    Registry { path: PathBuf, message: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
}

fn display_sub_path(sub_path: &str) -> String {
    if sub_path.is_empty() {
        String::new()
    } else {
        format!("/{sub_path}")
    }
}

impl Error {
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// HTTP status code this error surfaces as.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::RouteNotFound { .. } | Self::ResourceNotFound { .. } => 404,
            Self::Redirect { .. } => 308,
            _ => 500,
        }
    }

    /// Whether the error means "nothing there" rather than "something broke".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == 404
    }
}
