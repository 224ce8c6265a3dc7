use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::resolver::native::EXTENSIONS;

/// What the server knows about one materialized package.
///
/// `bundle` only ever grows. Paths in `main`, `bundle` and `chunks` are
/// forward-slash relative paths: `main` and chunk values relative to the
/// package's mount directory, bundled sub-paths relative to `origin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    /// Entry chunk.
    pub main: String,
    /// Package directory inside `node_modules`.
    pub origin: PathBuf,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Origin-relative sub-paths already folded into some chunk.
    #[serde(default)]
    pub bundle: BTreeSet<String>,
    /// Bundled sub-path → chunk that contains it. Sub-paths missing here
    /// live in the entry chunk.
    #[serde(default)]
    pub chunks: BTreeMap<String, String>,
}

impl PackageDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, main: impl Into<String>, origin: PathBuf) -> Self {
        Self {
            name: name.into(),
            main: main.into(),
            origin,
            dependencies: Vec::new(),
            bundle: BTreeSet::new(),
            chunks: BTreeMap::new(),
        }
    }

    /// The chunk already holding `sub_path`, trying the raw sub-path and
    /// then its extension variants.
    #[must_use]
    pub fn chunk_for(&self, sub_path: &str) -> Option<&str> {
        let sub_path = sub_path.trim_start_matches("./");
        if sub_path.is_empty() {
            return Some(&self.main);
        }
        std::iter::once(sub_path.to_string())
            .chain(EXTENSIONS.iter().map(|ext| format!("{sub_path}{ext}")))
            .find_map(|candidate| self.owning_chunk(&candidate))
    }

    /// The chunk holding an exact bundled sub-path.
    #[must_use]
    pub fn owning_chunk(&self, bundled: &str) -> Option<&str> {
        if !self.bundle.contains(bundled) {
            return None;
        }
        Some(self.chunks.get(bundled).map_or(self.main.as_str(), String::as_str))
    }

    /// Record `sub_paths` as folded into `chunk`.
    ///
    /// Sub-paths already bundled keep their chunk. Returns whether anything
    /// changed.
    pub fn record_bundled<I, S>(&mut self, chunk: &str, sub_paths: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut changed = false;
        for sub in sub_paths {
            let sub = sub.into();
            if sub.is_empty() || self.bundle.contains(&sub) {
                continue;
            }
            if chunk != self.main {
                self.chunks.insert(sub.clone(), chunk.to_string());
            }
            self.bundle.insert(sub);
            changed = true;
        }
        changed
    }
}
