//! File system side of module resolution.
//!
//! Extension probing, directory entry lookup and `node_modules` package
//! location. ES entry fields win over legacy ones: a manifest's `module`
//! is preferred to its `main`.

use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extensions probed after the exact path, module variants before legacy ones.
pub const EXTENSIONS: &[&str] = &[
    ".mjs", ".js", ".mts", ".ts", ".tsx", ".jsx", ".json", ".css",
];

/// Resolve `base` to an existing file.
///
/// Tries the exact path, then `base` + each extension, then the directory
/// entry (`package.json` fields, then `index.*`).
#[must_use]
pub fn probe_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(canonical(base));
    }

    for ext in EXTENSIONS {
        let candidate = with_appended_extension(base, ext);
        if candidate.is_file() {
            return Some(canonical(&candidate));
        }
    }

    if base.is_dir() {
        return probe_directory(base);
    }
    None
}

/// Entry file of a directory: manifest entry fields first, then `index.*`.
#[must_use]
pub fn probe_directory(dir: &Path) -> Option<PathBuf> {
    if let Ok(manifest) = PackageManifest::read(dir) {
        if let Some(entry) = manifest.entry_file() {
            return Some(entry);
        }
    }

    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("index{ext}")))
        .find(|p| p.is_file())
        .map(|p| canonical(&p))
}

/// `node_modules` directories visible from `from_dir`, nearest first.
#[must_use]
pub fn node_modules_chain(from_dir: &Path) -> Vec<PathBuf> {
    from_dir
        .ancestors()
        .filter(|dir| dir.file_name().map_or(true, |n| n != "node_modules"))
        .map(|dir| dir.join("node_modules"))
        .filter(|nm| nm.is_dir())
        .collect()
}

/// Directory of package `name` in the first `node_modules` that has it.
#[must_use]
pub fn locate_package(chain: &[PathBuf], name: &str) -> Option<PathBuf> {
    chain
        .iter()
        .map(|nm| nm.join(name))
        .find(|dir| dir.join("package.json").is_file())
        .map(|dir| canonical(&dir))
}

/// The fields of a `package.json` the bundler cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub dir: PathBuf,
    pub name: Option<String>,
    /// ES module entry.
    pub module: Option<String>,
    /// Legacy entry.
    pub main: Option<String>,
    /// Declared runtime dependency names.
    pub dependencies: Vec<String>,
}

/// Manifest read/parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestError {
    pub path: PathBuf,
    pub message: String,
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for ManifestError {}

impl PackageManifest {
    /// Read `<dir>/package.json`.
    pub fn read(dir: &Path) -> Result<Self, ManifestError> {
        let path = dir.join("package.json");
        let fail = |message: String| ManifestError {
            path: path.clone(),
            message,
        };

        let content = std::fs::read_to_string(&path).map_err(|e| fail(e.to_string()))?;
        let json: Value = serde_json::from_str(&content).map_err(|e| fail(e.to_string()))?;

        let field = |key: &str| {
            json.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let dependencies = json
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default();

        Ok(Self {
            dir: dir.to_path_buf(),
            name: field("name"),
            module: field("module"),
            main: field("main"),
            dependencies,
        })
    }

    /// The ES entry file: `module`, then `main`, then `index.*`.
    #[must_use]
    pub fn entry_file(&self) -> Option<PathBuf> {
        for field in [&self.module, &self.main].into_iter().flatten() {
            let target = self.dir.join(field.trim_start_matches("./"));
            if target.is_file() {
                return Some(canonical(&target));
            }
            if let Some(found) = EXTENSIONS
                .iter()
                .map(|ext| with_appended_extension(&target, ext))
                .find(|p| p.is_file())
            {
                return Some(canonical(&found));
            }
            if target.is_dir() {
                if let Some(index) = EXTENSIONS
                    .iter()
                    .map(|ext| target.join(format!("index{ext}")))
                    .find(|p| p.is_file())
                {
                    return Some(canonical(&index));
                }
            }
        }

        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("index{ext}")))
            .find(|p| p.is_file())
            .map(|p| canonical(&p))
    }
}

/// `foo.bar` + `.js` → `foo.bar.js` (unlike `with_extension`, keeps the dot part).
fn with_appended_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(ext);
    PathBuf::from(name)
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn root() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dunce::canonicalize(dir.path()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_probe_prefers_module_variant() {
        let (_dir, root) = root();
        write(&root, "src/util.js", "");
        write(&root, "src/util.mjs", "");

        let found = probe_file(&root.join("src/util")).unwrap();
        assert_eq!(found, root.join("src/util.mjs"));
    }

    #[test]
    fn test_probe_keeps_dotted_names() {
        let (_dir, root) = root();
        write(&root, "src/app.config.js", "");
        assert_eq!(
            probe_file(&root.join("src/app.config")).unwrap(),
            root.join("src/app.config.js")
        );
    }

    #[test]
    fn test_probe_directory_index() {
        let (_dir, root) = root();
        write(&root, "src/components/index.js", "");
        assert_eq!(
            probe_file(&root.join("src/components")).unwrap(),
            root.join("src/components/index.js")
        );
        assert!(probe_file(&root.join("src/nothing")).is_none());
    }

    #[test]
    fn test_manifest_module_before_main() {
        let (_dir, root) = root();
        write(
            &root,
            "node_modules/dual/package.json",
            r#"{"name":"dual","main":"./lib/index.cjs","module":"./esm/index.js","dependencies":{"b":"1","a":"2"}}"#,
        );
        write(&root, "node_modules/dual/lib/index.cjs", "");
        write(&root, "node_modules/dual/esm/index.js", "");

        let chain = node_modules_chain(&root.join("src"));
        assert_eq!(chain, vec![root.join("node_modules")]);

        let dir = locate_package(&chain, "dual").unwrap();
        let manifest = PackageManifest::read(&dir).unwrap();
        assert_eq!(manifest.dependencies, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(manifest.entry_file().unwrap(), dir.join("esm/index.js"));
    }

    #[test]
    fn test_manifest_falls_back_to_main_then_index() {
        let (_dir, root) = root();
        write(&root, "node_modules/legacy/package.json", r#"{"main":"main"}"#);
        write(&root, "node_modules/legacy/main.js", "");
        write(&root, "node_modules/bare/package.json", r#"{"name":"bare"}"#);
        write(&root, "node_modules/bare/index.mjs", "");

        let chain = node_modules_chain(&root);
        let legacy = locate_package(&chain, "legacy").unwrap();
        assert_eq!(
            PackageManifest::read(&legacy).unwrap().entry_file().unwrap(),
            legacy.join("main.js")
        );
        let bare = locate_package(&chain, "bare").unwrap();
        assert_eq!(
            PackageManifest::read(&bare).unwrap().entry_file().unwrap(),
            bare.join("index.mjs")
        );
    }

    #[test]
    fn test_scoped_package_location() {
        let (_dir, root) = root();
        write(&root, "node_modules/@scope/pkg/package.json", r#"{"module":"x.js"}"#);
        write(&root, "node_modules/@scope/pkg/x.js", "");
        let chain = node_modules_chain(&root);
        assert!(locate_package(&chain, "@scope/pkg").is_some());
        assert!(locate_package(&chain, "@scope/other").is_none());
    }

    #[test]
    fn test_invalid_manifest() {
        let (_dir, root) = root();
        write(&root, "broken/package.json", "{ nope");
        let err = PackageManifest::read(&root.join("broken")).unwrap_err();
        assert!(err.path.ends_with("package.json"));
    }
}
