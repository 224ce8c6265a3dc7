//! Specifier classification and lexical path helpers.

use std::path::{Component, Path, PathBuf};

/// What kind of import specifier we are looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// `http:`, `https:` or `data:`; served by someone else.
    PassThrough,
    /// `./x` or `../x`.
    Relative,
    /// `/x`, rooted at the project root (or the package mount).
    Absolute,
    /// `name`, `name/sub`, `@scope/name/sub`.
    Bare,
}

const PASS_THROUGH_SCHEMES: &[&str] = &["http:", "https:", "data:"];

#[must_use]
pub fn classify(specifier: &str) -> SpecifierKind {
    if PASS_THROUGH_SCHEMES
        .iter()
        .any(|scheme| specifier.starts_with(scheme))
    {
        SpecifierKind::PassThrough
    } else if specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
    {
        SpecifierKind::Relative
    } else if specifier.starts_with('/') {
        SpecifierKind::Absolute
    } else {
        SpecifierKind::Bare
    }
}

/// Split a bare specifier into `(package_name, sub_path)`.
///
/// A scoped name (`@scope/name`) is one unit. Returns `None` for empty or
/// malformed names and for sub-paths that climb out of the package.
#[must_use]
pub fn split_bare(specifier: &str) -> Option<(String, String)> {
    let mut parts = specifier.splitn(3, '/');
    let first = parts.next().filter(|s| !s.is_empty())?;

    let (name, rest) = if first.starts_with('@') {
        let second = parts.next().filter(|s| !s.is_empty())?;
        if first.len() == 1 {
            return None;
        }
        (format!("{first}/{second}"), parts.next().unwrap_or(""))
    } else {
        let rest = specifier
            .split_once('/')
            .map_or("", |(_, rest)| rest);
        (first.to_string(), rest)
    };

    if name.starts_with('.') {
        return None;
    }

    let sub_path = rest.trim_matches('/');
    if sub_path.split('/').any(|seg| seg == "..") {
        return None;
    }
    Some((name, sub_path.to_string()))
}

/// Resolve `.` and `..` components without touching the file system.
///
/// `..` never climbs above the first component of `path`.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir | Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` relative to `base` as a forward-slash string, if it lies inside.
#[must_use]
pub fn relative_slash(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("https://cdn.example.com/x.js"), SpecifierKind::PassThrough);
        assert_eq!(classify("data:text/javascript,1"), SpecifierKind::PassThrough);
        assert_eq!(classify("./a.js"), SpecifierKind::Relative);
        assert_eq!(classify("../a"), SpecifierKind::Relative);
        assert_eq!(classify("/src/a.js"), SpecifierKind::Absolute);
        assert_eq!(classify("react"), SpecifierKind::Bare);
        assert_eq!(classify("@scope/pkg"), SpecifierKind::Bare);
    }

    #[test]
    fn test_split_bare() {
        assert_eq!(split_bare("pkg"), Some(("pkg".into(), String::new())));
        assert_eq!(
            split_bare("pkg/sub/path.js"),
            Some(("pkg".into(), "sub/path.js".into()))
        );
        assert_eq!(
            split_bare("@scope/pkg"),
            Some(("@scope/pkg".into(), String::new()))
        );
        assert_eq!(
            split_bare("@scope/pkg/deep/file"),
            Some(("@scope/pkg".into(), "deep/file".into()))
        );
        assert_eq!(split_bare("@scope"), None);
        assert_eq!(split_bare(""), None);
        assert_eq!(split_bare("pkg/../other"), None);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/app/src/../lib/./a.js")),
            PathBuf::from("/app/lib/a.js")
        );
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("lib/../../a")), PathBuf::from("a"));
    }

    #[test]
    fn test_relative_slash() {
        assert_eq!(
            relative_slash(Path::new("/app/src/a.js"), Path::new("/app")),
            Some("src/a.js".to_string())
        );
        assert_eq!(relative_slash(Path::new("/other/a.js"), Path::new("/app")), None);
    }
}
