use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// URL prefix under which materialized package chunks are served.
pub const DEFAULT_MOUNT_PREFIX: &str = "/@modules/";

/// Legacy icon path browsers request unprompted.
pub const DEFAULT_ICON_PATH: &str = "/favicon.ico";

/// Built-in icon served when the project has none.
pub const DEFAULT_ICON_FALLBACK: &str = "/@esmserve/favicon.svg";

/// Runtime configuration for the dev server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project root; project URLs map onto it.
    pub root: PathBuf,

    /// URL prefix of the package mount (leading and trailing `/`).
    pub mount_prefix: String,

    /// Directory holding package descriptors and chunks.
    pub mount_dir: PathBuf,

    /// Host to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Emit `link: rel=preload` hints for discovered imports.
    pub push: bool,

    /// Emit `link: rel=modulepreload` hints for discovered imports.
    pub preload: bool,

    /// Missing-icon redirect: `(requested path, fallback location)`.
    pub icon_redirect: Option<(String, String)>,
}

/// How discovered imports are advertised to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkStrategy {
    /// Preload hints a push-capable front end acts on.
    Push,
    /// Module preload hints for the browser.
    Preload,
    #[default]
    None,
}

impl LinkStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Preload => "preload",
            Self::None => "none",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl Config {
    /// Create a config rooted at the given project directory.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        let mount_dir = default_mount_dir(&root);
        Self {
            root,
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            mount_dir,
            host: "localhost".to_string(),
            port: 3000,
            push: false,
            preload: false,
            icon_redirect: Some((
                DEFAULT_ICON_PATH.to_string(),
                DEFAULT_ICON_FALLBACK.to_string(),
            )),
        }
    }

    /// Effective link strategy. Push takes precedence over preload.
    #[must_use]
    pub fn link_strategy(&self) -> LinkStrategy {
        if self.push {
            LinkStrategy::Push
        } else if self.preload {
            LinkStrategy::Preload
        } else {
            LinkStrategy::None
        }
    }

    /// Set the link strategy, replacing both flags.
    #[must_use]
    pub fn with_link_strategy(mut self, strategy: LinkStrategy) -> Self {
        self.push = strategy == LinkStrategy::Push;
        self.preload = strategy == LinkStrategy::Preload;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override where package chunks are materialized.
    #[must_use]
    pub fn with_mount_dir(mut self, dir: PathBuf) -> Self {
        self.mount_dir = dir;
        self
    }

    /// Set or disable the missing-icon redirect.
    #[must_use]
    pub fn with_icon_redirect(mut self, redirect: Option<(String, String)>) -> Self {
        self.icon_redirect = redirect;
        self
    }

    /// Whether a URL addresses the package mount.
    #[must_use]
    pub fn is_mount_url(&self, url: &str) -> bool {
        url.starts_with(&self.mount_prefix)
    }
}

/// `<root>/.esmserve/modules`
#[must_use]
pub fn default_mount_dir(root: &Path) -> PathBuf {
    root.join(".esmserve").join("modules")
}
