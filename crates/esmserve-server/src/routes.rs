//! Built-in route table.

use esmserve_core::config::DEFAULT_ICON_FALLBACK;
use esmserve_core::{Config, Method, PathRouter, Result};

/// What a matched route serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The built-in icon.
    Icon,
    /// `/` serves the project's `index.html`.
    Index,
    /// Package chunks under the mount prefix.
    Mount,
    /// Project files.
    Project,
}

/// Cross-cutting request/response steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Before: one log line per request.
    AccessLog,
    /// After: `x-content-type-options: nosniff`.
    NoSniff,
}

/// The server's route table for `config`.
///
/// Fails if two built-in routes collide, e.g. a mount prefix equal to the
/// icon path.
pub fn builtin_routes(config: &Config) -> Result<PathRouter<Endpoint, Filter>> {
    let mut router = PathRouter::new();
    router.register(Method::Get, DEFAULT_ICON_FALLBACK, Endpoint::Icon)?;
    router.register(
        Method::Get,
        &format!("{}/**", config.mount_prefix.trim_end_matches('/')),
        Endpoint::Mount,
    )?;
    router.register(Method::Get, "/", Endpoint::Index)?;
    router.register(Method::Get, "/**", Endpoint::Project)?;

    router.before("/**", Filter::AccessLog)?;
    router.after("/**", Filter::NoSniff)?;
    Ok(router)
}
