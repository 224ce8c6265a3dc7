use esmserve_core::{Config, DevContext, ManualWatcher};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Resolve one specifier the way the server would, bundling on demand.
pub fn run(config: Config, specifier: &str, from: Option<PathBuf>, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let ctx = DevContext::new(config, Arc::new(ManualWatcher::new()));

    let from = match from {
        Some(path) if path.is_absolute() => path,
        Some(path) => ctx.config.root.join(path),
        None => ctx.config.root.join("index.html"),
    };

    let url = runtime
        .block_on(ctx.resolver.resolve(&from, specifier))
        .into_diagnostic()?;

    if json {
        let out = serde_json::json!({
            "specifier": specifier,
            "from": from,
            "url": url,
        });
        println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
    } else {
        println!("{url}");
    }
    Ok(())
}
