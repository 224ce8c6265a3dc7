use esmserve_core::{Config, PackageRegistry};
use miette::{IntoDiagnostic, Result};

/// List persisted package descriptors.
pub fn run(config: Config, json: bool) -> Result<()> {
    let registry = PackageRegistry::new(config.mount_dir.clone());
    let packages = registry.list();

    if json {
        let out: Vec<_> = packages.iter().map(|d| d.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
        return Ok(());
    }

    if packages.is_empty() {
        println!("No packages materialized in {}", config.mount_dir.display());
        return Ok(());
    }
    for descriptor in &packages {
        println!(
            "{}  {}{}/{}  ({} bundled)",
            descriptor.name,
            config.mount_prefix,
            descriptor.name,
            descriptor.main,
            descriptor.bundle.len()
        );
    }
    Ok(())
}
