use esmserve_core::{Config, PackageBundler};
use miette::{IntoDiagnostic, Result};

/// Reset one package, or every package when `package` is `None`.
pub fn run(config: Config, package: Option<&str>, json: bool) -> Result<()> {
    let bundler = PackageBundler::passthrough(config.root.clone(), config.mount_dir.clone());

    let removed: Vec<String> = match package {
        Some(name) => {
            if bundler.reset(name).into_diagnostic()? {
                vec![name.to_string()]
            } else {
                Vec::new()
            }
        }
        None => {
            let names = bundler
                .registry()
                .list()
                .iter()
                .map(|d| d.name.clone())
                .collect();
            bundler.reset_all().into_diagnostic()?;
            names
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "removed": removed }))
                .into_diagnostic()?
        );
    } else if removed.is_empty() {
        println!("Nothing to clean");
    } else {
        for name in &removed {
            println!("Removed {name}");
        }
    }
    Ok(())
}
