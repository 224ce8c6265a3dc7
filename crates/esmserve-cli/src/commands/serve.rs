use esmserve_core::Config;
use esmserve_server::Server;
use miette::{IntoDiagnostic, Result};

/// Run the dev server until Ctrl+C.
pub fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(async {
        let server = Server::bind(config).await.into_diagnostic()?;
        let addr = server.local_addr().into_diagnostic()?;
        eprintln!();
        eprintln!("  esmserve running at http://{addr}");
        eprintln!("  Press Ctrl+C to stop");
        eprintln!();
        server.run().await.into_diagnostic()
    })
}
