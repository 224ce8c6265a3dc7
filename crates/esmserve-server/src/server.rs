//! Server assembly and lifecycle.

use esmserve_core::{Config, DevContext};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::app::{build_app, AppState};
use crate::error::{ServerError, ServerResult};
use crate::watcher::{spawn_event_loop, NotifyWatcher};

/// A bound dev server, ready to run.
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
    events: JoinHandle<()>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.listener.local_addr().ok())
            .field("root", &self.state.ctx.config.root)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Build the engine for `config`, start watching, and bind the listener.
    pub async fn bind(config: Config) -> ServerResult<Self> {
        let host_ip = if config.host == "localhost" {
            "127.0.0.1"
        } else {
            config.host.as_str()
        };
        let addr: SocketAddr = format!("{host_ip}:{}", config.port).parse().map_err(
            |e: std::net::AddrParseError| ServerError::InvalidAddress {
                addr: format!("{}:{}", config.host, config.port),
                reason: e.to_string(),
            },
        )?;

        let (watcher, events) = NotifyWatcher::new()?;
        let ctx = DevContext::new(config, Arc::new(watcher));
        let events = spawn_event_loop(events, Arc::clone(&ctx.cache));
        let state = Arc::new(AppState::new(ctx)?);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            state,
            events,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Serve until Ctrl+C.
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.local_addr()?;
        let config = &self.state.ctx.config;
        info!(
            addr = %addr,
            root = %config.root.display(),
            mount = %config.mount_prefix,
            link = config.link_strategy().as_str(),
            "Dev server listening"
        );

        let app = build_app(Arc::clone(&self.state));
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            })
            .await?;

        self.events.abort();
        Ok(())
    }
}
