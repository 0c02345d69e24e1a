//! Simulated server lifecycle.
//!
//! Owns the [`DisplayServer`] state and the TCP listener. Runs until a
//! client requests the `quit` mode or the stop handle is cleared.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use vdisp_core::{DisplayServer, Result, serve_until_quit};

use crate::config::SimConfig;

// ── SimService ───────────────────────────────────────────────────

pub struct SimService {
    config: SimConfig,
    server: Arc<DisplayServer>,
    running: Arc<AtomicBool>,
}

impl SimService {
    pub fn new(config: SimConfig) -> Self {
        let server = Arc::new(DisplayServer::new(config.to_server_options()));
        Self {
            config,
            server,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that stops the service when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn server(&self) -> &Arc<DisplayServer> {
        &self.server
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the configured address and serve.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.network.listen_address.as_str()).await?;
        self.run_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "display server {} listening on {}",
            self.server.name(),
            listener.local_addr()?
        );

        let result = tokio::select! {
            result = serve_until_quit(listener, Arc::clone(&self.server)) => result,
            _ = Self::wait_for_stop(&self.running) => Ok(()),
        };

        self.running.store(false, Ordering::SeqCst);
        info!("display server stopped");
        result
    }

    /// Resolves when `running` becomes false.
    async fn wait_for_stop(running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
