//! TCP Server
//!
//! Owns the listener and the pieces shared by every connection, and runs
//! the startup and shutdown sequences:
//!
//! ```text
//! startup:  load snapshot ─> start sweeper ─> accept loop
//! shutdown: stop accepting ─> close connections ─> wait (bounded)
//!           ─> save snapshot ─> stop sweeper
//! ```
//!
//! Shutdown is triggered by SIGINT/SIGTERM (when started through
//! [`Server::serve`]), by the `SHUTDOWN` command, or by any holder of the
//! [`Shutdown`] handle.

use crate::commands::CommandDispatcher;
use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::shutdown::Shutdown;
use crate::storage::{ExpiryConfig, ExpirySweeper, Snapshot, Store};
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// A LineKV server instance.
pub struct Server {
    config: Arc<ServerConfig>,
    dispatcher: CommandDispatcher,
}

impl Server {
    /// Creates a server over an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(Store::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<Store>) -> Self {
        let dispatcher = CommandDispatcher::new(store, Shutdown::new())
            .with_snapshot_path(config.snapshot_path.clone());
        Self {
            config: Arc::new(config),
            dispatcher,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        self.dispatcher.store()
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Handle that stops the server when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.dispatcher.shutdown().clone()
    }

    /// Binds the configured address and runs until SIGINT, SIGTERM or
    /// another shutdown trigger.
    pub async fn serve(self) -> anyhow::Result<()> {
        let address = self.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind {}", address))?;

        let shutdown = self.shutdown_handle();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Shutdown signal received, stopping server...");
            shutdown.trigger();
        });

        self.run(listener).await
    }

    /// Runs the server on an already bound listener until shutdown.
    pub async fn run(self, listener: TcpListener) -> anyhow::Result<()> {
        self.restore_snapshot().await;

        let sweeper = ExpirySweeper::start(
            Arc::clone(self.store()),
            ExpiryConfig {
                interval: self.config.sweep_interval,
            },
        );

        info!(address = %listener.local_addr()?, "Server is listening");

        let shutdown = self.shutdown_handle();
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            self.dispatcher.clone(),
                            Arc::clone(&self.config),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        drop(listener);
        info!("Stopped accepting connections");

        let registry = self.dispatcher.registry();
        let closing = registry.close_all();
        info!(connections = closing, "Closing client connections");
        if tokio::time::timeout(self.config.shutdown_timeout, registry.wait_until_empty())
            .await
            .is_err()
        {
            warn!(
                remaining = registry.len(),
                "Timed out waiting for connections to close"
            );
        }

        self.save_snapshot().await;
        sweeper.stop();

        info!("Server shutdown complete");
        Ok(())
    }

    /// Loads the configured snapshot. A missing file is a cold start; an
    /// unreadable one is logged and the server starts empty.
    async fn restore_snapshot(&self) {
        let Some(path) = self.config.snapshot_path.clone() else {
            info!("Persistence disabled, starting empty");
            return;
        };

        let loaded = tokio::task::spawn_blocking({
            let path = path.clone();
            move || Snapshot::load(&path)
        })
        .await;

        match loaded {
            Ok(Ok(Some(snapshot))) => {
                let keys = self.store().restore(snapshot);
                info!(path = %path.display(), keys = keys, "Snapshot restored");
            }
            Ok(Ok(None)) => {
                info!(path = %path.display(), "No snapshot found, starting empty");
            }
            Ok(Err(e)) => {
                error!(path = %path.display(), error = %e, "Failed to load snapshot, starting empty");
            }
            Err(e) => {
                error!(error = %e, "Snapshot loader task failed, starting empty");
            }
        }
    }

    async fn save_snapshot(&self) {
        let Some(path) = self.config.snapshot_path.clone() else {
            return;
        };

        let snapshot = self.store().snapshot();
        let keys = snapshot.len();
        let saved = tokio::task::spawn_blocking({
            let path = path.clone();
            move || snapshot.save(&path)
        })
        .await;

        match saved {
            Ok(Ok(())) => info!(path = %path.display(), keys = keys, "Final snapshot saved"),
            Ok(Err(e)) => error!(path = %path.display(), error = %e, "Failed to save snapshot"),
            Err(e) => error!(error = %e, "Snapshot writer task failed"),
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
