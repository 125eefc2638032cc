//! `DuelServer` builder and accept loop.
//!
//! This is the entry point for running a Duel server. It ties together
//! all the layers: transport → protocol → session → room.

use std::future::Future;
use std::sync::Arc;

use duel_games::builtin_registry;
use duel_room::{GameRegistry, Manager};
use duel_store::{MemoryStore, Store};
use duel_transport::WebSocketTransport;

use crate::DuelError;
use crate::config::ServerConfig;
use crate::handler::{PumpSettings, handle_connection};

/// Builder for configuring and starting a Duel server.
///
/// # Example
///
/// ```rust,no_run
/// use duel::prelude::*;
///
/// # async fn start() -> Result<(), DuelError> {
/// let server = DuelServerBuilder::new()
///     .bind("127.0.0.1:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DuelServerBuilder<S: Store = MemoryStore> {
    config: ServerConfig,
    store: Arc<S>,
    games: GameRegistry,
}

impl DuelServerBuilder<MemoryStore> {
    /// Creates a builder with default settings, an empty in-memory store,
    /// and the built-in games.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            store: Arc::new(MemoryStore::new()),
            games: builtin_registry(),
        }
    }
}

impl Default for DuelServerBuilder<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> DuelServerBuilder<S> {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.listen_addr = addr.to_string();
        self
    }

    /// Uses `store` for room records, players, and connection names.
    pub fn store<T: Store>(self, store: Arc<T>) -> DuelServerBuilder<T> {
        DuelServerBuilder {
            config: self.config,
            store,
            games: self.games,
        }
    }

    /// Replaces the set of playable games.
    pub fn games(mut self, games: GameRegistry) -> Self {
        self.games = games;
        self
    }

    /// Validates the configuration and binds the listener.
    ///
    /// # Errors
    /// [`DuelError::Config`] for an invalid configuration,
    /// [`DuelError::Transport`] if the address cannot be bound.
    pub async fn build(self) -> Result<DuelServer<S>, DuelError> {
        self.config.validate()?;
        let transport = WebSocketTransport::bind(&self.config.listen_addr).await?;
        let manager = Arc::new(Manager::new(
            self.store,
            self.games,
            self.config.manager_config(),
        ));

        Ok(DuelServer {
            transport,
            manager,
            pumps: PumpSettings::from(&self.config),
        })
    }
}

/// A bound Duel server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuelServer<S: Store> {
    transport: WebSocketTransport,
    manager: Arc<Manager<S>>,
    pumps: PumpSettings,
}

impl<S: Store> DuelServer<S> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The connection and room registry.
    pub fn manager(&self) -> &Arc<Manager<S>> {
        &self.manager
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), DuelError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Before the first accept, connection records left by a previous
    /// process are removed and the maintenance task is started. Once
    /// `shutdown` fires no new connection is accepted; connections
    /// already running keep their tasks.
    ///
    /// # Errors
    /// [`DuelError::Room`] if the store cannot be reached at startup.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), DuelError>
    where
        F: Future,
    {
        self.manager.reconcile_startup().await?;
        let maintenance = self.manager.spawn_maintenance();

        tracing::info!(addr = ?self.transport.local_addr().ok(), "Duel server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let manager = Arc::clone(&self.manager);
                        let pumps = self.pumps;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(pending, manager, pumps).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        maintenance.abort();
        Ok(())
    }
}
