//! `ParlorServer` builder and accept loop.
//!
//! The entry point for running a Parlor game server: transport →
//! handlers → engine actor, wired together here.

use parlor_game::{GameRegistry, NoopPersistence, Persistence};
use parlor_transport::{Transport, WebSocketTransport};

use crate::ParlorError;
use crate::engine::{Engine, EngineConfig, EngineHandle};
use crate::handler::handle_connection;

/// Builder for configuring and starting a Parlor server.
///
/// # Example
///
/// ```rust,ignore
/// let mut games = GameRegistry::new();
/// games.register("four-in-a-row", |_room| Box::new(FourInARow::new()));
///
/// let server = ParlorServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(games)
///     .await?;
/// server.run().await
/// ```
pub struct ParlorServerBuilder {
    bind_addr: String,
    config: EngineConfig,
    persistence: Box<dyn Persistence>,
}

impl ParlorServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: EngineConfig::default(),
            persistence: Box::new(NoopPersistence),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the persistence collaborator (defaults to a no-op).
    pub fn persistence(mut self, persistence: impl Persistence) -> Self {
        self.persistence = Box::new(persistence);
        self
    }

    /// Binds the transport and assembles the server with the given
    /// contract registry.
    pub async fn build(self, games: GameRegistry) -> Result<ParlorServer, ParlorError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let (engine, handle) = Engine::new(self.config, games, self.persistence);
        Ok(ParlorServer {
            transport,
            engine: Some(engine),
            handle,
            config: self.config,
        })
    }
}

impl Default for ParlorServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Parlor game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParlorServer {
    transport: WebSocketTransport,
    engine: Option<Engine>,
    handle: EngineHandle,
    config: EngineConfig,
}

impl ParlorServer {
    /// Creates a new builder.
    pub fn builder() -> ParlorServerBuilder {
        ParlorServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle into the engine, for embedding or inspection.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Runs the engine actor and the accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), ParlorError> {
        if let Some(engine) = self.engine.take() {
            tokio::spawn(engine.run());
        }
        tracing::info!("Parlor server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let engine = self.handle.clone();
                    let timeout = self.config.handshake_timeout;
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(conn, engine, timeout).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
