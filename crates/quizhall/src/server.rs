//! `QuizhallServer` builder and server loop.
//!
//! This is the entry point for running a Quizhall server. It ties
//! together all the layers: transport → protocol → session → room.

use std::sync::Arc;
use std::time::{Duration, Instant};

use quizhall_protocol::{Codec, JsonCodec};
use quizhall_room::{QuestionCatalog, RoomConfig, RoomManager};
use quizhall_session::{Authenticator, SessionConfig, SessionManager};
use quizhall_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::QuizhallError;
use crate::handler::handle_connection;

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// How long a connection may stay silent before it is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Lock order
/// is `sessions` before `rooms`; neither lock is held longer than one
/// operation.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) rooms: Mutex<RoomManager>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    started_at: Instant,
}

impl<A: Authenticator, C: Codec> ServerState<A, C> {
    /// Milliseconds since the server started.
    pub(crate) fn server_time(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Builder for configuring and starting a Quizhall server.
///
/// # Example
///
/// ```rust,ignore
/// use quizhall::prelude::*;
///
/// let server = QuizhallServer::builder()
///     .bind("0.0.0.0:5000")
///     .catalog(QuestionCatalog::builtin())
///     .build(CallerIdentity)
///     .await?;
/// server.run().await
/// ```
pub struct QuizhallServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    room_config: RoomConfig,
    catalog: QuestionCatalog,
}

impl QuizhallServerBuilder {
    /// Creates a new builder with default settings and the built-in
    /// question sets.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            session_config: SessionConfig::default(),
            room_config: RoomConfig::default(),
            catalog: QuestionCatalog::builtin(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the reconnect grace period and other session settings.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets room capacity and question timing.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Replaces the question catalog.
    pub fn catalog(mut self, catalog: QuestionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Binds the listener and builds the server with the given
    /// authenticator, speaking JSON over WebSocket.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<QuizhallServer<A, JsonCodec>, QuizhallError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        tracing::info!(
            sets = self.catalog.len(),
            max_members = self.room_config.max_members,
            grace_ms = self.session_config.reconnect_grace.as_millis() as u64,
            "server configured"
        );

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.session_config)),
            rooms: Mutex::new(RoomManager::new(
                Arc::new(self.catalog),
                self.room_config,
            )),
            auth,
            codec: JsonCodec,
            started_at: Instant::now(),
        });

        Ok(QuizhallServer { transport, state })
    }
}

impl Default for QuizhallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Quizhall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct QuizhallServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl QuizhallServer<quizhall_session::CallerIdentity, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> QuizhallServerBuilder {
        QuizhallServerBuilder::new()
    }
}

impl<A, C> QuizhallServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), QuizhallError> {
        tracing::info!("Quizhall server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
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
