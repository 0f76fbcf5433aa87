//! `DigitDuelServer` builder and server loop.
//!
//! This is the entry point for running a Digit Duel server. It ties
//! together all the layers: transport → protocol → session → room.

use std::sync::Arc;
use std::time::Duration;

use digitduel_protocol::{Codec, JsonCodec};
use digitduel_room::{RoomConfig, SessionRegistry};
use digitduel_session::{Authenticator, SessionConfig, SessionManager};
use digitduel_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};

use crate::DigitDuelError;
use crate::handler::handle_connection;

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Per-connection timing.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The first frame must arrive within this window.
    pub handshake_timeout: Duration,

    /// A connected client that sends nothing for this long is treated as
    /// lost. Clients keep the connection alive with heartbeats.
    pub recv_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            recv_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) registry: SessionRegistry,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Digit Duel server.
///
/// # Example
///
/// ```rust,ignore
/// use digitduel::prelude::*;
///
/// let server = DigitDuelServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .room_config(RoomConfig {
///         reconnect_grace: Duration::from_secs(45),
///         ..RoomConfig::default()
///     })
///     .build(TrustedTokenAuthenticator)
///     .await?;
/// server.run().await
/// ```
pub struct DigitDuelServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    session_config: SessionConfig,
    server_config: ServerConfig,
}

impl DigitDuelServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
            session_config: SessionConfig::default(),
            server_config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn server_config(mut self, config: ServerConfig) -> Self {
        self.server_config = config;
        self
    }

    /// Binds the listener and assembles the server with the given authenticator.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<DigitDuelServer<A, JsonCodec>, DigitDuelError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.session_config)),
            registry: SessionRegistry::new(self.room_config),
            auth,
            codec: JsonCodec,
            config: self.server_config,
        });

        Ok(DigitDuelServer { transport, state })
    }
}

impl Default for DigitDuelServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Digit Duel server bound to its listening address.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DigitDuelServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> DigitDuelServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The room registry, for inspection and graceful shutdown.
    pub fn registry(&self) -> &SessionRegistry {
        &self.state.registry
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), DigitDuelError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Digit Duel server running");
        spawn_session_sweeper(Arc::clone(&self.state));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
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

/// Periodically expires sessions that stayed away past the grace window.
fn spawn_session_sweeper<A: Authenticator, C: Codec>(state: Arc<ServerState<A, C>>) {
    tokio::spawn(async move {
        let period = state.sessions.lock().await.config().sweep_interval;
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let mut sessions = state.sessions.lock().await;
            let expired = sessions.expire_stale();
            if !expired.is_empty() {
                let removed = sessions.cleanup_expired();
                tracing::debug!(removed, remaining = sessions.len(), "session sweep");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert!(config.recv_timeout > config.handshake_timeout);
    }

    #[test]
    fn test_builder_overrides_bind_address() {
        let builder = DigitDuelServerBuilder::new().bind("0.0.0.0:9000");
        assert_eq!(builder.bind_addr, "0.0.0.0:9000");
    }
}
