//! `CoveyServer` builder and accept loop.
//!
//! This is the entry point for running a Covey server. It ties together
//! all the layers: transport → protocol → control plane / live towns.

use std::sync::Arc;
use std::time::Duration;

use covey_protocol::{Codec, JsonCodec};
use covey_session::VideoTokenProvider;
use covey_town::TownConfig;
use covey_transport::{Transport, WebSocketTransport};

use crate::CoveyError;
use crate::handler::handle_connection;
use crate::service::TownService;

/// How long a new connection may stay unauthenticated between frames.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<P, C> {
    pub(crate) service: TownService<P>,
    pub(crate) codec: C,
    pub(crate) handshake_timeout: Duration,
}

/// Builder for configuring and starting a Covey server.
///
/// # Example
///
/// ```rust,no_run
/// use covey::prelude::*;
///
/// # async fn run() -> Result<(), CoveyError> {
/// let server = CoveyServer::builder()
///     .bind("0.0.0.0:8081")
///     .build(LocalVideoProvider)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct CoveyServerBuilder {
    bind_addr: String,
    town_config: TownConfig,
    handshake_timeout: Duration,
}

impl CoveyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8081".to_string(),
            town_config: TownConfig::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the configuration shared by every town.
    pub fn town_config(mut self, config: TownConfig) -> Self {
        self.town_config = config;
        self
    }

    /// Sets how long a connection may wait before authenticating.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server around `video`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`. Fails before binding if
    /// the town config cannot produce town ids.
    pub async fn build<P: VideoTokenProvider>(
        self,
        video: P,
    ) -> Result<CoveyServer<P, JsonCodec>, CoveyError> {
        self.town_config.validate()?;
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            service: TownService::new(self.town_config, video),
            codec: JsonCodec,
            handshake_timeout: self.handshake_timeout,
        });

        Ok(CoveyServer { transport, state })
    }
}

impl Default for CoveyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Covey server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CoveyServer<P, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<P, C>>,
}

impl CoveyServer<(), JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> CoveyServerBuilder {
        CoveyServerBuilder::new()
    }
}

impl<P, C> CoveyServer<P, C>
where
    P: VideoTokenProvider,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the control plane, for in-process administration.
    pub fn service(&self) -> TownService<P> {
        self.state.service.clone()
    }

    /// Runs the accept loop, spawning a handler task per connection. Runs
    /// until the process is terminated.
    pub async fn run(mut self) -> Result<(), CoveyError> {
        tracing::info!("Covey server running");

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
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
