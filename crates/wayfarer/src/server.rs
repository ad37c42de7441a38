//! Server builder and accept loop.
//!
//! The builder collects configuration and the three collaborators (the
//! authenticator, the position cache, the durable position store) and
//! wires them into one shared [`ServerState`]. There are no globals:
//! every task gets the state through an `Arc`.
//!
//! ```text
//!  accept ──→ spawn handle_connection ──→ reader loop + writer task
//!     │
//!     └─ idle sweep (one background task)
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use wayfarer_map::{PositionCache, PositionStore, ProximityBroadcaster};
use wayfarer_protocol::{Codec, WireCodec};
use wayfarer_session::{Authenticator, SessionStore};
use wayfarer_transport::{TcpTransport, TransportError};

use crate::dispatch::Dispatcher;
use crate::handler::handle_connection;
use crate::lifecycle::{CloseReason, close_connection, spawn_idle_sweep};
use crate::{ServerConfig, WayfarerError};

/// State shared by every connection task.
pub(crate) struct ServerState<A, C, S> {
    pub(crate) config: ServerConfig,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) map: ProximityBroadcaster<C>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) auth: A,
    pub(crate) store: S,
    pub(crate) codec: Arc<dyn Codec>,
}

/// Builder for [`WayfarerServer`].
///
/// ```rust,no_run
/// use wayfarer::prelude::*;
///
/// # async fn run() -> Result<(), WayfarerError> {
/// let server = WayfarerServerBuilder::new()
///     .bind("0.0.0.0:7777")
///     .build(MemoryAccounts::new(), MemoryCache::new(), MemoryPositionStore::new())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct WayfarerServerBuilder {
    config: ServerConfig,
    codec: Arc<dyn Codec>,
}

impl WayfarerServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            codec: Arc::new(WireCodec),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the listen address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Swaps the envelope codec. Default: [`WireCodec`].
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Validates the config, binds the listener, and wires the state.
    ///
    /// # Errors
    /// [`WayfarerError::Config`] for an invalid config, or
    /// [`WayfarerError::Transport`] if the address cannot be bound.
    pub async fn build<A, C, S>(
        self,
        auth: A,
        cache: C,
        store: S,
    ) -> Result<WayfarerServer<A, C, S>, WayfarerError>
    where
        A: Authenticator,
        C: PositionCache,
        S: PositionStore,
    {
        self.config.validate()?;
        let transport = TcpTransport::bind(&self.config.bind).await?;

        let sessions = Arc::new(SessionStore::new(self.config.session_config()));
        let map = ProximityBroadcaster::new(Arc::clone(&sessions), cache, self.config.map_config());

        let state = Arc::new(ServerState {
            config: self.config,
            sessions,
            map,
            dispatcher: Dispatcher::new(),
            auth,
            store,
            codec: self.codec,
        });

        Ok(WayfarerServer { transport, state })
    }
}

impl Default for WayfarerServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound, ready-to-run server.
pub struct WayfarerServer<A, C, S> {
    transport: TcpTransport,
    state: Arc<ServerState<A, C, S>>,
}

impl<A, C, S> WayfarerServer<A, C, S>
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The live session registry.
    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.state.sessions)
    }

    /// Accepts connections forever.
    pub async fn run(self) -> Result<(), WayfarerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `signal` completes, then closes every
    /// live session through the normal teardown path and returns.
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> Result<(), WayfarerError> {
        let local = self
            .transport
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr = %local, "wayfarer server running");

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweep = spawn_idle_sweep(Arc::clone(&self.state), stop_rx);

        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = self.transport.accept() => match accepted {
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
                },
            }
        }

        tracing::info!("shutting down");
        let _ = stop_tx.send(true);
        if let Err(e) = sweep.await {
            tracing::warn!(error = %e, "idle sweep task failed");
        }

        for conn in self.state.sessions.connections().await {
            close_connection(&self.state, conn, CloseReason::ServerShutdown).await;
        }
        tracing::info!("server stopped");
        Ok(())
    }
}
