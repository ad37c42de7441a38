//! Per-connection handler: one reader loop and one writer task.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Register a Connected session with a fresh outbox.
//!   2. Spawn the writer: drain the outbox, encode, frame, write.
//!   3. Loop: read a frame → decode → dispatch → deliver. Bytes that
//!      have not completed a frame yet still count as activity: once per
//!      sweep interval the session is touched if anything arrived.
//!   4. On EOF, read error, or a shutdown signal from the store: tear
//!      down through the lifecycle manager.
//!
//! Frames from one connection are handled strictly in arrival order:
//! the next frame is not read until the previous one's outbound
//! messages are queued.

use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use wayfarer_map::{PositionCache, PositionStore};
use wayfarer_protocol::Envelope;
use wayfarer_session::Authenticator;
use wayfarer_transport::{ConnectionId, FrameWriter, TcpConnection};

use crate::WayfarerError;
use crate::dispatch::dispatch;
use crate::lifecycle::{CloseReason, close_connection};
use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C, S>(
    conn: TcpConnection,
    state: Arc<ServerState<A, C, S>>,
) -> Result<(), WayfarerError>
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    let (mut reader, writer) = conn.into_framed(state.config.max_frame_size);

    let (outbox, inbox) = mpsc::channel(state.config.outbox_capacity);
    let mut shutdown = state.sessions.register(conn_id, outbox).await?;
    tracing::info!(%conn_id, %peer, "connection opened");

    tokio::spawn(run_writer(conn_id, writer, inbox, Arc::clone(&state)));

    let mut activity = tokio::time::interval(state.config.sweep_interval());
    activity.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seen = 0;

    let reason = loop {
        tokio::select! {
            // Removed elsewhere: idle sweep, writer failure, or server
            // shutdown.
            _ = shutdown.changed() => break CloseReason::Evicted,
            _ = activity.tick() => {
                if reader.bytes_read() != seen {
                    seen = reader.bytes_read();
                    state.sessions.touch(conn_id).await;
                }
            }
            frame = reader.next_frame() => match frame {
                Ok(Some(bytes)) => on_frame(&state, conn_id, bytes).await,
                Ok(None) => break CloseReason::PeerClosed,
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "read failed");
                    break CloseReason::ReadFailed;
                }
            },
        }
    };

    close_connection(&state, conn_id, reason).await;
    Ok(())
}

async fn on_frame<A, C, S>(state: &ServerState<A, C, S>, conn_id: ConnectionId, bytes: Vec<u8>)
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    state.sessions.touch(conn_id).await;

    // A zero-length frame is well-formed but carries no message.
    if bytes.is_empty() {
        return;
    }

    let envelope = match state.codec.decode(&bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, len = bytes.len(), "dropping undecodable frame");
            return;
        }
    };

    let outbound = dispatch(state, conn_id, envelope).await;
    state.sessions.deliver(outbound).await;
}

/// Drains a connection's outbox onto its socket.
///
/// Ends when the session is removed from the store (dropping the last
/// sender) or when a write fails, which closes the connection.
async fn run_writer<A, C, S>(
    conn_id: ConnectionId,
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut inbox: mpsc::Receiver<Envelope>,
    state: Arc<ServerState<A, C, S>>,
) where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    while let Some(envelope) = inbox.recv().await {
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, kind = ?envelope.kind(), error = %e, "failed to encode");
                continue;
            }
        };
        if let Err(e) = writer.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "write failed");
            close_connection(&state, conn_id, CloseReason::WriteFailed).await;
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::trace!(%conn_id, error = %e, "shutdown after close");
    }
}
