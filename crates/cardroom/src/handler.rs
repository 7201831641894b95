//! Per-connection handler: admission, message pump, and leave.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   0. Complete the WebSocket upgrade (bounded, like admission)
//!   1. Receive `Join` (authenticate, then join or create a room) or
//!      `Reconnect` (resume a session in its grace window)
//!   2. Loop: forward `Message` envelopes to the room
//!   3. On `Leave` or socket close, tell the room (consented or not)
//!
//! Everything the client receives goes through one unbounded channel and a
//! writer task, so room output and handler errors are never reordered.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cardroom_protocol::{ClientMessage, Codec, ConnectionId, Envelope, ProtocolError, ServerMessage};
use cardroom_room::{JoinTicket, ParticipantSender, RoomError, RoomHandle, RoomHooks};
use cardroom_session::Authenticator;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::server::ServerState;
use crate::websocket::{FrameReceiver, FrameSender, PendingConnection};
use crate::CardroomError;

/// How long a fresh connection may take to upgrade, and then to send its
/// first message.
const ADMISSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, H>(
    pending: PendingConnection,
    state: Arc<ServerState<A, H>>,
) -> Result<(), CardroomError>
where
    A: Authenticator,
    H: RoomHooks + Default,
{
    let conn_id = pending.id();
    tracing::debug!(%conn_id, peer = %pending.peer_addr(), "handling new connection");

    let conn = pending.upgrade(ADMISSION_TIMEOUT).await?;
    let (sink, mut frames) = conn.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = spawn_writer(sink, rx, state.codec);

    let result = match admit(&mut frames, &state, conn_id, &tx).await {
        Ok((room, ticket)) => pump(&mut frames, &state, conn_id, &tx, room, ticket).await,
        Err(e) => Err(e),
    };

    // The writer finishes once the room has dropped its copy of the sender.
    drop(tx);
    let _ = writer.await;
    result
}

/// Reads the first message and gets the connection into a room.
async fn admit<A, H>(
    frames: &mut FrameReceiver,
    state: &ServerState<A, H>,
    conn_id: ConnectionId,
    tx: &ParticipantSender,
) -> Result<(RoomHandle, JoinTicket), CardroomError>
where
    A: Authenticator,
    H: RoomHooks + Default,
{
    let data = match tokio::time::timeout(ADMISSION_TIMEOUT, frames.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before join".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            let _ = tx.send(ServerMessage::error(408, "join timed out"));
            return Err(ProtocolError::InvalidMessage("join timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
        Ok(envelope) => envelope,
        Err(e) => {
            let _ = tx.send(ServerMessage::error(400, format!("malformed envelope: {e}")));
            return Err(e.into());
        }
    };

    let joined = match envelope.body {
        ClientMessage::Join { token, options } => {
            let identity = match state
                .auth
                .authenticate(token.as_deref().unwrap_or(""), &options)
                .await
            {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::info!(%conn_id, error = %e, "join refused");
                    let _ = tx.send(ServerMessage::error(401, e.to_string()));
                    return Err(e.into());
                }
            };
            tracing::debug!(%conn_id, user_id = %identity.user_id, "authenticated");

            let mut rooms = state.rooms.lock().await;
            rooms
                .join_or_create(conn_id, identity, tx.clone())
                .await
                .and_then(|ticket| with_handle(rooms.handle(ticket.room_id), ticket))
        }
        ClientMessage::Reconnect {
            room_id,
            session_id,
            reconnect_token,
        } => {
            let rooms = state.rooms.lock().await;
            rooms
                .reconnect(room_id, conn_id, session_id, reconnect_token, tx.clone())
                .await
                .and_then(|ticket| with_handle(rooms.handle(ticket.room_id), ticket))
        }
        ClientMessage::Leave | ClientMessage::Message { .. } => {
            let _ = tx.send(ServerMessage::error(400, "expected Join or Reconnect"));
            return Err(ProtocolError::InvalidMessage("first message must be Join or Reconnect".into()).into());
        }
    };

    match joined {
        Ok((room, ticket)) => {
            tracing::info!(
                %conn_id,
                room_id = %ticket.room_id,
                session_id = %ticket.session_id,
                "connection admitted"
            );
            Ok((room, ticket))
        }
        Err(e) => {
            tracing::info!(%conn_id, error = %e, "admission failed");
            let _ = tx.send(ServerMessage::error(e.code(), e.to_string()));
            Err(e.into())
        }
    }
}

fn with_handle(
    handle: Option<RoomHandle>,
    ticket: JoinTicket,
) -> Result<(RoomHandle, JoinTicket), RoomError> {
    match handle {
        Some(handle) => Ok((handle, ticket)),
        None => Err(RoomError::Unavailable(ticket.room_id)),
    }
}

/// Forwards messages to the room until the client leaves or the socket
/// closes, then reports the leave.
async fn pump<A, H>(
    frames: &mut FrameReceiver,
    state: &ServerState<A, H>,
    conn_id: ConnectionId,
    tx: &ParticipantSender,
    room: RoomHandle,
    ticket: JoinTicket,
) -> Result<(), CardroomError>
where
    A: Authenticator,
    H: RoomHooks + Default,
{
    let session_id = ticket.session_id;
    let mut consented = false;

    loop {
        let data = match frames.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, %session_id, "connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, %session_id, error = %e, "recv error");
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%conn_id, %session_id, error = %e, "failed to decode envelope");
                let _ = tx.send(ServerMessage::error(400, format!("malformed envelope: {e}")));
                continue;
            }
        };

        match envelope.body {
            ClientMessage::Message { kind, payload } => {
                if room
                    .send_message(conn_id, session_id.clone(), kind, payload)
                    .await
                    .is_err()
                {
                    tracing::debug!(%conn_id, %session_id, "room stopped, closing connection");
                    return Ok(());
                }
            }
            ClientMessage::Leave => {
                consented = true;
                break;
            }
            ClientMessage::Join { .. } | ClientMessage::Reconnect { .. } => {
                tracing::warn!(%conn_id, %session_id, "join on an admitted connection");
                let _ = tx.send(ServerMessage::error(400, "already in a room"));
            }
        }
    }

    if let Err(e) = room.leave(conn_id, session_id, consented).await {
        tracing::debug!(%conn_id, error = %e, "leave not delivered");
    }
    Ok(())
}

/// Owns the sending half: wraps every outbound message in an envelope and
/// writes it. Ends when every sender is gone or the socket fails, then
/// sends a close frame.
fn spawn_writer<C: Codec + Copy>(
    mut sink: FrameSender,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
    codec: C,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut seq: u64 = 0;

        while let Some(body) = rx.recv().await {
            seq += 1;
            let envelope = Envelope {
                seq,
                timestamp: start.elapsed().as_millis() as u64,
                body,
            };
            let bytes = match codec.encode(&envelope) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = sink.send(bytes).await {
                tracing::debug!(error = %e, "send failed, stopping writer");
                break;
            }
        }

        let _ = sink.close().await;
    })
}
