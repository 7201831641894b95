//! Error types for the Cardroom server.

use cardroom_protocol::ProtocolError;
use cardroom_room::RoomError;
use cardroom_session::SessionError;

/// Errors that can occur in the WebSocket transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer didn't finish the WebSocket upgrade in time.
    #[error("WebSocket upgrade from {0} timed out")]
    UpgradeTimedOut(std::net::SocketAddr),

    /// Binding the listener or reading its address failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting a TCP connection or the WebSocket upgrade failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] tokio_tungstenite::tungstenite::Error),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] tokio_tungstenite::tungstenite::Error),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] tokio_tungstenite::tungstenite::Error),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls, so
/// the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CardroomError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, reconnect).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, unavailable).
    #[error(transparent)]
    Room(#[from] RoomError),
}
