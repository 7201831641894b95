//! Error types for the room layer.

use cardroom_protocol::RoomId;
use cardroom_session::SessionError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Every seat is taken (records in the grace window hold theirs).
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// A participant-level failure: duplicate id, bad reconnect token, etc.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The room's command channel is closed (the room stopped).
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    /// The HTTP-style code reported to the client in
    /// `ServerMessage::Error`.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::RoomFull(_) => 409,
            Self::Unavailable(_) => 503,
            Self::Session(err) => match err {
                SessionError::AuthFailed(_) | SessionError::InvalidToken => 401,
                SessionError::NotFound(_) => 404,
                SessionError::DuplicateParticipant(_) | SessionError::AlreadyConnected(_) => 409,
            },
        }
    }
}
