//! Error types for the session layer.

use cardroom_protocol::SessionId;

/// Errors raised while admitting, tracking, or resuming participants.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the credentials.
    /// The join is refused and no participant is created.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A participant with this session id already exists. Fatal to the
    /// join attempt; the existing record is untouched.
    #[error("participant {0} already exists")]
    DuplicateParticipant(SessionId),

    /// No participant record exists for this session id.
    #[error("participant {0} not found")]
    NotFound(SessionId),

    /// The reconnection token doesn't match the session it claims.
    #[error("invalid reconnection token")]
    InvalidToken,

    /// The participant can't reconnect because it is still connected.
    #[error("participant {0} is already connected")]
    AlreadyConnected(SessionId),
}
