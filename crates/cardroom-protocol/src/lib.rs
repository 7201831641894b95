//! Wire protocol for Cardroom.
//!
//! - **Types** ([`Envelope`], [`ClientMessage`], [`ServerMessage`],
//!   [`MessageKind`], [`InitData`], [`Ack`]) — what travels on the wire.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how envelopes become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! WebSocket (bytes) → Protocol (Envelope) → Room (participant messages)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    kinds, Ack, ClientMessage, ConnectionId, Envelope, InitData, MessageKind, Recipient,
    RoomId, ServerMessage, SessionId,
};
