//! Participant sessions for Cardroom.
//!
//! 1. **Authentication** — resolving who is joining ([`Authenticator`])
//! 2. **Registry** — the per-room owner of all participant records and the
//!    shared draw pile ([`SessionRegistry`], [`RoomState`])
//! 3. **Lifecycle** — the per-participant connection state machine
//!    ([`LifecycleState`])
//!
//! ```text
//! Room Layer (above)     ← drives the lifecycle, owns one registry per room
//!     ↕
//! Session Layer (this)   ← participant records and their states
//!     ↕
//! Protocol Layer (below) ← SessionId and wire types
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod participant;
mod registry;

pub use auth::{Authenticator, TokenTable, UserIdentity};
pub use error::SessionError;
pub use participant::{LifecycleState, Participant};
pub use registry::{generate_session_id, ParticipantSlot, RoomState, SessionRegistry};
