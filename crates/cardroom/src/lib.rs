//! # Cardroom
//!
//! Session core for multiplayer card rooms.
//!
//! Clients connect over WebSocket, authenticate, and are seated in the
//! first room with a free seat. Each room runs as its own actor: it keeps
//! the participant registry, links participants into a turn order once the
//! room is full, holds seats open for a grace period after a dropped
//! connection, and pushes state patches at a fixed rate.
//!
//! Games plug in through [`RoomHooks`](cardroom_room::RoomHooks).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardroom::prelude::*;
//!
//! # async fn run() -> Result<(), CardroomError> {
//! let auth = TokenTable::new().with_token("dev-token", "alice");
//! let server = CardroomServer::builder()
//!     .bind("0.0.0.0:2567")
//!     .room_config(RoomConfig {
//!         max_clients: 4,
//!         ..RoomConfig::default()
//!     })
//!     .build(auth)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;
pub mod websocket;

pub use error::{CardroomError, TransportError};
pub use server::{CardroomServer, CardroomServerBuilder, DEFAULT_BIND_ADDR};

pub use cardroom_protocol as protocol;
pub use cardroom_room as room;
pub use cardroom_session as session;

/// The types most servers need.
pub mod prelude {
    pub use crate::{CardroomError, CardroomServer, CardroomServerBuilder};
    pub use cardroom_protocol::{
        ClientMessage, Envelope, MessageKind, RoomId, ServerMessage, SessionId,
    };
    pub use cardroom_room::{NoopHooks, PrevLinkRule, RoomConfig, RoomHooks};
    pub use cardroom_session::{
        Authenticator, RoomState, SessionError, TokenTable, UserIdentity,
    };
}
