//! Rooms for Cardroom.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! participant registry, grace timers and sync clock.
//!
//! # Key types
//!
//! - [`RoomManager`]: creates rooms, routes joins and reconnections
//! - [`RoomHandle`]: sends commands to a running room actor
//! - [`RoomHooks`]: the game-side extension point
//! - [`RoomConfig`]: capacity, patch rate, grace window
//!
//! Inside a room, the [`turn_order`] module links participants into a ring
//! once the room is full.

mod config;
mod error;
mod hooks;
mod lifecycle;
mod manager;
mod room;
mod router;
mod sync;
pub mod turn_order;

pub use config::{PrevLinkRule, RoomConfig};
pub use error::RoomError;
pub use hooks::{NoopHooks, RoomHooks};
pub use manager::RoomManager;
pub use room::{JoinTicket, ParticipantSender, RoomHandle, RoomInfo};
