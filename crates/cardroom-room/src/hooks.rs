//! The `RoomHooks` trait: where game rules plug into a room.
//!
//! The framework owns membership, turn order and syncing. Everything else
//! about the game (dealing, scoring, who drew what) lives in a hooks
//! implementation that edits the [`RoomState`] on every sync tick.

use std::time::Duration;

use cardroom_session::RoomState;

/// Game-side callbacks of a room.
///
/// One value per room, owned by the room's actor task, so `&mut self` is
/// never contended. Both methods default to no-ops, which is what
/// [`NoopHooks`] relies on.
///
/// Hooks get `&mut RoomState`: they may change any participant record or
/// the draw pile, but membership only changes through joins and leaves.
pub trait RoomHooks: Send + 'static {
    /// Called on every sync tick, before the state is compared with the
    /// last broadcast. `dt` is the real time since the previous tick.
    fn update(&mut self, _state: &mut RoomState, _dt: Duration) {}

    /// Called once when the room stops, with the final state.
    fn on_dispose(&mut self, _state: &RoomState) {}
}

/// Hooks that do nothing; the room only relays messages and syncs state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl RoomHooks for NoopHooks {}
