//! Room manager: creates, tracks, and routes connections to rooms.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use cardroom_protocol::{ConnectionId, RoomId, SessionId};
use cardroom_session::UserIdentity;

use crate::room::spawn_room;
use crate::{JoinTicket, NoopHooks, ParticipantSender, RoomConfig, RoomError, RoomHandle, RoomHooks, RoomInfo};

/// Counter for generating unique room IDs.
static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Manages all active rooms.
///
/// This is the entry point for room operations from the server's
/// connection handlers. Every room it creates gets a fresh `H::default()`
/// as its hooks.
pub struct RoomManager<H: RoomHooks + Default = NoopHooks> {
    /// Active rooms, keyed by room ID. Rooms that stopped on their own
    /// linger here until the next [`prune`](Self::prune).
    rooms: HashMap<RoomId, RoomHandle>,
    config: RoomConfig,
    _hooks: PhantomData<fn() -> H>,
}

impl<H: RoomHooks + Default> RoomManager<H> {
    /// Creates a new, empty room manager.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            config,
            _hooks: PhantomData,
        }
    }

    /// The configuration every new room starts from.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Creates a new room and returns its ID.
    pub fn create_room(&mut self) -> RoomId {
        self.spawn().room_id()
    }

    /// Returns a handle to a running room.
    pub fn handle(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.rooms
            .get(&room_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Finds a room with a free seat or creates a new one, then joins the
    /// participant.
    ///
    /// Rooms are tried oldest first. A room that fills up (or stops) between
    /// the info query and the join is skipped.
    pub async fn join_or_create(
        &mut self,
        connection: ConnectionId,
        identity: UserIdentity,
        sender: ParticipantSender,
    ) -> Result<JoinTicket, RoomError> {
        self.prune();

        let mut candidates: Vec<RoomHandle> = self.rooms.values().cloned().collect();
        candidates.sort_by_key(|handle| handle.room_id().0);

        for handle in candidates {
            let Ok(info) = handle.get_info().await else {
                continue;
            };
            if !info.has_free_seat() {
                continue;
            }
            match handle.join(connection, identity.clone(), sender.clone()).await {
                Ok(ticket) => return Ok(ticket),
                Err(RoomError::RoomFull(_) | RoomError::Unavailable(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        // No room with a free seat: create one.
        let handle = self.spawn();
        handle.join(connection, identity, sender).await
    }

    /// Resumes a session on a new connection, in the room that holds it.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if the room is gone; otherwise whatever the
    /// room reports (unknown session, bad token, still connected).
    pub async fn reconnect(
        &self,
        room_id: RoomId,
        connection: ConnectionId,
        session_id: SessionId,
        reconnect_token: String,
        sender: ParticipantSender,
    ) -> Result<JoinTicket, RoomError> {
        let handle = self.handle(room_id).ok_or(RoomError::NotFound(room_id))?;
        handle
            .reconnect(connection, session_id, reconnect_token, sender)
            .await
            .map_err(|e| match e {
                RoomError::Unavailable(id) => RoomError::NotFound(id),
                e => e,
            })
    }

    /// Returns info about a specific room.
    pub async fn get_room_info(&self, room_id: RoomId) -> Result<RoomInfo, RoomError> {
        let handle = self.handle(room_id).ok_or(RoomError::NotFound(room_id))?;
        handle.get_info().await
    }

    /// Shuts down a room and forgets it.
    pub async fn destroy_room(&mut self, room_id: RoomId) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .remove(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        let _ = handle.shutdown().await;

        tracing::info!(%room_id, "room destroyed");
        Ok(())
    }

    /// Lists every running room, ordered by ID.
    ///
    /// Rooms that fail to respond (e.g., shutting down) are skipped.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut infos = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(info) = handle.get_info().await {
                infos.push(info);
            }
        }
        infos.sort_by_key(|info| info.room_id.0);
        infos
    }

    /// Forgets rooms whose actor has stopped. Returns how many were
    /// removed.
    pub fn prune(&mut self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|room_id, handle| {
            let closed = handle.is_closed();
            if closed {
                tracing::debug!(%room_id, "pruning stopped room");
            }
            !closed
        });
        before - self.rooms.len()
    }

    /// Returns the number of tracked rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Lists all tracked room IDs.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    fn spawn(&mut self) -> RoomHandle {
        let room_id = RoomId(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed));
        let handle = spawn_room(room_id, self.config.clone(), H::default(), DEFAULT_CHANNEL_SIZE);
        self.rooms.insert(room_id, handle.clone());
        tracing::info!(%room_id, "room created");
        handle
    }
}

impl<H: RoomHooks + Default> Default for RoomManager<H> {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}
