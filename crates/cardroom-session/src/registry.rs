//! The session registry: exclusive owner of a room's shared state.
//!
//! Every read and write of a participant record or of the draw pile goes
//! through [`SessionRegistry`]. There is exactly one registry per room and
//! it lives inside that room's actor task.
//!
//! # Concurrency note
//!
//! The registry uses a plain `HashMap` and takes `&mut self` for writes.
//! It is never shared between tasks: the room actor owns it and processes
//! one command at a time, so no locking is needed.

use std::collections::HashMap;

use cardroom_protocol::SessionId;
use rand::Rng;
use serde::Serialize;

use crate::{LifecycleState, Participant, SessionError};

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The state synchronized to every participant: all participant records
/// plus the undealt draw pile.
///
/// Game hooks receive `&mut RoomState` and may edit records and the pile,
/// but cannot add or remove participants. Membership changes only through
/// [`SessionRegistry`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    participants: HashMap<SessionId, Participant>,
    draw_pile: Vec<u8>,
}

impl RoomState {
    /// Looks up a participant record.
    pub fn participant(&self, id: &SessionId) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// Looks up a participant record for editing.
    pub fn participant_mut(&mut self, id: &SessionId) -> Option<&mut Participant> {
        self.participants.get_mut(id)
    }

    /// Iterates over every record, in no particular order.
    pub fn participants(&self) -> impl Iterator<Item = (&SessionId, &Participant)> {
        self.participants.iter()
    }

    /// Iterates mutably over every record, in no particular order.
    pub fn participants_mut(
        &mut self,
    ) -> impl Iterator<Item = (&SessionId, &mut Participant)> {
        self.participants.iter_mut()
    }

    pub fn draw_pile(&self) -> &[u8] {
        &self.draw_pile
    }

    pub fn draw_pile_mut(&mut self) -> &mut Vec<u8> {
        &mut self.draw_pile
    }
}

/// One row of a registry snapshot: who, and at which turn position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSlot {
    pub session_id: SessionId,
    pub sequence_number: u32,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Owns the [`RoomState`] of one room.
///
/// ## Lifecycle of an entry
///
/// ```text
/// create_connecting() ──→ [Connecting] ──→ [Connected] ──→ [GracePeriod] ──→ [Connected]
/// create() ─────────────────────────────→ [Connected]           │
///                                              │                 │
///                                              ▼                 ▼
///                                          remove()          remove()  (grace window elapsed)
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: RoomState,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks a fresh session id that no current entry uses.
    pub fn next_session_id(&self) -> SessionId {
        loop {
            let id = generate_session_id();
            if !self.state.participants.contains_key(&id) {
                return id;
            }
        }
    }

    /// Inserts a connected participant with default fields and a new
    /// reconnection token.
    ///
    /// # Errors
    /// Returns [`SessionError::DuplicateParticipant`] if `id` is already
    /// present. Nothing is modified in that case.
    pub fn create(&mut self, id: SessionId) -> Result<&mut Participant, SessionError> {
        let participant = self.create_connecting(id)?;
        participant.transition(LifecycleState::Connected);
        Ok(participant)
    }

    /// Like [`create`](Self::create), but leaves the record in
    /// [`LifecycleState::Connecting`] for the caller to finish the join.
    ///
    /// # Errors
    /// Returns [`SessionError::DuplicateParticipant`] if `id` is already
    /// present.
    pub fn create_connecting(&mut self, id: SessionId) -> Result<&mut Participant, SessionError> {
        if self.state.participants.contains_key(&id) {
            return Err(SessionError::DuplicateParticipant(id));
        }

        tracing::debug!(session_id = %id, "participant record created");
        let token = generate_token();
        Ok(self
            .state
            .participants
            .entry(id)
            .or_insert_with(|| Participant::new(token)))
    }

    /// Deletes a participant.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if there is no such entry. Callers
    /// that only want the entry gone can ignore this.
    pub fn remove(&mut self, id: &SessionId) -> Result<Participant, SessionError> {
        let participant = self
            .state
            .participants
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        tracing::debug!(session_id = %id, "participant record removed");
        Ok(participant)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Participant> {
        self.state.participants.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Participant> {
        self.state.participants.get_mut(id)
    }

    /// Visits every participant in session-id order.
    ///
    /// The set of ids is captured before the first call to `f`, so the
    /// visit order doesn't depend on `HashMap` iteration order.
    pub fn for_each(&self, mut f: impl FnMut(&SessionId, &Participant)) {
        for id in self.sorted_ids() {
            if let Some(p) = self.state.participants.get(&id) {
                f(&id, p);
            }
        }
    }

    /// An owned, id-ordered snapshot of every participant's turn position.
    ///
    /// Algorithms that read every pair of participants and then write links
    /// back take this snapshot first, so reading and writing never overlap.
    pub fn snapshot(&self) -> Vec<ParticipantSlot> {
        let mut slots: Vec<ParticipantSlot> = self
            .state
            .participants
            .iter()
            .map(|(id, p)| ParticipantSlot {
                session_id: id.clone(),
                sequence_number: p.sequence_number,
            })
            .collect();
        slots.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        slots
    }

    /// Ids of every participant in the `Connected` state, id-ordered.
    pub fn connected_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .state
            .participants
            .iter()
            .filter(|(_, p)| p.is_connected())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of participants in the `Connected` state.
    pub fn connected_count(&self) -> usize {
        self.state
            .participants
            .values()
            .filter(|p| p.is_connected())
            .count()
    }

    /// Number of records in any state.
    pub fn len(&self) -> usize {
        self.state.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.participants.is_empty()
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RoomState {
        &mut self.state
    }

    fn sorted_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.state.participants.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Length of generated session ids.
const SESSION_ID_LEN: usize = 9;

/// A random 9-character alphanumeric session id.
pub fn generate_session_id() -> SessionId {
    let id: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect();
    SessionId(id)
}

/// A random 32-character hex string (128 bits), used as the reconnection
/// secret.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn sid(id: &str) -> SessionId {
        SessionId::new(id)
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_inserts_connected_participant_with_defaults() {
        let mut reg = SessionRegistry::new();

        let p = reg.create(sid("a")).expect("should succeed");

        assert!(p.is_connected());
        assert_eq!(p.sequence_number, 0);
        assert!(p.hand_cards.is_empty());
        assert!(p.next_participant_id.is_none());
        assert_eq!(p.reconnect_token().len(), 32);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_create_duplicate_returns_error_and_keeps_original() {
        let mut reg = SessionRegistry::new();
        reg.create(sid("a")).unwrap().sequence_number = 5;

        let result = reg.create(sid("a"));

        assert!(
            matches!(result, Err(SessionError::DuplicateParticipant(ref id)) if *id == sid("a"))
        );
        assert_eq!(reg.get(&sid("a")).unwrap().sequence_number, 5);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_create_issues_distinct_tokens() {
        let mut reg = SessionRegistry::new();
        let t1 = reg.create(sid("a")).unwrap().reconnect_token().to_string();
        let t2 = reg.create(sid("b")).unwrap().reconnect_token().to_string();

        assert_ne!(t1, t2);
    }

    #[test]
    fn test_create_connecting_is_not_connected_until_transition() {
        let mut reg = SessionRegistry::new();
        let p = reg.create_connecting(sid("a")).unwrap();
        assert_eq!(p.state(), LifecycleState::Connecting);

        assert!(reg.connected_ids().is_empty());
        assert_eq!(reg.len(), 1);

        reg.get_mut(&sid("a"))
            .unwrap()
            .transition(LifecycleState::Connected);
        assert_eq!(reg.connected_ids(), vec![sid("a")]);
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[test]
    fn test_remove_deletes_entry() {
        let mut reg = SessionRegistry::new();
        reg.create(sid("a")).unwrap();

        reg.remove(&sid("a")).expect("should remove");

        assert!(reg.get(&sid("a")).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_absent_returns_not_found() {
        let mut reg = SessionRegistry::new();
        let result = reg.remove(&sid("ghost"));
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    // =====================================================================
    // for_each() / snapshot()
    // =====================================================================

    #[test]
    fn test_for_each_visits_in_id_order() {
        let mut reg = SessionRegistry::new();
        for id in ["c", "a", "b"] {
            reg.create(sid(id)).unwrap();
        }

        let mut seen = Vec::new();
        reg.for_each(|id, _| seen.push(id.clone()));

        assert_eq!(seen, vec![sid("a"), sid("b"), sid("c")]);
    }

    #[test]
    fn test_nested_for_each_sees_every_pair() {
        let mut reg = SessionRegistry::new();
        for id in ["a", "b", "c"] {
            reg.create(sid(id)).unwrap();
        }

        let mut pairs = 0;
        reg.for_each(|a, _| {
            reg.for_each(|b, _| {
                if a != b {
                    pairs += 1;
                }
            });
        });

        assert_eq!(pairs, 6);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_writes() {
        let mut reg = SessionRegistry::new();
        reg.create(sid("a")).unwrap().sequence_number = 1;
        reg.create(sid("b")).unwrap().sequence_number = 0;

        let snapshot = reg.snapshot();
        reg.get_mut(&sid("a")).unwrap().sequence_number = 9;
        reg.remove(&sid("b")).unwrap();

        assert_eq!(
            snapshot,
            vec![
                ParticipantSlot { session_id: sid("a"), sequence_number: 1 },
                ParticipantSlot { session_id: sid("b"), sequence_number: 0 },
            ]
        );
    }

    // =====================================================================
    // connected_ids() / connected_count()
    // =====================================================================

    #[test]
    fn test_connected_ids_skip_grace_period() {
        let mut reg = SessionRegistry::new();
        reg.create(sid("a")).unwrap();
        reg.create(sid("b")).unwrap();
        reg.get_mut(&sid("a"))
            .unwrap()
            .transition(LifecycleState::GracePeriod { since: Instant::now() });

        assert_eq!(reg.connected_ids(), vec![sid("b")]);
        assert_eq!(reg.connected_count(), 1);
        assert_eq!(reg.len(), 2);
    }

    // =====================================================================
    // RoomState serialization
    // =====================================================================

    #[test]
    fn test_room_state_serializes_participants_and_draw_pile() {
        let mut reg = SessionRegistry::new();
        reg.create(sid("a")).unwrap();
        reg.state_mut().draw_pile_mut().extend([4, 8, 15]);

        let json = serde_json::to_value(reg.state()).unwrap();

        assert_eq!(json["drawPile"], serde_json::json!([4, 8, 15]));
        assert_eq!(json["participants"]["a"]["connected"], true);
    }

    #[test]
    fn test_generate_session_id_shape() {
        let id = generate_session_id();
        assert_eq!(id.as_str().len(), SESSION_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_next_session_id_is_unused() {
        let mut reg = SessionRegistry::new();
        let id = reg.next_session_id();
        reg.create(id.clone()).unwrap();
        assert_ne!(reg.next_session_id(), id);
    }
}
