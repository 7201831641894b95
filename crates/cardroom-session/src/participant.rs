//! Participant records and the per-participant lifecycle state machine.
//!
//! A [`Participant`] is the server's record of one session inside a room.
//! Most of its fields belong to game rules that live outside this crate
//! (cards, scores, flags): we store and serialize them, never interpret
//! them. The fields this crate *does* care about are the lifecycle state,
//! the turn position and the turn-order links.

use std::fmt;
use std::time::Instant;

use cardroom_protocol::SessionId;
use serde::{Serialize, Serializer};

use crate::UserIdentity;

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Where a participant is in its connection lifecycle.
///
/// ```text
///   Connecting ──→ Connected ──(drop)──→ GracePeriod ──(timeout)──→ Removed
///                     │   ↑                   │
///                     │   └────(reconnect)────┘
///                     └──────────(leave)──────────────────────────→ Removed
/// ```
///
/// - **Connecting**: the record exists but the join isn't finished; the
///   participant receives nothing and doesn't count as connected.
/// - **Connected**: in the registry, receiving state patches.
/// - **GracePeriod**: the socket dropped without a consented leave. The
///   record is kept; `since` marks when the grace window opened.
/// - **Removed**: terminal. The record has been deleted from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Connecting,
    Connected,
    GracePeriod { since: Instant },
    Removed,
}

impl LifecycleState {
    /// Returns `true` if moving from `self` to `target` is a legal edge.
    pub fn can_transition_to(&self, target: &Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, target),
            (Connecting, Connected)
                | (Connected, GracePeriod { .. })
                | (Connected, Removed)
                | (GracePeriod { .. }, Connected)
                | (GracePeriod { .. }, Removed)
        )
    }

    /// `true` only in [`LifecycleState::Connected`].
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::GracePeriod { .. } => write!(f, "GracePeriod"),
            Self::Removed => write!(f, "Removed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// One participant's record in the room state.
///
/// Serialized with camelCase field names because that's what the client
/// SDK reads from state patches. `connected` on the wire is derived from
/// the lifecycle state, so the two can never disagree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "connected", serialize_with = "serialize_connected")]
    state: LifecycleState,

    /// 0-based position in turn order, declared by the participant.
    pub sequence_number: u32,

    /// Opaque external game-session reference.
    pub external_ref: String,

    pub hand_cards: Vec<u8>,
    pub discard_pile: Vec<u8>,
    pub shifted_cards: Vec<u8>,
    pub score_major: i8,
    pub score_minor: i8,
    pub has_drawn: bool,

    /// Successor in the turn-order ring. Serialized as `""` until assigned.
    #[serde(serialize_with = "serialize_link")]
    pub next_participant_id: Option<SessionId>,

    /// Predecessor in the turn-order ring. Serialized as `""` until assigned.
    #[serde(serialize_with = "serialize_link")]
    pub prev_participant_id: Option<SessionId>,

    pub set_a: Vec<u8>,
    pub set_b: Vec<u8>,
    pub set_c: Vec<u8>,
    pub is_special_hand: bool,

    #[serde(skip)]
    reconnect_token: String,

    #[serde(skip)]
    identity: Option<UserIdentity>,
}

impl Participant {
    /// A fresh participant in [`LifecycleState::Connecting`] with every
    /// game field zeroed.
    pub(crate) fn new(reconnect_token: String) -> Self {
        Self {
            state: LifecycleState::Connecting,
            sequence_number: 0,
            external_ref: String::new(),
            hand_cards: Vec::new(),
            discard_pile: Vec::new(),
            shifted_cards: Vec::new(),
            score_major: 0,
            score_minor: 0,
            has_drawn: false,
            next_participant_id: None,
            prev_participant_id: None,
            set_a: Vec::new(),
            set_b: Vec::new(),
            set_c: Vec::new(),
            is_special_hand: false,
            reconnect_token,
            identity: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Shorthand for `state().is_connected()`.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Moves to `target` if the edge is legal. Returns the previous state,
    /// or `None` (leaving the record untouched) if the edge is illegal.
    pub fn transition(&mut self, target: LifecycleState) -> Option<LifecycleState> {
        if !self.state.can_transition_to(&target) {
            return None;
        }
        Some(std::mem::replace(&mut self.state, target))
    }

    /// The secret a replacement connection must present to resume this
    /// session.
    pub fn reconnect_token(&self) -> &str {
        &self.reconnect_token
    }

    /// Checks a presented reconnection token in constant time.
    pub fn token_matches(&self, token: &str) -> bool {
        constant_time_eq(self.reconnect_token.as_bytes(), token.as_bytes())
    }

    /// The identity resolved by the authenticator at join time.
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: UserIdentity) {
        self.identity = Some(identity);
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn serialize_connected<S: Serializer>(
    state: &LifecycleState,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(state.is_connected())
}

fn serialize_link<S: Serializer>(
    link: &Option<SessionId>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(link.as_ref().map_or("", SessionId::as_str))
}
