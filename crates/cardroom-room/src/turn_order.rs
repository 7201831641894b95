//! Capacity negotiation and turn-order assignment.
//!
//! Participants declare their own turn position (`sequenceNumber`) and how
//! many players they expect. Once the room holds exactly that many records,
//! every participant is linked to its successor and predecessor:
//!
//! ```text
//!   seq:   0 ──next──→ 1 ──next──→ 2 ──next──→ 0
//!          0 ←─prev─── 1 ←─prev─── 2 ←─prev─── 0   (PrevLinkRule::Ring)
//! ```
//!
//! Positions are not validated. Gaps or duplicates just leave some links
//! empty.

use cardroom_protocol::SessionId;
use cardroom_session::{ParticipantSlot, SessionRegistry};

use crate::PrevLinkRule;

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

/// The room's negotiated participant count.
///
/// Starts at the configured `max_clients`. The first declaration replaces
/// it. Later declarations that disagree also replace it, but are reported
/// as conflicts so the declaring client can react. Nothing is rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    default: usize,
    expected: usize,
}

impl Capacity {
    pub fn new(default: usize) -> Self {
        Self {
            default,
            expected: default,
        }
    }

    /// The current expected participant count.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Applies a declaration. Returns `true` if it conflicted with the
    /// value already in force.
    pub fn declare(&mut self, declared: usize) -> bool {
        if self.expected == self.default {
            self.expected = declared;
        }
        if self.expected != declared {
            self.expected = declared;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// The links computed for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnLinks {
    pub session_id: SessionId,
    pub next: Option<SessionId>,
    pub prev: Option<SessionId>,
}

/// Computes links over a snapshot. Every ordered pair of distinct
/// participants is compared; when several candidates match, the last one
/// in snapshot order wins.
pub fn compute_links(
    slots: &[ParticipantSlot],
    expected: usize,
    rule: PrevLinkRule,
) -> Vec<TurnLinks> {
    let expected = expected as i64;
    let last = expected - 1;

    slots
        .iter()
        .map(|a| {
            let mut links = TurnLinks {
                session_id: a.session_id.clone(),
                next: None,
                prev: None,
            };
            let a_seq = i64::from(a.sequence_number);

            for b in slots.iter().filter(|b| b.session_id != a.session_id) {
                let b_seq = i64::from(b.sequence_number);
                let is_next = b_seq == a_seq + 1 || (a_seq == last && b_seq == 0);
                let is_prev = match rule {
                    PrevLinkRule::Ring => b_seq == a_seq - 1 || (a_seq == 0 && b_seq == last),
                    PrevLinkRule::Legacy => {
                        !is_next && (b_seq == a_seq - 1 || (a_seq == 0 && b_seq == expected))
                    }
                };

                if is_next {
                    links.next = Some(b.session_id.clone());
                }
                if is_prev {
                    links.prev = Some(b.session_id.clone());
                }
            }
            links
        })
        .collect()
}

/// Links every participant to its neighbors if the room holds exactly
/// `expected` records. Returns `false` (and changes nothing) otherwise.
///
/// Under [`PrevLinkRule::Ring`] the links are recomputed from scratch, so a
/// participant whose neighbor changed position loses the stale link. Under
/// [`PrevLinkRule::Legacy`] only matched links are written.
pub fn assign_turn_order(
    registry: &mut SessionRegistry,
    expected: usize,
    rule: PrevLinkRule,
) -> bool {
    if registry.len() != expected {
        return false;
    }

    let links = compute_links(&registry.snapshot(), expected, rule);
    for TurnLinks {
        session_id,
        next,
        prev,
    } in links
    {
        let Some(participant) = registry.get_mut(&session_id) else {
            continue;
        };
        match rule {
            PrevLinkRule::Ring => {
                participant.next_participant_id = next;
                participant.prev_participant_id = prev;
            }
            PrevLinkRule::Legacy => {
                if next.is_some() {
                    participant.next_participant_id = next;
                }
                if prev.is_some() {
                    participant.prev_participant_id = prev;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(id: &str) -> SessionId {
        SessionId::new(id)
    }

    /// A registry with one participant per `(id, seq)` pair.
    fn registry_with(entries: &[(&str, u32)]) -> SessionRegistry {
        let mut reg = SessionRegistry::new();
        for (id, seq) in entries {
            reg.create(sid(id)).unwrap().sequence_number = *seq;
        }
        reg
    }

    fn next_of(reg: &SessionRegistry, id: &str) -> Option<SessionId> {
        reg.get(&sid(id)).unwrap().next_participant_id.clone()
    }

    fn prev_of(reg: &SessionRegistry, id: &str) -> Option<SessionId> {
        reg.get(&sid(id)).unwrap().prev_participant_id.clone()
    }

    /// Follows `step` from `start` and returns the cycle length, or `None`
    /// if the walk hits an empty link or doesn't come back to `start`.
    fn cycle_len(
        reg: &SessionRegistry,
        start: &str,
        step: impl Fn(&SessionRegistry, &str) -> Option<SessionId>,
    ) -> Option<usize> {
        let mut current = sid(start);
        for len in 1..=reg.len() {
            current = step(reg, current.as_str())?;
            if current == sid(start) {
                return Some(len);
            }
        }
        None
    }

    // =====================================================================
    // Capacity
    // =====================================================================

    #[test]
    fn test_capacity_first_declaration_is_accepted() {
        let mut cap = Capacity::new(20);
        assert!(!cap.declare(3));
        assert_eq!(cap.expected(), 3);
    }

    #[test]
    fn test_capacity_matching_declaration_is_not_a_conflict() {
        let mut cap = Capacity::new(20);
        cap.declare(3);
        assert!(!cap.declare(3));
        assert_eq!(cap.expected(), 3);
    }

    #[test]
    fn test_capacity_conflict_overwrites_and_reports() {
        let mut cap = Capacity::new(20);
        cap.declare(3);

        assert!(cap.declare(4));
        assert_eq!(cap.expected(), 4);

        // Flapping back is another conflict.
        assert!(cap.declare(3));
        assert_eq!(cap.expected(), 3);
    }

    #[test]
    fn test_capacity_declaring_the_default_is_accepted() {
        let mut cap = Capacity::new(20);
        assert!(!cap.declare(20));
        assert_eq!(cap.expected(), 20);
    }

    // =====================================================================
    // assign_turn_order()
    // =====================================================================

    #[test]
    fn test_assign_three_participants() {
        let mut reg = registry_with(&[("p0", 0), ("p1", 1), ("p2", 2)]);

        assert!(assign_turn_order(&mut reg, 3, PrevLinkRule::Ring));

        assert_eq!(next_of(&reg, "p0"), Some(sid("p1")));
        assert_eq!(next_of(&reg, "p1"), Some(sid("p2")));
        assert_eq!(next_of(&reg, "p2"), Some(sid("p0")));
        assert_eq!(prev_of(&reg, "p1"), Some(sid("p0")));
        assert_eq!(prev_of(&reg, "p0"), Some(sid("p2")));
    }

    #[test]
    fn test_assign_forms_single_cycles_both_ways() {
        for n in 2..=8u32 {
            // Ids in reverse order of seq, so id order != turn order.
            let ids: Vec<String> = (0..n).map(|i| format!("id{}", n - i)).collect();
            let entries: Vec<(&str, u32)> =
                ids.iter().enumerate().map(|(i, id)| (id.as_str(), i as u32)).collect();
            let mut reg = registry_with(&entries);

            assert!(assign_turn_order(&mut reg, n as usize, PrevLinkRule::Ring));

            let start = ids[0].as_str();
            assert_eq!(cycle_len(&reg, start, next_of), Some(n as usize), "next, n={n}");
            assert_eq!(cycle_len(&reg, start, prev_of), Some(n as usize), "prev, n={n}");
        }
    }

    #[test]
    fn test_assign_waits_until_room_is_full() {
        let mut reg = registry_with(&[("p0", 0), ("p1", 1)]);

        assert!(!assign_turn_order(&mut reg, 3, PrevLinkRule::Ring));

        assert_eq!(next_of(&reg, "p0"), None);
        assert_eq!(prev_of(&reg, "p1"), None);
    }

    #[test]
    fn test_legacy_rule_leaves_first_prev_empty() {
        let mut reg = registry_with(&[("p0", 0), ("p1", 1), ("p2", 2)]);

        assert!(assign_turn_order(&mut reg, 3, PrevLinkRule::Legacy));

        assert_eq!(next_of(&reg, "p2"), Some(sid("p0")));
        assert_eq!(prev_of(&reg, "p1"), Some(sid("p0")));
        assert_eq!(prev_of(&reg, "p2"), Some(sid("p1")));
        assert_eq!(prev_of(&reg, "p0"), None);
    }

    #[test]
    fn test_legacy_two_participants_skip_prev_when_next_matched() {
        // With two players, each is the other's successor, so the prev test
        // never runs.
        let mut reg = registry_with(&[("a", 0), ("b", 1)]);

        assert!(assign_turn_order(&mut reg, 2, PrevLinkRule::Legacy));

        assert_eq!(next_of(&reg, "a"), Some(sid("b")));
        assert_eq!(next_of(&reg, "b"), Some(sid("a")));
        assert_eq!(prev_of(&reg, "a"), None);
        assert_eq!(prev_of(&reg, "b"), None);
    }

    #[test]
    fn test_gaps_and_duplicates_leave_links_empty() {
        let mut reg = registry_with(&[("a", 0), ("b", 0), ("c", 5)]);

        assert!(assign_turn_order(&mut reg, 3, PrevLinkRule::Ring));

        assert_eq!(next_of(&reg, "c"), None);
        assert_eq!(prev_of(&reg, "c"), None);
        assert_eq!(next_of(&reg, "a"), None);
    }

    #[test]
    fn test_ring_reassignment_clears_stale_links() {
        let mut reg = registry_with(&[("a", 0), ("b", 1)]);
        assign_turn_order(&mut reg, 2, PrevLinkRule::Ring);
        assert_eq!(next_of(&reg, "a"), Some(sid("b")));

        reg.get_mut(&sid("b")).unwrap().sequence_number = 7;
        assign_turn_order(&mut reg, 2, PrevLinkRule::Ring);

        assert_eq!(next_of(&reg, "a"), None);
    }

    #[test]
    fn test_single_participant_gets_no_self_links() {
        let mut reg = registry_with(&[("solo", 0)]);

        assert!(assign_turn_order(&mut reg, 1, PrevLinkRule::Ring));

        assert_eq!(next_of(&reg, "solo"), None);
        assert_eq!(prev_of(&reg, "solo"), None);
    }
}
