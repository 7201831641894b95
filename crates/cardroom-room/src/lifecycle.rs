//! Connection lifecycle: admitting, dropping, resuming and expiring
//! participants.
//!
//! A participant whose socket closes without a consented leave keeps its
//! record for the grace window. Each such participant has exactly one grace
//! timer: a sleeping task that posts [`RoomCommand::GraceExpired`] back to
//! the room actor. Timers carry an epoch so an expiry that was already in
//! flight when the timer got cancelled is recognized and ignored.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use cardroom_protocol::{RoomId, SessionId};
use cardroom_session::{LifecycleState, SessionError, SessionRegistry, UserIdentity};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::room::RoomCommand;

// ---------------------------------------------------------------------------
// GraceTimers
// ---------------------------------------------------------------------------

struct PendingTimer {
    epoch: u64,
    task: JoinHandle<()>,
}

/// One cancellable grace timer per participant.
///
/// Holds only a weak sender to the room, so pending timers don't keep a
/// room alive on their own. Dropping the set aborts every pending timer.
pub(crate) struct GraceTimers {
    room_id: RoomId,
    grace: Duration,
    next_epoch: u64,
    pending: HashMap<SessionId, PendingTimer>,
    commands: mpsc::WeakSender<RoomCommand>,
}

impl GraceTimers {
    pub(crate) fn new(
        room_id: RoomId,
        grace: Duration,
        commands: mpsc::WeakSender<RoomCommand>,
    ) -> Self {
        Self {
            room_id,
            grace,
            next_epoch: 0,
            pending: HashMap::new(),
            commands,
        }
    }

    /// Starts the timer for `session_id`, replacing any pending one.
    fn start(&mut self, session_id: SessionId) {
        self.cancel(&session_id);

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let grace = self.grace;
        let commands = self.commands.clone();
        let id = session_id.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands
                    .send(RoomCommand::GraceExpired {
                        session_id: id,
                        epoch,
                    })
                    .await;
            }
        });

        self.pending.insert(session_id, PendingTimer { epoch, task });
    }

    /// Cancels the pending timer, if any. Returns `true` if one was pending.
    fn cancel(&mut self, session_id: &SessionId) -> bool {
        match self.pending.remove(session_id) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    /// Consumes the pending timer if `epoch` is the current one for
    /// `session_id`.
    fn take_if_current(&mut self, session_id: &SessionId, epoch: u64) -> bool {
        match self.pending.get(session_id) {
            Some(timer) if timer.epoch == epoch => {
                self.pending.remove(session_id);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, session_id: &SessionId) -> bool {
        self.pending.contains_key(session_id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for GraceTimers {
    fn drop(&mut self) {
        for (_, timer) in self.pending.drain() {
            timer.task.abort();
        }
        debug!(room_id = %self.room_id, "grace timers aborted");
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// What a leave did to the participant record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaveOutcome {
    /// The record was deleted.
    Removed,
    /// The record is held for reconnection.
    GracePeriod,
    /// Nothing to do: no such record, or it was already waiting.
    Ignored,
}

/// Drives [`LifecycleState`] transitions of a room's participants.
pub(crate) struct Lifecycle {
    room_id: RoomId,
    timers: GraceTimers,
}

impl Lifecycle {
    pub(crate) fn new(room_id: RoomId, timers: GraceTimers) -> Self {
        Self { room_id, timers }
    }

    /// Creates the record of a freshly authenticated participant. Returns
    /// its session id and reconnection token.
    pub(crate) fn admit(
        &mut self,
        registry: &mut SessionRegistry,
        identity: UserIdentity,
    ) -> Result<(SessionId, String), SessionError> {
        let session_id = registry.next_session_id();
        let user_id = identity.user_id.clone();

        let display_name = identity.display_name.clone();

        let participant = registry.create_connecting(session_id.clone())?;
        participant.set_identity(identity);
        participant.transition(LifecycleState::Connected);
        let token = participant.reconnect_token().to_string();

        info!(
            room_id = %self.room_id,
            %session_id,
            %user_id,
            display_name = display_name.as_deref(),
            participants = registry.len(),
            "participant joined"
        );
        Ok((session_id, token))
    }

    /// Handles a closed connection. A consented leave deletes the record;
    /// anything else starts the grace window.
    pub(crate) fn leave(
        &mut self,
        registry: &mut SessionRegistry,
        session_id: &SessionId,
        consented: bool,
    ) -> LeaveOutcome {
        let Some(participant) = registry.get_mut(session_id) else {
            return LeaveOutcome::Ignored;
        };

        if consented {
            if participant.transition(LifecycleState::Removed).is_none() {
                warn!(
                    room_id = %self.room_id,
                    %session_id,
                    state = %participant.state(),
                    "unexpected state on leave"
                );
            }
            self.timers.cancel(session_id);
            let _ = registry.remove(session_id);
            info!(
                room_id = %self.room_id,
                %session_id,
                participants = registry.len(),
                "participant left"
            );
            return LeaveOutcome::Removed;
        }

        let since = Instant::now();
        if participant
            .transition(LifecycleState::GracePeriod { since })
            .is_none()
        {
            return LeaveOutcome::Ignored;
        }
        self.timers.start(session_id.clone());
        info!(
            room_id = %self.room_id,
            %session_id,
            grace_secs = self.timers.grace.as_secs_f64(),
            "participant dropped, holding seat"
        );
        LeaveOutcome::GracePeriod
    }

    /// Resumes a session in its grace window.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: no record (never existed, or expired).
    /// - [`SessionError::InvalidToken`]: the token doesn't match.
    /// - [`SessionError::AlreadyConnected`]: the old socket is still open.
    pub(crate) fn reconnect(
        &mut self,
        registry: &mut SessionRegistry,
        session_id: &SessionId,
        token: &str,
    ) -> Result<(), SessionError> {
        let participant = registry
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;

        if !participant.token_matches(token) {
            return Err(SessionError::InvalidToken);
        }

        let since = match participant.state() {
            LifecycleState::GracePeriod { since } => since,
            LifecycleState::Connected => {
                return Err(SessionError::AlreadyConnected(session_id.clone()));
            }
            _ => return Err(SessionError::NotFound(session_id.clone())),
        };

        participant.transition(LifecycleState::Connected);
        self.timers.cancel(session_id);
        info!(
            room_id = %self.room_id,
            %session_id,
            away_ms = since.elapsed().as_millis() as u64,
            "participant reconnected"
        );
        Ok(())
    }

    /// Handles a fired grace timer. Returns `true` if the record was
    /// removed.
    pub(crate) fn expire(
        &mut self,
        registry: &mut SessionRegistry,
        session_id: &SessionId,
        epoch: u64,
    ) -> bool {
        if !self.timers.take_if_current(session_id, epoch) {
            debug!(room_id = %self.room_id, %session_id, epoch, "stale grace timer ignored");
            return false;
        }

        let Some(participant) = registry.get_mut(session_id) else {
            return false;
        };
        if participant.transition(LifecycleState::Removed).is_none() {
            return false;
        }
        let _ = registry.remove(session_id);
        info!(
            room_id = %self.room_id,
            %session_id,
            participants = registry.len(),
            "grace period expired, participant removed"
        );
        true
    }

    #[cfg(test)]
    pub(crate) fn timers(&self) -> &GraceTimers {
        &self.timers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A lifecycle whose timers post into the returned receiver.
    fn lifecycle(grace: Duration) -> (Lifecycle, mpsc::Sender<RoomCommand>, mpsc::Receiver<RoomCommand>) {
        let (tx, rx) = mpsc::channel(8);
        let timers = GraceTimers::new(RoomId(1), grace, tx.downgrade());
        (Lifecycle::new(RoomId(1), timers), tx, rx)
    }

    fn admit(lc: &mut Lifecycle, reg: &mut SessionRegistry) -> (SessionId, String) {
        lc.admit(reg, UserIdentity::new("user")).unwrap()
    }

    async fn next_expiry(rx: &mut mpsc::Receiver<RoomCommand>) -> (SessionId, u64) {
        match rx.recv().await {
            Some(RoomCommand::GraceExpired { session_id, epoch }) => (session_id, epoch),
            _ => panic!("expected a grace expiry"),
        }
    }

    #[tokio::test]
    async fn test_admit_creates_connected_record_with_identity() {
        let (mut lc, _tx, _rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();

        let (id, token) = admit(&mut lc, &mut reg);

        let p = reg.get(&id).unwrap();
        assert!(p.is_connected());
        assert_eq!(p.reconnect_token(), token);
        assert_eq!(p.identity().unwrap().user_id, "user");
    }

    #[tokio::test]
    async fn test_admit_keeps_display_name() {
        let (mut lc, _tx, _rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();

        let identity = UserIdentity::new("u-7").with_display_name("Ketut");
        let (id, _) = lc.admit(&mut reg, identity).unwrap();

        let stored = reg.get(&id).unwrap().identity().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Ketut"));
    }

    #[tokio::test]
    async fn test_consented_leave_removes_immediately() {
        let (mut lc, _tx, _rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();
        let (id, _) = admit(&mut lc, &mut reg);

        assert_eq!(lc.leave(&mut reg, &id, true), LeaveOutcome::Removed);

        assert!(reg.get(&id).is_none());
        assert_eq!(lc.timers().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconsented_leave_keeps_record_and_starts_timer() {
        let (mut lc, _tx, mut rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();
        let (id, _) = admit(&mut lc, &mut reg);

        assert_eq!(lc.leave(&mut reg, &id, false), LeaveOutcome::GracePeriod);
        assert!(!reg.get(&id).unwrap().is_connected());
        assert!(lc.timers().is_pending(&id));

        let (expired, epoch) = next_expiry(&mut rx).await;
        assert_eq!(expired, id);
        assert!(lc.expire(&mut reg, &expired, epoch));
        assert!(reg.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_second_unconsented_leave_is_ignored() {
        let (mut lc, _tx, _rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();
        let (id, _) = admit(&mut lc, &mut reg);

        lc.leave(&mut reg, &id, false);
        assert_eq!(lc.leave(&mut reg, &id, false), LeaveOutcome::Ignored);
        assert_eq!(lc.timers().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_restores_record_and_cancels_timer() {
        let (mut lc, _tx, _rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();
        let (id, token) = admit(&mut lc, &mut reg);
        reg.get_mut(&id).unwrap().hand_cards = vec![1, 2, 3];
        lc.leave(&mut reg, &id, false);

        lc.reconnect(&mut reg, &id, &token).expect("should resume");

        let p = reg.get(&id).unwrap();
        assert!(p.is_connected());
        assert_eq!(p.hand_cards, vec![1, 2, 3]);
        assert!(!lc.timers().is_pending(&id));
    }

    #[tokio::test]
    async fn test_reconnect_rejects_wrong_token_and_live_session() {
        let (mut lc, _tx, _rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();
        let (id, token) = admit(&mut lc, &mut reg);

        assert!(matches!(
            lc.reconnect(&mut reg, &id, &token),
            Err(SessionError::AlreadyConnected(_))
        ));

        lc.leave(&mut reg, &id, false);
        assert!(matches!(
            lc.reconnect(&mut reg, &id, "wrong"),
            Err(SessionError::InvalidToken)
        ));
        assert!(matches!(
            lc.reconnect(&mut reg, &SessionId::new("ghost"), &token),
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_after_reconnect_is_ignored() {
        let (mut lc, _tx, _rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();
        let (id, token) = admit(&mut lc, &mut reg);

        lc.leave(&mut reg, &id, false);
        lc.reconnect(&mut reg, &id, &token).unwrap();

        // An expiry that was already queued when the timer got cancelled.
        assert!(!lc.expire(&mut reg, &id, 1));
        assert!(reg.get(&id).unwrap().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_epoch_is_ignored_after_second_drop() {
        let (mut lc, _tx, _rx) = lifecycle(Duration::from_secs(10));
        let mut reg = SessionRegistry::new();
        let (id, token) = admit(&mut lc, &mut reg);

        lc.leave(&mut reg, &id, false);
        lc.reconnect(&mut reg, &id, &token).unwrap();
        lc.leave(&mut reg, &id, false);

        assert!(!lc.expire(&mut reg, &id, 1));
        assert!(reg.get(&id).is_some());
        assert!(lc.expire(&mut reg, &id, 2));
        assert!(reg.get(&id).is_none());
    }
}
