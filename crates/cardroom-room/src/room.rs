//! Room actor: an isolated Tokio task that owns one room's state.
//!
//! Each room runs in its own task and talks to the outside world through an
//! mpsc channel. Commands, grace-timer expiries and sync ticks are handled
//! one at a time inside a `tokio::select!` loop, so the room state needs no
//! locks.

use std::collections::HashMap;
use std::time::Duration;

use cardroom_protocol::{kinds, ConnectionId, MessageKind, Recipient, RoomId, ServerMessage, SessionId};
use cardroom_session::{SessionRegistry, UserIdentity};
use cardroom_tick::{SyncConfig, SyncScheduler};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::lifecycle::{GraceTimers, LeaveOutcome, Lifecycle};
use crate::router::{self, Outbound, RouteContext};
use crate::sync::StateSync;
use crate::turn_order::Capacity;
use crate::{RoomConfig, RoomError, RoomHooks};

/// Channel sender for delivering outbound messages to one participant's
/// connection.
pub type ParticipantSender = mpsc::UnboundedSender<ServerMessage>;

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in some variants is a "reply channel": the caller
/// sends a command and waits for the response on that channel.
pub(crate) enum RoomCommand {
    /// Admit an authenticated connection as a new participant.
    Join {
        connection: ConnectionId,
        identity: UserIdentity,
        sender: ParticipantSender,
        reply: oneshot::Sender<Result<JoinTicket, RoomError>>,
    },

    /// Bind a replacement connection to a session in its grace window.
    Reconnect {
        connection: ConnectionId,
        session_id: SessionId,
        reconnect_token: String,
        sender: ParticipantSender,
        reply: oneshot::Sender<Result<JoinTicket, RoomError>>,
    },

    /// The connection closed. `consented` is `true` for an explicit leave.
    Leave {
        connection: ConnectionId,
        session_id: SessionId,
        consented: bool,
    },

    /// A room message from a participant.
    Message {
        connection: ConnectionId,
        session_id: SessionId,
        kind: MessageKind,
        payload: Value,
    },

    /// Request room metadata.
    GetInfo { reply: oneshot::Sender<RoomInfo> },

    /// Posted by a grace timer when it fires.
    GraceExpired { session_id: SessionId, epoch: u64 },

    /// Stop the room.
    Shutdown,
}

/// What a connection needs to know after joining or reconnecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTicket {
    pub room_id: RoomId,
    pub session_id: SessionId,
    pub reconnect_token: String,
}

/// A snapshot of room metadata (not the room state itself).
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    /// The room's unique ID.
    pub room_id: RoomId,
    /// Participant records, including those in the grace window.
    pub participant_count: usize,
    /// Participants with a live connection.
    pub connected_count: usize,
    /// The current (possibly renegotiated) capacity.
    pub max_clients: usize,
    /// Listing data from [`RoomConfig::metadata`].
    pub metadata: Value,
}

impl RoomInfo {
    /// `true` if a join would not be refused as full.
    pub fn has_free_seat(&self) -> bool {
        self.participant_count < self.max_clients
    }
}

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone: it's just an `mpsc::Sender` wrapper. The room stops
/// when every handle is gone.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's unique ID.
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Asks the room to admit a participant. On success the room has
    /// already queued the `Joined` notice, the welcome messages and the
    /// full state on `sender`.
    pub async fn join(
        &self,
        connection: ConnectionId,
        identity: UserIdentity,
        sender: ParticipantSender,
    ) -> Result<JoinTicket, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            connection,
            identity,
            sender,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Asks the room to resume `session_id` on a new connection.
    pub async fn reconnect(
        &self,
        connection: ConnectionId,
        session_id: SessionId,
        reconnect_token: String,
        sender: ParticipantSender,
    ) -> Result<JoinTicket, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Reconnect {
            connection,
            session_id,
            reconnect_token,
            sender,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Reports a closed connection (fire-and-forget).
    pub async fn leave(
        &self,
        connection: ConnectionId,
        session_id: SessionId,
        consented: bool,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Leave {
            connection,
            session_id,
            consented,
        })
        .await
    }

    /// Delivers a room message (fire-and-forget).
    pub async fn send_message(
        &self,
        connection: ConnectionId,
        session_id: SessionId,
        kind: MessageKind,
        payload: Value,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Message {
            connection,
            session_id,
            kind,
            payload,
        })
        .await
    }

    /// Requests the current room info.
    pub async fn get_info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::GetInfo { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

/// A participant's current connection.
struct Binding {
    connection: ConnectionId,
    sender: ParticipantSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<H: RoomHooks> {
    room_id: RoomId,
    config: RoomConfig,
    registry: SessionRegistry,
    capacity: Capacity,
    lifecycle: Lifecycle,
    sync: StateSync,
    scheduler: SyncScheduler,
    /// Connected participants only. A participant in the grace window has
    /// a record but no binding.
    bindings: HashMap<SessionId, Binding>,
    hooks: H,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Auto-dispose only applies once somebody has joined.
    had_participants: bool,
}

impl<H: RoomHooks> RoomActor<H> {
    /// Runs the actor loop until shutdown, disposal, or until every
    /// handle is dropped.
    async fn run(mut self) {
        info!(
            room_id = %self.room_id,
            max_clients = self.config.max_clients,
            patch_rate_hz = self.config.patch_rate_hz,
            "room actor started"
        );
        self.scheduler.pause();

        loop {
            let flow = tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => Flow::Stop,
                },
                tick = self.scheduler.wait_for_tick() => {
                    self.handle_tick(tick.elapsed);
                    self.scheduler.record_tick_end();
                    Flow::Continue
                }
            };

            if flow == Flow::Stop {
                break;
            }
            if self.config.auto_dispose && self.had_participants && self.registry.is_empty() {
                info!(room_id = %self.room_id, "last participant gone, disposing room");
                break;
            }
            if self.registry.connected_count() == 0 {
                self.scheduler.pause();
            } else {
                self.scheduler.resume();
            }
        }

        self.hooks.on_dispose(self.registry.state());
        info!(room_id = %self.room_id, "room actor stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join {
                connection,
                identity,
                sender,
                reply,
            } => {
                let result = self.handle_join(connection, identity, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Reconnect {
                connection,
                session_id,
                reconnect_token,
                sender,
                reply,
            } => {
                let result = self.handle_reconnect(connection, session_id, reconnect_token, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Leave {
                connection,
                session_id,
                consented,
            } => self.handle_leave(connection, session_id, consented),
            RoomCommand::Message {
                connection,
                session_id,
                kind,
                payload,
            } => self.handle_message(connection, session_id, kind, payload),
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::GraceExpired { session_id, epoch } => {
                self.lifecycle.expire(&mut self.registry, &session_id, epoch);
            }
            RoomCommand::Shutdown => {
                info!(room_id = %self.room_id, "room shutting down");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn handle_join(
        &mut self,
        connection: ConnectionId,
        identity: UserIdentity,
        sender: ParticipantSender,
    ) -> Result<JoinTicket, RoomError> {
        if self.registry.len() >= self.capacity.expected() {
            info!(
                room_id = %self.room_id,
                %connection,
                participants = self.registry.len(),
                capacity = self.capacity.expected(),
                "join refused, room full"
            );
            return Err(RoomError::RoomFull(self.room_id));
        }

        let (session_id, reconnect_token) = self.lifecycle.admit(&mut self.registry, identity)?;
        self.had_participants = true;

        let _ = sender.send(ServerMessage::Joined {
            room_id: self.room_id,
            session_id: session_id.clone(),
            reconnect_token: reconnect_token.clone(),
        });
        let _ = sender.send(ServerMessage::message(kinds::WELCOME, json!({ "hello": true })));
        let _ = sender.send(ServerMessage::message(kinds::JOIN_SUCCESS, Value::Null));
        self.send_full_state(&sender);

        self.bindings
            .insert(session_id.clone(), Binding { connection, sender });

        Ok(JoinTicket {
            room_id: self.room_id,
            session_id,
            reconnect_token,
        })
    }

    fn handle_reconnect(
        &mut self,
        connection: ConnectionId,
        session_id: SessionId,
        reconnect_token: String,
        sender: ParticipantSender,
    ) -> Result<JoinTicket, RoomError> {
        self.lifecycle
            .reconnect(&mut self.registry, &session_id, &reconnect_token)?;

        let _ = sender.send(ServerMessage::Joined {
            room_id: self.room_id,
            session_id: session_id.clone(),
            reconnect_token: reconnect_token.clone(),
        });
        self.send_full_state(&sender);

        self.bindings
            .insert(session_id.clone(), Binding { connection, sender });

        Ok(JoinTicket {
            room_id: self.room_id,
            session_id,
            reconnect_token,
        })
    }

    fn handle_leave(&mut self, connection: ConnectionId, session_id: SessionId, consented: bool) {
        if !self.is_bound(&session_id, connection) {
            debug!(
                room_id = %self.room_id,
                %session_id,
                %connection,
                "leave from a replaced connection, ignoring"
            );
            return;
        }
        self.bindings.remove(&session_id);

        if self.lifecycle.leave(&mut self.registry, &session_id, consented) == LeaveOutcome::Ignored {
            debug!(room_id = %self.room_id, %session_id, "leave had no effect");
        }
    }

    fn handle_message(
        &mut self,
        connection: ConnectionId,
        session_id: SessionId,
        kind: MessageKind,
        payload: Value,
    ) {
        if !self.is_bound(&session_id, connection) {
            warn!(
                room_id = %self.room_id,
                %session_id,
                %connection,
                "message from a connection not bound to this session, ignoring"
            );
            return;
        }

        let mut ctx = RouteContext {
            room_id: self.room_id,
            registry: &mut self.registry,
            capacity: &mut self.capacity,
            prev_link_rule: self.config.prev_link_rule,
        };
        let outbound = router::route(&mut ctx, &session_id, kind, payload);
        self.dispatch(outbound);
    }

    fn handle_tick(&mut self, dt: Duration) {
        self.hooks.update(self.registry.state_mut(), dt);

        match self.sync.patch(self.registry.state()) {
            Ok(Some(patch)) => self.dispatch(vec![(Recipient::All, patch)]),
            Ok(None) => {}
            Err(e) => warn!(room_id = %self.room_id, error = %e, "failed to serialize room state"),
        }
    }

    fn is_bound(&self, session_id: &SessionId, connection: ConnectionId) -> bool {
        self.bindings
            .get(session_id)
            .is_some_and(|b| b.connection == connection)
    }

    fn send_full_state(&self, sender: &ParticipantSender) {
        match self.sync.full_state(self.registry.state()) {
            Ok(state) => {
                let _ = sender.send(state);
            }
            Err(e) => warn!(room_id = %self.room_id, error = %e, "failed to serialize room state"),
        }
    }

    /// Delivers outbound messages. Broadcasts go to connected participants
    /// in session-id order.
    fn dispatch(&self, msgs: Outbound) {
        for (recipient, msg) in msgs {
            match recipient {
                Recipient::All => {
                    for id in self.registry.connected_ids() {
                        self.send_to(&id, msg.clone());
                    }
                }
                Recipient::Session(id) => self.send_to(&id, msg),
            }
        }
    }

    /// Sends to a single participant. Silently drops if it has no live
    /// connection.
    fn send_to(&self, session_id: &SessionId, msg: ServerMessage) {
        if let Some(binding) = self.bindings.get(session_id) {
            let _ = binding.sender.send(msg);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id,
            participant_count: self.registry.len(),
            connected_count: self.registry.connected_count(),
            max_clients: self.capacity.expected(),
            metadata: self.config.metadata.clone(),
        }
    }
}

/// Spawns a new room actor task and returns a handle to communicate with it.
///
/// `channel_size` controls backpressure: if the channel fills up, senders
/// wait (bounded channel).
pub(crate) fn spawn_room<H: RoomHooks>(
    room_id: RoomId,
    config: RoomConfig,
    hooks: H,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let timers = GraceTimers::new(room_id, config.reconnect_grace, tx.downgrade());
    let actor = RoomActor {
        room_id,
        registry: SessionRegistry::new(),
        capacity: Capacity::new(config.max_clients),
        lifecycle: Lifecycle::new(room_id, timers),
        sync: StateSync::new(),
        scheduler: SyncScheduler::new(SyncConfig::with_rate(config.patch_rate_hz)),
        bindings: HashMap::new(),
        hooks,
        receiver: rx,
        had_participants: false,
        config,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}
