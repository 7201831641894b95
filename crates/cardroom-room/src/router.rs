//! Message routing: one handler per inbound message kind.
//!
//! | kind            | handler                                           |
//! |-----------------|---------------------------------------------------|
//! | `0`             | echo the payload back to the sender               |
//! | `"schema"`      | `Ack { hasError: false }` to the sender           |
//! | `"setInitData"` | record position, negotiate capacity, link turns   |
//! | `"move_right"`  | broadcast `"hello"` to every connected participant |
//! | anything else   | logged at debug level and dropped                 |
//!
//! Handlers don't send anything themselves. They return
//! `(Recipient, ServerMessage)` pairs and the room actor delivers them.

use cardroom_protocol::{
    kinds, Ack, InitData, MessageKind, Recipient, RoomId, ServerMessage, SessionId,
};
use cardroom_session::SessionRegistry;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::turn_order::{assign_turn_order, Capacity};
use crate::PrevLinkRule;

/// Outbound messages produced by one routed message.
pub(crate) type Outbound = Vec<(Recipient, ServerMessage)>;

/// The parts of the room a handler may touch.
pub(crate) struct RouteContext<'a> {
    pub room_id: RoomId,
    pub registry: &'a mut SessionRegistry,
    pub capacity: &'a mut Capacity,
    pub prev_link_rule: PrevLinkRule,
}

/// Dispatches `(kind, payload)` from `sender` to its handler.
pub(crate) fn route(
    ctx: &mut RouteContext<'_>,
    sender: &SessionId,
    kind: MessageKind,
    payload: Value,
) -> Outbound {
    match kind {
        MessageKind::Code(kinds::ECHO) => echo(sender, kind, payload),
        MessageKind::Name(ref name) if name == kinds::SCHEMA => schema(sender),
        MessageKind::Name(ref name) if name == kinds::SET_INIT_DATA => {
            set_init_data(ctx, sender, payload)
        }
        MessageKind::Name(ref name) if name == kinds::MOVE_RIGHT => move_right(),
        kind => {
            debug!(
                room_id = %ctx.room_id,
                %sender,
                %kind,
                %payload,
                "unhandled message kind, dropping"
            );
            Vec::new()
        }
    }
}

fn echo(sender: &SessionId, kind: MessageKind, payload: Value) -> Outbound {
    vec![(
        Recipient::Session(sender.clone()),
        ServerMessage::message(kind, payload),
    )]
}

fn schema(sender: &SessionId) -> Outbound {
    vec![(
        Recipient::Session(sender.clone()),
        ServerMessage::Ack(Ack { has_error: false }),
    )]
}

fn set_init_data(ctx: &mut RouteContext<'_>, sender: &SessionId, payload: Value) -> Outbound {
    let reply_to = Recipient::Session(sender.clone());

    let init: InitData = match serde_json::from_value(payload) {
        Ok(init) => init,
        Err(e) => {
            warn!(room_id = %ctx.room_id, %sender, error = %e, "malformed setInitData");
            return vec![(reply_to, ServerMessage::error(400, format!("invalid setInitData: {e}")))];
        }
    };
    if init.expected_participant_count == 0 {
        return vec![(
            reply_to,
            ServerMessage::error(400, "expectedParticipantCount must be at least 1"),
        )];
    }

    let Some(participant) = ctx.registry.get_mut(sender) else {
        warn!(room_id = %ctx.room_id, %sender, "setInitData from unknown participant");
        return Vec::new();
    };
    participant.sequence_number = init.sequence_number;
    participant.external_ref = init.external_ref;
    debug!(
        room_id = %ctx.room_id,
        %sender,
        sequence_number = init.sequence_number,
        expected = init.expected_participant_count,
        "init data received"
    );

    let has_error = ctx.capacity.declare(init.expected_participant_count);
    if has_error {
        warn!(
            room_id = %ctx.room_id,
            %sender,
            expected = ctx.capacity.expected(),
            "conflicting capacity declaration"
        );
    }

    let expected = ctx.capacity.expected();
    if assign_turn_order(ctx.registry, expected, ctx.prev_link_rule) {
        info!(room_id = %ctx.room_id, participants = expected, "turn order assigned");
    }

    vec![(reply_to, ServerMessage::Ack(Ack { has_error }))]
}

fn move_right() -> Outbound {
    vec![(
        Recipient::All,
        ServerMessage::message(kinds::HELLO, json!({ "hello": "hello world" })),
    )]
}
