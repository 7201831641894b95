//! Core protocol types for Cardroom's wire format.
//!
//! Everything in this module travels "on the wire": it is serialized to
//! JSON, sent over a WebSocket, and parsed on the other side. Game payloads
//! are carried as [`serde_json::Value`] so the framework can move them
//! around without knowing their shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one participant session inside a room.
///
/// Assigned by the server on join and kept across reconnections, so a
/// participant that drops and comes back within the grace window keeps the
/// same `SessionId` (and the same record in the room state).
///
/// `#[serde(transparent)]` serializes `SessionId("aB3xY9kLm")` as the plain
/// string `"aB3xY9kLm"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Wraps any string-like value as a session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifies one transport connection (one WebSocket).
///
/// Unlike [`SessionId`], this changes on every reconnection. The room uses
/// it to ignore late events from a socket that has already been replaced.
/// Never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A unique identifier for a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// Well-known message kinds.
pub mod kinds {
    /// Echo: the payload is sent back verbatim to the sender.
    pub const ECHO: u32 = 0;
    /// Requests a typed [`Ack`](super::Ack).
    pub const SCHEMA: &str = "schema";
    /// Participant declares its turn position and the room capacity.
    pub const SET_INIT_DATA: &str = "setInitData";
    /// Triggers the placeholder `hello` broadcast.
    pub const MOVE_RIGHT: &str = "move_right";
    /// Outbound: the welcome message sent to a joining participant.
    pub const WELCOME: &str = "type";
    /// Outbound: sent to a joining participant after the welcome.
    pub const JOIN_SUCCESS: &str = "joinSuccess";
    /// Outbound: the payload kind of the `move_right` broadcast.
    pub const HELLO: &str = "hello";
}

/// The routing key of a room message: either a number or a name.
///
/// `#[serde(untagged)]` lets the JSON carry a bare `0` or a bare
/// `"setInitData"` — serde tries each variant in order until one fits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageKind {
    Code(u32),
    Name(String),
}

impl MessageKind {
    /// Shorthand for a named kind.
    pub fn name(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u32> for MessageKind {
    fn from(code: u32) -> Self {
        Self::Code(code)
    }
}

impl From<&str> for MessageKind {
    fn from(name: &str) -> Self {
        Self::name(name)
    }
}

// ---------------------------------------------------------------------------
// Typed payloads
// ---------------------------------------------------------------------------

/// Payload of a `setInitData` message.
///
/// Field names follow the client SDK (`sequenceNumber`, `externalRef`,
/// `expectedParticipantCount`) via `rename_all = "camelCase"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitData {
    /// The participant's 0-based position in turn order.
    pub sequence_number: u32,

    /// Opaque reference to the participant's external game session.
    #[serde(default)]
    pub external_ref: String,

    /// How many participants the sender expects the room to hold.
    pub expected_participant_count: usize,
}

/// Typed acknowledgment returned for `schema` and `setInitData`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    /// `true` when the acknowledged request conflicted with room state
    /// (e.g., a capacity declaration that disagrees with the current one).
    pub has_error: bool,
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive an outbound message produced by the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected participant in the room.
    All,

    /// A single participant.
    Session(SessionId),
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Messages a client sends to the server.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "Join", "token": "abc", "options": {} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message on a fresh connection: authenticate and join a room.
    /// `options` is handed to the authenticator untouched.
    Join {
        token: Option<String>,
        #[serde(default)]
        options: Value,
    },

    /// First message on a replacement connection: resume a session that is
    /// inside its reconnection grace window.
    Reconnect {
        room_id: RoomId,
        session_id: SessionId,
        reconnect_token: String,
    },

    /// Consented leave. The participant record is removed immediately.
    Leave,

    /// A room message routed by `kind`.
    Message {
        kind: MessageKind,
        #[serde(default)]
        payload: Value,
    },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// The connection was admitted to a room. The client keeps
    /// `reconnect_token` to resume the session after a drop.
    Joined {
        room_id: RoomId,
        session_id: SessionId,
        reconnect_token: String,
    },

    /// A room message (echo replies, welcome notices, broadcasts).
    Message { kind: MessageKind, payload: Value },

    /// Typed acknowledgment: `{ "type": "Ack", "hasError": false }`.
    Ack(Ack),

    /// Full room state, sent on join, on reconnection and whenever the
    /// state changed since the previous sync tick. `seq` increases with
    /// every generated patch.
    State { seq: u64, state: Value },

    /// Something went wrong. `code` follows HTTP conventions
    /// (400 bad request, 401 unauthorized, 404 not found, 409 conflict).
    Error { code: u16, message: String },
}

impl ServerMessage {
    /// Builds a [`ServerMessage::Message`].
    pub fn message(kind: impl Into<MessageKind>, payload: Value) -> Self {
        Self::Message {
            kind: kind.into(),
            payload,
        }
    }

    /// Builds a [`ServerMessage::Error`].
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level frame. Every WebSocket message is one envelope.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ seq: 42                      │  ← per-direction ordering
/// │ timestamp: 15000             │  ← ms since the sender started
/// │ body: ClientMessage / Server │
/// └──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Auto-incrementing sequence number, one counter per direction.
    pub seq: u64,

    /// Milliseconds since the sending side started.
    #[serde(default)]
    pub timestamp: u64,

    /// The message itself.
    pub body: T,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The client SDK parses these exact JSON shapes, so each test pins one.

    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&SessionId::new("abc123")).unwrap();
        assert_eq!(json, "\"abc123\"");
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }

    #[test]
    fn test_room_id_display() {
        assert_eq!(RoomId(3).to_string(), "R-3");
    }

    #[test]
    fn test_message_kind_parses_number_and_name() {
        let code: MessageKind = serde_json::from_value(json!(0)).unwrap();
        assert_eq!(code, MessageKind::Code(kinds::ECHO));

        let name: MessageKind =
            serde_json::from_value(json!("setInitData")).unwrap();
        assert_eq!(name, MessageKind::name(kinds::SET_INIT_DATA));
    }

    #[test]
    fn test_message_kind_display() {
        assert_eq!(MessageKind::Code(7).to_string(), "7");
        assert_eq!(MessageKind::name("move_right").to_string(), "move_right");
    }

    #[test]
    fn test_init_data_uses_camel_case_fields() {
        let init: InitData = serde_json::from_value(json!({
            "sequenceNumber": 2,
            "externalRef": "gs-77",
            "expectedParticipantCount": 4
        }))
        .unwrap();

        assert_eq!(init.sequence_number, 2);
        assert_eq!(init.external_ref, "gs-77");
        assert_eq!(init.expected_participant_count, 4);
    }

    #[test]
    fn test_init_data_external_ref_is_optional() {
        let init: InitData = serde_json::from_value(json!({
            "sequenceNumber": 0,
            "expectedParticipantCount": 2
        }))
        .unwrap();
        assert_eq!(init.external_ref, "");
    }

    #[test]
    fn test_init_data_missing_count_is_rejected() {
        let result: Result<InitData, _> =
            serde_json::from_value(json!({ "sequenceNumber": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_ack_json_format() {
        let json = serde_json::to_value(ServerMessage::Ack(Ack {
            has_error: true,
        }))
        .unwrap();
        assert_eq!(json, json!({ "type": "Ack", "hasError": true }));
    }

    #[test]
    fn test_client_join_without_options_defaults_to_null() {
        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "Join", "token": "t" }))
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                token: Some("t".into()),
                options: Value::Null,
            }
        );
    }

    #[test]
    fn test_client_message_json_format() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "Message",
            "kind": 0,
            "payload": { "x": 1 }
        }))
        .unwrap();

        let ClientMessage::Message { kind, payload } = msg else {
            panic!("expected Message");
        };
        assert_eq!(kind, MessageKind::Code(0));
        assert_eq!(payload, json!({ "x": 1 }));
    }

    #[test]
    fn test_server_joined_json_format() {
        let json = serde_json::to_value(ServerMessage::Joined {
            room_id: RoomId(9),
            session_id: SessionId::new("s1"),
            reconnect_token: "tok".into(),
        })
        .unwrap();

        assert_eq!(json["type"], "Joined");
        assert_eq!(json["room_id"], 9);
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["reconnect_token"], "tok");
    }

    #[test]
    fn test_envelope_timestamp_defaults_when_missing() {
        let env: Envelope<ClientMessage> = serde_json::from_value(json!({
            "seq": 1,
            "body": { "type": "Leave" }
        }))
        .unwrap();
        assert_eq!(env.timestamp, 0);
        assert_eq!(env.body, ClientMessage::Leave);
    }

    #[test]
    fn test_decode_unknown_client_message_type_returns_error() {
        let result: Result<ClientMessage, _> =
            serde_json::from_value(json!({ "type": "FlyToMoon" }));
        assert!(result.is_err());
    }
}
