//! Change detection for state patches.
//!
//! Each sync tick the room serializes its state and compares it with what
//! was last broadcast. Only a changed state produces a patch, and every
//! patch gets the next sequence number. The patch carries the whole state;
//! clients replace rather than merge.

use cardroom_protocol::ServerMessage;
use cardroom_session::RoomState;
use serde_json::Value;

#[derive(Debug, Default)]
pub(crate) struct StateSync {
    seq: u64,
    last_sent: Option<Value>,
}

impl StateSync {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The next patch, or `None` if nothing changed since the last one.
    pub(crate) fn patch(
        &mut self,
        state: &RoomState,
    ) -> Result<Option<ServerMessage>, serde_json::Error> {
        let value = serde_json::to_value(state)?;
        if self.last_sent.as_ref() == Some(&value) {
            return Ok(None);
        }
        self.seq += 1;
        self.last_sent = Some(value.clone());
        Ok(Some(ServerMessage::State {
            seq: self.seq,
            state: value,
        }))
    }

    /// The current full state for one participant (join, reconnection).
    /// Doesn't count as a broadcast.
    pub(crate) fn full_state(&self, state: &RoomState) -> Result<ServerMessage, serde_json::Error> {
        Ok(ServerMessage::State {
            seq: self.seq,
            state: serde_json::to_value(state)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }
}
