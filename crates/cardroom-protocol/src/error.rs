//! Error types for the protocol layer.

/// Errors that can occur while framing or parsing wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a value to bytes failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not a valid message: malformed JSON, missing fields,
    /// or an unknown `type` tag.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule, e.g. a `Message`
    /// sent before `Join`, or a payload that doesn't fit its kind.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
