//! Error types for the protocol layer.
//!
//! Each crate in Parlor defines its own error enum; a `ProtocolError`
//! always means "this frame could not be understood", never a networking
//! or room-state problem.

/// Errors that can occur in the protocol layer.
///
/// Per the engine's error policy, none of these are fatal: an envelope
/// that fails to decode is logged and dropped, and the connection that
/// sent it keeps running.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (malformed JSON, missing fields, wrong
    /// types, truncated frame).
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The `type` string's namespace prefix isn't one of
    /// `player`/`room`/`global`.
    #[error("unknown message namespace: {0}")]
    UnknownScope(String),

    /// The `type` string isn't of the form `<scope>.<verb>`.
    #[error("malformed message type: {0:?}")]
    MalformedType(String),

    /// The frame decoded but violates the envelope contract (e.g. a
    /// payload of the wrong shape for a framework verb).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
