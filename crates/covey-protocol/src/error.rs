//! Error types for the protocol layer.

/// Errors raised while converting between wire frames and Rust types.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or an
    /// unknown message `type`.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded fine but breaks a protocol rule, e.g. a control
    /// request on a connection that already performed a live handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
