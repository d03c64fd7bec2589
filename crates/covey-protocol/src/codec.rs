//! Codecs: turning wire types into bytes and back.
//!
//! The server never touches `serde_json` directly. It holds something that
//! implements [`Codec`], so a binary format can replace JSON later without
//! changing the connection handler.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes to values.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value cannot be
    /// represented in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// describe a different type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// Browser clients speak JSON natively, so this is the default.
///
/// ```rust
/// use covey_protocol::{Codec, ControlMessage, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::control(1, ControlMessage::ListTowns);
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Envelope, LiveMessage, Payload};

    #[test]
    fn test_json_codec_decodes_client_frame() {
        let frame = br#"{
            "seq": 0,
            "timestamp": 0,
            "payload": {
                "type": "Live",
                "data": { "type": "Disconnect", "reason": "tab closed" }
            }
        }"#;

        let envelope: Envelope = JsonCodec.decode(frame).unwrap();

        assert_eq!(
            envelope.payload,
            Payload::Live(LiveMessage::Disconnect {
                reason: "tab closed".into()
            })
        );
    }

    #[test]
    fn test_json_codec_garbage_returns_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
