//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and the text
//! frames that travel over the transport. The rest of the server only
//! talks to the [`Codec`] trait, so the wire format lives in one place.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that turns Rust values into text frames and back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → one codec instance is shared by every connection
///   task, on whichever runtime thread they happen to run.
/// - `'static` → the codec owns everything it needs, so it can live in
///   long-lived shared state.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into one text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes one text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or does
    /// not match the expected type.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use duel_protocol::{Codec, JsonCodec, ServerMessage};
///
/// let codec = JsonCodec;
/// let text = codec
///     .encode(&ServerMessage::Error { message: "nope".into() })
///     .unwrap();
/// assert_eq!(text, r#"{"type":"error","payload":{"message":"nope"}}"#);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientMessage, Envelope};

    #[test]
    fn test_decode_envelope_then_interpret() {
        let codec = JsonCodec;
        let env: Envelope = codec
            .decode(r#"{"type":"rematch_request"}"#)
            .expect("decode");
        let msg = ClientMessage::try_from(env).expect("interpret");
        assert_eq!(msg, ClientMessage::RematchRequest);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let codec = JsonCodec;
        let err = codec.decode::<Envelope>("not json").expect_err("should fail");
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
