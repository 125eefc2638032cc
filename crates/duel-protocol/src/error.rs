//! Error types for the protocol layer.
//!
//! Most variants double as the text sent back to the client in an
//! `error` message, so their `Display` output is part of the wire
//! contract. [`ProtocolError::client_message`] is the one place that
//! maps the remaining, internal-only variants to client text.

/// Errors that can occur while encoding or interpreting messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into JSON).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not a JSON `{type, payload}` envelope.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame was binary, but the protocol is text-only.
    #[error("binary frames are not supported")]
    BinaryFrame,

    /// The envelope's `type` is not one the server handles.
    #[error("Unknown message type '{0}'.")]
    UnknownType(String),

    /// The payload does not have the shape the message type requires.
    #[error("Invalid payload for {0}")]
    InvalidPayload(&'static str),

    /// A room id that is not a UUID.
    #[error("Invalid room ID format")]
    InvalidRoomId,

    /// A `make_move` frame without a payload.
    #[error("Invalid move format.")]
    InvalidMove,
}

impl ProtocolError {
    /// The text to put in the `error` message sent to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Decode(_) | Self::BinaryFrame => "Invalid message format.".into(),
            Self::Encode(_) => "Internal server error.".into(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_message_quotes_the_type() {
        let err = ProtocolError::UnknownType("dance".into());
        assert_eq!(err.client_message(), "Unknown message type 'dance'.");
    }

    #[test]
    fn test_decode_error_maps_to_generic_client_text() {
        let err = serde_json::from_str::<serde_json::Value>("{nope")
            .map_err(ProtocolError::Decode)
            .expect_err("should fail");
        assert_eq!(err.client_message(), "Invalid message format.");
        assert!(err.to_string().starts_with("decode failed"));
    }

    #[test]
    fn test_invalid_payload_names_the_message_type() {
        let err = ProtocolError::InvalidPayload("join_room");
        assert_eq!(err.client_message(), "Invalid payload for join_room");
    }
}
