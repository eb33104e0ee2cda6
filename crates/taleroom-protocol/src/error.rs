//! Error types for the protocol layer.

/// Errors raised while encoding, decoding, or validating wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not a valid frame (malformed JSON, missing or
    /// mistyped fields, unknown event type).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value parsed but breaks a wire rule, e.g. a 5-character room
    /// code or an empty player id.
    #[error("invalid value: {0}")]
    Invalid(String),
}
