//! Codec trait and implementations.
//!
//! The engine never touches bytes directly: the connection handler
//! decodes inbound frames into [`Envelope`](crate::Envelope)s and encodes
//! outbound events through whichever [`Codec`] the server was built with.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts wire values to and from bytes.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task of the server.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not describe a `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON codec, the format browser clients speak.
///
/// ```rust
/// use taleroom_protocol::{ClientEvent, Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame = br#"{"room":"AB12CD","event":{"type":"press-buzzer"}}"#;
/// let envelope: Envelope<ClientEvent> = codec.decode(frame).unwrap();
/// assert_eq!(envelope.event, ClientEvent::PressBuzzer);
/// assert_eq!(envelope.room.unwrap().as_str(), "AB12CD");
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
