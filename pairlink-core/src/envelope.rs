//! Wire envelope: the structured message carried by one frame.
//!
//! The wire shape is two-level JSON text: an outer object with a single
//! `data` key whose value is the string-encoded inner object. The inner
//! object carries a `type` discriminant plus the variant fields; binary
//! fields travel as Base64 without line wrapping.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// One protocol envelope. Unrecognized discriminants decode to `Unknown`;
/// only the acceptor role reacts to those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Announce this endpoint's public identity (Base64 of the 64-byte encoding).
    PublicKeyAnnounce { key: String },
    /// Acknowledge a received identity announcement.
    PublicKeyAck { received: bool },
    /// An encrypted chat message: Base64 sealed payload + Base64 signature
    /// over the plaintext.
    Message { ciphertext: String, signature: String },
    /// Handshake complete from the sender's point of view.
    ConnectionAccepted,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize)]
struct Outer {
    data: String,
}

impl Envelope {
    /// Serialize to the two-level wire form.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let inner = serde_json::to_string(self).map_err(EnvelopeError::Inner)?;
        let outer = serde_json::to_string(&Outer { data: inner }).map_err(EnvelopeError::Outer)?;
        Ok(outer.into_bytes())
    }

    /// Parse the outer wrapper, then the inner object. Either level failing
    /// to parse is a protocol error; an unknown `type` is not.
    pub fn decode(bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
        let outer: Outer = serde_json::from_slice(bytes).map_err(EnvelopeError::Outer)?;
        serde_json::from_str(&outer.data).map_err(EnvelopeError::Inner)
    }
}

/// Base64 (standard alphabet, no wrapping) for binary envelope fields.
pub fn to_b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a Base64 envelope field.
pub fn from_b64(value: &str) -> Result<Vec<u8>, EnvelopeError> {
    BASE64.decode(value).map_err(EnvelopeError::Base64)
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed outer envelope: {0}")]
    Outer(#[source] serde_json::Error),
    #[error("malformed inner envelope: {0}")]
    Inner(#[source] serde_json::Error),
    #[error("invalid base64 field: {0}")]
    Base64(#[source] base64::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(envelope: Envelope) {
        let bytes = envelope.encode().unwrap();
        assert_eq!(Envelope::decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn roundtrip_all_kinds() {
        roundtrip(Envelope::PublicKeyAnnounce {
            key: to_b64(&[7u8; 64]),
        });
        roundtrip(Envelope::PublicKeyAck { received: true });
        roundtrip(Envelope::PublicKeyAck { received: false });
        roundtrip(Envelope::Message {
            ciphertext: to_b64(b"sealed"),
            signature: to_b64(b"signed"),
        });
        roundtrip(Envelope::ConnectionAccepted);
    }

    #[test]
    fn wire_shape_is_two_level() {
        let bytes = Envelope::PublicKeyAck { received: true }.encode().unwrap();
        let outer: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let object = outer.as_object().unwrap();
        assert_eq!(object.len(), 1);
        let inner: serde_json::Value =
            serde_json::from_str(object["data"].as_str().unwrap()).unwrap();
        assert_eq!(inner["type"], "public_key_ack");
        assert_eq!(inner["received"], true);
    }

    #[test]
    fn unknown_discriminant_falls_back() {
        let inner = r#"{"type":"mystery","x":1}"#;
        let bytes = serde_json::to_vec(&serde_json::json!({ "data": inner })).unwrap();
        assert_eq!(Envelope::decode(&bytes).unwrap(), Envelope::Unknown);
    }

    #[test]
    fn malformed_outer_is_an_error() {
        assert!(matches!(
            Envelope::decode(b"not an envelope"),
            Err(EnvelopeError::Outer(_))
        ));
        // data must be a string-encoded inner object, not an object
        let bytes = br#"{"data":{"type":"connection_accepted"}}"#;
        assert!(matches!(
            Envelope::decode(bytes),
            Err(EnvelopeError::Outer(_))
        ));
    }

    #[test]
    fn malformed_inner_is_an_error() {
        let bytes = br#"{"data":"not json"}"#;
        assert!(matches!(
            Envelope::decode(bytes),
            Err(EnvelopeError::Inner(_))
        ));
    }

    #[test]
    fn base64_helpers_roundtrip() {
        let bytes = [0u8, 1, 2, 250, 251, 252];
        let encoded = to_b64(&bytes);
        assert!(!encoded.contains('\n'));
        assert_eq!(from_b64(&encoded).unwrap(), bytes);
        assert!(from_b64("***").is_err());
    }
}
