//! Device identity and payload crypto: keypairs, sealed messages, signatures.
//!
//! Each endpoint owns one x25519 static secret (messages are sealed to its
//! public half) and one ed25519 signing key. The secrets never leave
//! [`DeviceKeys`]; peers only ever see the 64-byte [`PublicIdentity`].

use chacha20poly1305::aead::{Aead, KeyInit};
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};

/// Encoded length of a public identity: exchange key + verifying key.
pub const IDENTITY_LEN: usize = 64;

/// Sealed output overhead: ephemeral public key + AEAD tag.
const SEAL_OVERHEAD: usize = 32 + 16;

/// The transmittable public half of a device identity.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PublicIdentity {
    exchange: [u8; 32],
    signing: [u8; 32],
}

impl PublicIdentity {
    /// Fixed 64-byte encoding: exchange key then verifying key.
    pub fn to_bytes(&self) -> [u8; IDENTITY_LEN] {
        let mut out = [0u8; IDENTITY_LEN];
        out[..32].copy_from_slice(&self.exchange);
        out[32..].copy_from_slice(&self.signing);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() != IDENTITY_LEN {
            return Err(IdentityError::Length(bytes.len()));
        }
        let mut exchange = [0u8; 32];
        let mut signing = [0u8; 32];
        exchange.copy_from_slice(&bytes[..32]);
        signing.copy_from_slice(&bytes[32..]);
        Ok(Self { exchange, signing })
    }
}

/// Error decoding a public identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("expected 64-byte public identity, got {0} bytes")]
    Length(usize),
}

/// Local key material. Secret halves are private to this struct; only
/// `open` and `sign` are invoked on them.
pub struct DeviceKeys {
    exchange: StaticSecret,
    signing: ed25519_dalek::SigningKey,
    public: PublicIdentity,
}

impl DeviceKeys {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        let exchange = StaticSecret::random_from_rng(OsRng);
        let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let public = PublicIdentity {
            exchange: X25519PublicKey::from(&exchange).to_bytes(),
            signing: signing.verifying_key().to_bytes(),
        };
        Self {
            exchange,
            signing,
            public,
        }
    }

    pub fn public(&self) -> &PublicIdentity {
        &self.public
    }

    /// Open a sealed payload addressed to this identity.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(SealError::Truncated);
        }
        let mut ephemeral = [0u8; 32];
        ephemeral.copy_from_slice(&sealed[..32]);
        let shared = self
            .exchange
            .diffie_hellman(&X25519PublicKey::from(ephemeral))
            .to_bytes();
        let key = derive_seal_key(&ephemeral, &self.public.exchange, &shared);
        let cipher =
            chacha20poly1305::ChaCha20Poly1305::new_from_slice(&key).map_err(|_| SealError::Key)?;
        let nonce = [0u8; 12];
        let nonce =
            chacha20poly1305::aead::Nonce::<chacha20poly1305::ChaCha20Poly1305>::from_slice(&nonce);
        cipher
            .decrypt(nonce, &sealed[32..])
            .map_err(|_| SealError::Decrypt)
    }

    /// Sign a message with the local signing key (deterministic, 64 bytes).
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

/// Seal a payload to a peer identity: ephemeral x25519 key agreement, then
/// ChaCha20-Poly1305 under a key derived from the shared secret. Only the
/// matching secret can open the result. Output: ephemeral public key ||
/// ciphertext. The derived key is single-use, so the nonce is fixed.
pub fn seal(plaintext: &[u8], to: &PublicIdentity) -> Result<Vec<u8>, SealError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral
        .diffie_hellman(&X25519PublicKey::from(to.exchange))
        .to_bytes();
    let key = derive_seal_key(&ephemeral_public, &to.exchange, &shared);
    let cipher =
        chacha20poly1305::ChaCha20Poly1305::new_from_slice(&key).map_err(|_| SealError::Key)?;
    let nonce = [0u8; 12];
    let nonce =
        chacha20poly1305::aead::Nonce::<chacha20poly1305::ChaCha20Poly1305>::from_slice(&nonce);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| SealError::Encrypt)?;
    let mut out = Vec::with_capacity(32 + ciphertext.len());
    out.extend_from_slice(&ephemeral_public);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Verify an ed25519 signature over `message` against a peer identity.
/// Never fails loudly: any malformed key, malformed signature, or mismatch
/// is `false`.
pub fn verify(message: &[u8], signature: &[u8], from: &PublicIdentity) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(&from.signing) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Per-message key: label, ephemeral public, recipient public, shared secret.
fn derive_seal_key(ephemeral: &[u8; 32], recipient: &[u8; 32], shared: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"pairlink-seal-v1");
    hasher.update(ephemeral);
    hasher.update(recipient);
    hasher.update(shared);
    hasher.finalize().into()
}

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("invalid key")]
    Key,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("sealed payload truncated")]
    Truncated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let keys = DeviceKeys::generate();
        let sealed = seal(b"hello pairlink", keys.public()).unwrap();
        assert_eq!(keys.open(&sealed).unwrap(), b"hello pairlink");
    }

    #[test]
    fn seal_is_randomized() {
        let keys = DeviceKeys::generate();
        let a = seal(b"same plaintext", keys.public()).unwrap();
        let b = seal(b"same plaintext", keys.public()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn open_rejects_wrong_recipient() {
        let alice = DeviceKeys::generate();
        let bob = DeviceKeys::generate();
        let sealed = seal(b"for alice only", alice.public()).unwrap();
        assert!(matches!(bob.open(&sealed), Err(SealError::Decrypt)));
    }

    #[test]
    fn open_rejects_truncated_input() {
        let keys = DeviceKeys::generate();
        assert!(matches!(
            keys.open(&[0u8; 20]),
            Err(SealError::Truncated)
        ));
    }

    #[test]
    fn open_rejects_flipped_bit() {
        let keys = DeviceKeys::generate();
        let mut sealed = seal(b"payload", keys.public()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(keys.open(&sealed), Err(SealError::Decrypt)));
    }

    #[test]
    fn sign_verify_roundtrip() {
        let keys = DeviceKeys::generate();
        let signature = keys.sign(b"claim");
        assert!(verify(b"claim", &signature, keys.public()));
    }

    #[test]
    fn verify_is_false_never_a_panic() {
        let keys = DeviceKeys::generate();
        let signature = keys.sign(b"claim");
        assert!(!verify(b"other bytes", &signature, keys.public()));
        let mut mutated = signature.clone();
        mutated[0] ^= 0x01;
        assert!(!verify(b"claim", &mutated, keys.public()));
        assert!(!verify(b"claim", b"too short", keys.public()));
        assert!(!verify(b"claim", &signature, DeviceKeys::generate().public()));
    }

    #[test]
    fn public_identity_bytes_roundtrip() {
        let keys = DeviceKeys::generate();
        let bytes = keys.public().to_bytes();
        assert_eq!(&PublicIdentity::from_bytes(&bytes).unwrap(), keys.public());
        assert!(matches!(
            PublicIdentity::from_bytes(&bytes[..63]),
            Err(IdentityError::Length(63))
        ));
    }
}
