//! The opaque private-key capability.
//!
//! Provides keypair generation, message signing, signature
//! verification, and fingerprint derivation. The rest of the workspace
//! treats a [`PrivateKey`] as an opaque handle with exactly three
//! abilities: sign, expose its public half, and report fingerprints.
//! The secret scalar is zeroized on drop via `ed25519-dalek`'s
//! built-in `ZeroizeOnDrop`.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use havenmail_types::{Fingerprint, HavenmailError, KeyId, Result};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Fixed byte length of an Ed25519 public key.
    pub const LEN: usize = 32;

    /// Creates a [`PublicKey`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying 32-byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the hex form of the raw key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Fixed byte length of an Ed25519 signature.
    pub const LEN: usize = 64;

    /// Creates a [`Signature`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parses a signature from its hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| HavenmailError::CryptoError {
            reason: "invalid hex encoding for signature".into(),
        })?;
        if bytes.len() != Self::LEN {
            return Err(HavenmailError::CryptoError {
                reason: format!("expected {} signature bytes, got {}", Self::LEN, bytes.len()),
            });
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Returns the underlying 64-byte array.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Returns the hex form of the raw signature bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// ---------------------------------------------------------------------------
// PrivateKey
// ---------------------------------------------------------------------------

/// Opaque handle to a decrypted private key.
///
/// Wraps an `ed25519-dalek` [`SigningKey`]. Cloning is allowed: the
/// same handle appears in both the baseline and the candidate active
/// key set while a mutation pipeline is in flight. Every copy zeroizes
/// its secret scalar on drop.
#[derive(Clone)]
pub struct PrivateKey {
    /// Internal signing key. `pub(crate)` so [`crate::lockbox`] can
    /// export the seed without exposing it to external callers.
    pub(crate) signing_key: SigningKey,
}

impl PrivateKey {
    /// Generates a new random key using OS-level entropy.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Reconstructs a key deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Returns the public half of this key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Returns the key's fingerprint: the hex form of the raw public
    /// key bytes.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.public_key().to_hex())
    }

    /// Returns the SHA-256 fingerprint set of this key.
    ///
    /// A single Ed25519 key has exactly one entry; the set form exists
    /// because a Signed Key List entry enumerates one fingerprint per
    /// (sub)key.
    pub fn sha256_fingerprints(&self) -> Vec<String> {
        vec![hex::encode(Sha256::digest(self.public_key().as_bytes()))]
    }

    /// Signs an arbitrary message and returns the Ed25519 signature.
    ///
    /// Deterministic: the same key + message always yields the same
    /// signature (RFC 8032).
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(message);
        Signature(sig.to_bytes())
    }
}

// PrivateKey intentionally does not implement Debug to prevent
// accidental leakage of the secret scalar in logs.

// ---------------------------------------------------------------------------
// DecryptedKey
// ---------------------------------------------------------------------------

/// A server key record's decrypted private material, keyed by id.
///
/// Produced by whatever unlocked the mailbox (login flow, key import)
/// and paired back with the matching
/// [`KeyRecord`](havenmail_types::KeyRecord) during active key set
/// resolution.
#[derive(Clone)]
pub struct DecryptedKey {
    /// Server identifier of the key this material belongs to.
    pub id: KeyId,
    /// The decrypted private-key handle.
    pub private_key: PrivateKey,
}

impl DecryptedKey {
    /// Creates a decrypted key pair entry.
    pub fn new(id: KeyId, private_key: PrivateKey) -> Self {
        Self { id, private_key }
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies an Ed25519 signature against a public key and message.
///
/// Returns `Ok(())` if the signature is valid, or
/// [`HavenmailError::CryptoError`] if verification fails.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let vk = VerifyingKey::from_bytes(&public_key.0).map_err(|e| HavenmailError::CryptoError {
        reason: format!("invalid public key: {e}"),
    })?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify_strict(message, &sig)
        .map_err(|e| HavenmailError::CryptoError {
            reason: format!("signature verification failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_valid_key() {
        let key = PrivateKey::generate();
        let msg = b"test message";
        let sig = key.sign(msg);
        assert!(verify(&key.public_key(), msg, &sig).is_ok());
    }

    #[test]
    fn from_seed_is_deterministic() {
        let seed = [0x42u8; 32];
        let k1 = PrivateKey::from_seed(&seed);
        let k2 = PrivateKey::from_seed(&seed);
        assert_eq!(k1.public_key(), k2.public_key());
        assert_eq!(k1.sign(b"determinism").as_bytes(), k2.sign(b"determinism").as_bytes());
    }

    #[test]
    fn fingerprint_is_hex_of_public_key() {
        let key = PrivateKey::from_seed(&[0xAA; 32]);
        assert_eq!(key.fingerprint().as_str(), key.public_key().to_hex());
        assert_eq!(key.fingerprint().as_str().len(), 64);
    }

    #[test]
    fn sha256_fingerprints_single_entry_distinct_from_fingerprint() {
        let key = PrivateKey::from_seed(&[0xAB; 32]);
        let set = key.sha256_fingerprints();
        assert_eq!(set.len(), 1);
        assert_ne!(set[0], key.fingerprint().as_str());
        assert_eq!(set[0].len(), 64);
    }

    #[test]
    fn wrong_message_fails_verification() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"correct message");
        assert!(verify(&key.public_key(), b"wrong message", &sig).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let k1 = PrivateKey::generate();
        let k2 = PrivateKey::generate();
        let sig = k1.sign(b"test");
        assert!(verify(&k2.public_key(), b"test", &sig).is_err());
    }

    #[test]
    fn signature_hex_roundtrip() -> havenmail_types::Result<()> {
        let key = PrivateKey::from_seed(&[0x01; 32]);
        let sig = key.sign(b"payload");
        let parsed = Signature::from_hex(&sig.to_hex())?;
        assert_eq!(parsed, sig);
        Ok(())
    }

    #[test]
    fn signature_from_hex_rejects_bad_input() {
        assert!(Signature::from_hex("zz").is_err());
        assert!(Signature::from_hex("abcd").is_err());
    }

    #[test]
    fn cloned_handle_signs_identically() {
        let key = PrivateKey::from_seed(&[0x07; 32]);
        let copy = key.clone();
        assert_eq!(key.sign(b"x").as_bytes(), copy.sign(b"x").as_bytes());
    }
}
