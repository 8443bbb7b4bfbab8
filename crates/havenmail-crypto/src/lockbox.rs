//! Passphrase-based private-key export and unlock.
//!
//! A private key at rest is a small JSON "lockbox": the 32-byte seed
//! sealed with XChaCha20-Poly1305 under an Argon2id-derived key. The
//! AEAD's associated data binds the ciphertext to an identity string
//! (the address email, or the fixed account identity), so a key
//! exported for one identity cannot be opened as another:
//!
//! ```text
//! aad        = b"havenmail-key-v1:" || identity
//! key        = Argon2id(passphrase, salt)
//! ciphertext = XChaCha20-Poly1305(key, nonce, seed, aad)
//! ```
//!
//! The same KDF derives the account-wide key passphrase from the login
//! password during initial setup.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use havenmail_types::{HavenmailError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::key::PrivateKey;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Domain-separation prefix for the lockbox AAD.
const LOCKBOX_AAD_PREFIX: &[u8] = b"havenmail-key-v1:";

/// Lockbox format version written into every export.
const LOCKBOX_VERSION: u32 = 1;

/// Byte length of the random key salt generated during setup.
const KEY_SALT_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Argon2Params
// ---------------------------------------------------------------------------

/// Configurable parameters for the Argon2id key derivation function.
///
/// # Defaults
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 65 536  | Memory usage in KiB (64 MiB) |
/// | `t_cost`  | 3       | Number of iterations |
/// | `p_cost`  | 1       | Degree of parallelism |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Memory cost in KiB. Must be ≥ 8 × `p_cost`.
    pub m_cost: u32,
    /// Time cost (number of passes). Must be ≥ 1.
    pub t_cost: u32,
    /// Parallelism degree. Must be ≥ 1.
    pub p_cost: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            m_cost: 65_536, // 64 MiB
            t_cost: 3,
            p_cost: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// DerivedKey
// ---------------------------------------------------------------------------

/// 256-bit key derived by Argon2id, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey([u8; 32]);

/// Derives a 256-bit key from a passphrase and salt using Argon2id.
fn argon2id_derive_key(passphrase: &[u8], salt: &[u8], params: &Argon2Params) -> Result<DerivedKey> {
    let argon2_params = argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| HavenmailError::ConfigError {
            reason: format!("invalid Argon2 parameters: {e}"),
        })?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| HavenmailError::CryptoError {
            reason: format!("Argon2id derivation failed: {e}"),
        })?;

    Ok(DerivedKey(output))
}

// ---------------------------------------------------------------------------
// Lockbox file format
// ---------------------------------------------------------------------------

/// On-the-wire JSON form of an exported private key.
///
/// All binary fields are base64; `public_key` is hex so it can be
/// compared against fingerprints without decoding.
#[derive(Serialize, Deserialize)]
struct LockboxFile {
    version: u32,
    public_key: String,
    salt: String,
    nonce: String,
    params: Argon2Params,
    ciphertext: String,
}

// ---------------------------------------------------------------------------
// Export / unlock
// ---------------------------------------------------------------------------

/// Exports a private key as armored ciphertext bound to `identity`.
///
/// # Process
///
/// 1. Generate a random 32-byte salt and 24-byte nonce.
/// 2. Derive the sealing key via Argon2id(passphrase, salt).
/// 3. Seal the 32-byte seed with XChaCha20-Poly1305, AAD binding the
///    lockbox version and identity.
/// 4. Serialize the lockbox to JSON.
///
/// # Errors
///
/// - [`HavenmailError::CryptoError`] if entropy, derivation, or
///   sealing fails.
pub fn export_private_key(
    key: &PrivateKey,
    passphrase: &str,
    identity: &str,
    params: &Argon2Params,
) -> Result<String> {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; 24];
    OsRng.fill_bytes(&mut nonce);

    let derived = argon2id_derive_key(passphrase.as_bytes(), &salt, params)?;

    let mut seed = key.signing_key.to_bytes();
    let sealed = seal(&derived.0, &nonce, &seed, &lockbox_aad(identity));
    seed.zeroize();
    let ciphertext = sealed?;

    let file = LockboxFile {
        version: LOCKBOX_VERSION,
        public_key: key.public_key().to_hex(),
        salt: BASE64.encode(salt),
        nonce: BASE64.encode(nonce),
        params: *params,
        ciphertext: BASE64.encode(ciphertext),
    };

    serde_json::to_string(&file).map_err(|e| HavenmailError::CryptoError {
        reason: format!("lockbox serialization failed: {e}"),
    })
}

/// Unlocks an armored private key exported by [`export_private_key`].
///
/// The passphrase **and** the identity must match the export: a wrong
/// identity fails AEAD authentication exactly like a wrong passphrase.
/// After opening, the derived public key is checked against the stored
/// one to catch corrupted or mismatched lockboxes.
///
/// # Errors
///
/// - [`HavenmailError::CryptoError`] if the armored form is malformed,
///   authentication fails, or the public key does not match.
pub fn unlock_private_key(armored: &str, passphrase: &str, identity: &str) -> Result<PrivateKey> {
    let file: LockboxFile =
        serde_json::from_str(armored).map_err(|e| HavenmailError::CryptoError {
            reason: format!("malformed key lockbox: {e}"),
        })?;

    if file.version != LOCKBOX_VERSION {
        return Err(HavenmailError::CryptoError {
            reason: format!("unsupported lockbox version {}", file.version),
        });
    }

    let salt = decode_b64(&file.salt, "salt")?;
    let nonce_bytes = decode_b64(&file.nonce, "nonce")?;
    let ciphertext = decode_b64(&file.ciphertext, "ciphertext")?;
    if nonce_bytes.len() != 24 {
        return Err(HavenmailError::CryptoError {
            reason: format!("expected 24 nonce bytes, got {}", nonce_bytes.len()),
        });
    }
    let mut nonce = [0u8; 24];
    nonce.copy_from_slice(&nonce_bytes);

    let derived = argon2id_derive_key(passphrase.as_bytes(), &salt, &file.params)?;
    let mut seed_bytes = open(&derived.0, &nonce, &ciphertext, &lockbox_aad(identity))?;

    if seed_bytes.len() != 32 {
        seed_bytes.zeroize();
        return Err(HavenmailError::CryptoError {
            reason: "decrypted payload is not a 32-byte seed".into(),
        });
    }
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&seed_bytes);
    seed_bytes.zeroize();

    let key = PrivateKey::from_seed(&seed);
    seed.zeroize();

    if key.public_key().to_hex() != file.public_key {
        return Err(HavenmailError::CryptoError {
            reason: "decrypted key does not match stored public key".into(),
        });
    }

    Ok(key)
}

// ---------------------------------------------------------------------------
// Sealed secrets (key tokens)
// ---------------------------------------------------------------------------

/// Seals an arbitrary small secret (e.g. an address-key token) in the
/// same lockbox format as a private key, with the identity bound via
/// AAD. The `public_key` field stays empty for secrets.
///
/// # Errors
///
/// - [`HavenmailError::CryptoError`] if derivation or sealing fails.
pub fn seal_secret(
    secret: &[u8],
    passphrase: &str,
    identity: &str,
    params: &Argon2Params,
) -> Result<String> {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; 24];
    OsRng.fill_bytes(&mut nonce);

    let derived = argon2id_derive_key(passphrase.as_bytes(), &salt, params)?;
    let ciphertext = seal(&derived.0, &nonce, secret, &lockbox_aad(identity))?;

    let file = LockboxFile {
        version: LOCKBOX_VERSION,
        public_key: String::new(),
        salt: BASE64.encode(salt),
        nonce: BASE64.encode(nonce),
        params: *params,
        ciphertext: BASE64.encode(ciphertext),
    };

    serde_json::to_string(&file).map_err(|e| HavenmailError::CryptoError {
        reason: format!("lockbox serialization failed: {e}"),
    })
}

/// Opens a secret sealed by [`seal_secret`]. Passphrase and identity
/// must both match the seal.
///
/// # Errors
///
/// - [`HavenmailError::CryptoError`] if the armored form is malformed
///   or authentication fails.
pub fn open_secret(armored: &str, passphrase: &str, identity: &str) -> Result<Vec<u8>> {
    let file: LockboxFile =
        serde_json::from_str(armored).map_err(|e| HavenmailError::CryptoError {
            reason: format!("malformed secret lockbox: {e}"),
        })?;

    if file.version != LOCKBOX_VERSION {
        return Err(HavenmailError::CryptoError {
            reason: format!("unsupported lockbox version {}", file.version),
        });
    }

    let salt = decode_b64(&file.salt, "salt")?;
    let nonce_bytes = decode_b64(&file.nonce, "nonce")?;
    let ciphertext = decode_b64(&file.ciphertext, "ciphertext")?;
    if nonce_bytes.len() != 24 {
        return Err(HavenmailError::CryptoError {
            reason: format!("expected 24 nonce bytes, got {}", nonce_bytes.len()),
        });
    }
    let mut nonce = [0u8; 24];
    nonce.copy_from_slice(&nonce_bytes);

    let derived = argon2id_derive_key(passphrase.as_bytes(), &salt, &file.params)?;
    open(&derived.0, &nonce, &ciphertext, &lockbox_aad(identity))
}

// ---------------------------------------------------------------------------
// Key salt and passphrase (initial setup)
// ---------------------------------------------------------------------------

/// Random key salt plus the key passphrase derived from the login
/// password. Every key in the account is subsequently exported under
/// this passphrase; the salt is stored server-side so future logins
/// can re-derive it.
pub struct KeySaltAndPassphrase {
    /// Base64 random salt, submitted to the server at setup.
    pub salt: String,
    /// Derived key passphrase (base64 of the Argon2id output).
    pub passphrase: String,
}

/// Generates a fresh key salt and derives the key passphrase.
///
/// # Errors
///
/// - [`HavenmailError::CryptoError`] if derivation fails.
pub fn generate_key_salt_and_passphrase(password: &str) -> Result<KeySaltAndPassphrase> {
    let mut salt = [0u8; KEY_SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let passphrase = derive_key_passphrase(password, &salt)?;
    Ok(KeySaltAndPassphrase {
        salt: BASE64.encode(salt),
        passphrase,
    })
}

/// Re-derives the key passphrase from a password and a stored salt.
pub fn derive_key_passphrase(password: &str, salt: &[u8]) -> Result<String> {
    let derived = argon2id_derive_key(password.as_bytes(), salt, &Argon2Params::default())?;
    Ok(BASE64.encode(derived.0))
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

/// Builds the AAD binding a lockbox to an identity.
fn lockbox_aad(identity: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(LOCKBOX_AAD_PREFIX.len() + identity.len());
    aad.extend_from_slice(LOCKBOX_AAD_PREFIX);
    aad.extend_from_slice(identity.as_bytes());
    aad
}

/// Seals plaintext with XChaCha20-Poly1305.
fn seal(key: &[u8; 32], nonce: &[u8; 24], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|e| HavenmailError::CryptoError {
            reason: format!("XChaCha20-Poly1305 encryption failed: {e}"),
        })
}

/// Opens ciphertext sealed by [`seal`].
fn open(key: &[u8; 32], nonce: &[u8; 24], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|e| HavenmailError::CryptoError {
            reason: format!("XChaCha20-Poly1305 decryption failed: {e}"),
        })
}

/// Decodes a base64 lockbox field.
fn decode_b64(value: &str, field: &str) -> Result<Vec<u8>> {
    BASE64.decode(value).map_err(|_| HavenmailError::CryptoError {
        reason: format!("invalid base64 in lockbox field '{field}'"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Light parameters suitable for fast unit tests.
    fn test_params() -> Argon2Params {
        Argon2Params {
            m_cost: 256, // 256 KiB — fast for testing
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn export_unlock_roundtrip() -> havenmail_types::Result<()> {
        let key = PrivateKey::from_seed(&[0x11; 32]);
        let armored = export_private_key(&key, "hunter2", "user@havenmail.test", &test_params())?;

        let unlocked = unlock_private_key(&armored, "hunter2", "user@havenmail.test")?;
        assert_eq!(unlocked.public_key(), key.public_key());
        Ok(())
    }

    #[test]
    fn wrong_passphrase_fails() -> havenmail_types::Result<()> {
        let key = PrivateKey::from_seed(&[0x22; 32]);
        let armored = export_private_key(&key, "right", "user@havenmail.test", &test_params())?;
        assert!(unlock_private_key(&armored, "wrong", "user@havenmail.test").is_err());
        Ok(())
    }

    #[test]
    fn wrong_identity_fails() -> havenmail_types::Result<()> {
        let key = PrivateKey::from_seed(&[0x33; 32]);
        let armored = export_private_key(&key, "pass", "alice@havenmail.test", &test_params())?;
        assert!(unlock_private_key(&armored, "pass", "bob@havenmail.test").is_err());
        Ok(())
    }

    #[test]
    fn tampered_ciphertext_fails() -> havenmail_types::Result<()> {
        let key = PrivateKey::from_seed(&[0x44; 32]);
        let armored = export_private_key(&key, "pass", "id", &test_params())?;
        let mut file: serde_json::Value = serde_json::from_str(&armored)
            .map_err(|e| HavenmailError::CryptoError { reason: e.to_string() })?;
        file["ciphertext"] = serde_json::Value::String(BASE64.encode([0u8; 48]));
        let tampered = file.to_string();
        assert!(unlock_private_key(&tampered, "pass", "id").is_err());
        Ok(())
    }

    #[test]
    fn unsupported_version_rejected() -> havenmail_types::Result<()> {
        let key = PrivateKey::from_seed(&[0x55; 32]);
        let armored = export_private_key(&key, "pass", "id", &test_params())?;
        let mut file: serde_json::Value = serde_json::from_str(&armored)
            .map_err(|e| HavenmailError::CryptoError { reason: e.to_string() })?;
        file["version"] = serde_json::Value::from(9);
        assert!(unlock_private_key(&file.to_string(), "pass", "id").is_err());
        Ok(())
    }

    #[test]
    fn malformed_lockbox_rejected() {
        assert!(unlock_private_key("not json", "pass", "id").is_err());
    }

    #[test]
    fn exports_are_salted() -> havenmail_types::Result<()> {
        let key = PrivateKey::from_seed(&[0x66; 32]);
        let a = export_private_key(&key, "pass", "id", &test_params())?;
        let b = export_private_key(&key, "pass", "id", &test_params())?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn key_passphrase_rederives_from_salt() -> havenmail_types::Result<()> {
        let salt = b"0123456789abcdef";
        let p1 = derive_key_passphrase("password", salt)?;
        let p2 = derive_key_passphrase("password", salt)?;
        assert_eq!(p1, p2);
        let other = derive_key_passphrase("different", salt)?;
        assert_ne!(p1, other);
        Ok(())
    }

    #[test]
    fn seal_open_secret_roundtrip() -> havenmail_types::Result<()> {
        let armored = seal_secret(b"token bytes", "pass", "alice@havenmail.test", &test_params())?;
        let opened = open_secret(&armored, "pass", "alice@havenmail.test")?;
        assert_eq!(opened, b"token bytes");
        assert!(open_secret(&armored, "wrong", "alice@havenmail.test").is_err());
        assert!(open_secret(&armored, "pass", "bob@havenmail.test").is_err());
        Ok(())
    }

    #[test]
    fn generated_salts_are_unique() -> havenmail_types::Result<()> {
        let a = generate_key_salt_and_passphrase("pw")?;
        let b = generate_key_salt_and_passphrase("pw")?;
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.passphrase, b.passphrase);
        Ok(())
    }
}
