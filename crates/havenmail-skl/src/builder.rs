//! Canonical Signed Key List construction.
//!
//! `Data` is the JSON serialization of the entry array. Field order is
//! declaration order of
//! [`SignedKeyListEntry`](havenmail_types::skl::SignedKeyListEntry)
//! and `serde_json` emits no insignificant whitespace, so building the
//! same active key set twice reproduces byte-identical `Data`.
//!
//! The signature is detached and domain-separated:
//!
//! ```text
//! message   = b"havenmail-skl:v1:" || data
//! Signature = hex(Ed25519.sign(signing_key, message))
//! ```
//!
//! The `v1` in the prefix tags the canonical format version; a future
//! encoding change bumps the prefix, which invalidates cross-version
//! signature confusion by construction. The signing key is drawn from
//! the listed set itself: the primary key when it is signing-capable,
//! otherwise the first signing-capable key in list order.

use havenmail_crypto::key::{verify, PrivateKey, PublicKey, Signature};
use havenmail_types::skl::{SignedKeyList, SignedKeyListEntry};
use havenmail_types::{HavenmailError, KeyFlags, Result};

use crate::active::ActiveKey;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Domain-separation prefix for Signed Key List signatures. The
/// trailing version tag covers the canonical `Data` encoding.
pub const SKL_SIGNING_PREFIX: &[u8] = b"havenmail-skl:v1:";

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Serializes an active key set into a canonical, signed manifest.
///
/// One entry per active key, same order. Exactly one entry carries
/// `Primary = 1` when the input invariant (at most one primary) holds
/// and the set is non-empty.
///
/// # Errors
///
/// - [`HavenmailError::NoSigningKeyAvailable`] if the set is empty or
///   contains no signing-capable key.
/// - [`HavenmailError::SerializationError`] if any key lacks a
///   fingerprint or JSON encoding fails.
pub fn build_signed_key_list(active: &[ActiveKey]) -> Result<SignedKeyList> {
    let signer = signing_key_for(active)?;

    let entries = active
        .iter()
        .map(|key| {
            if key.fingerprint.is_empty() {
                return Err(HavenmailError::SerializationError {
                    reason: format!("active key {} has no fingerprint", key.id),
                });
            }
            Ok(SignedKeyListEntry {
                primary: key.primary,
                flags: key.flags,
                fingerprint: key.fingerprint.clone(),
                sha256_fingerprints: key.sha256_fingerprints.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let data = serde_json::to_string(&entries).map_err(|e| HavenmailError::SerializationError {
        reason: format!("signed key list encoding failed: {e}"),
    })?;

    let signature = signer.sign(&signing_message(data.as_bytes())).to_hex();

    Ok(SignedKeyList { data, signature })
}

/// Verifies a Signed Key List signature against a public key.
///
/// # Errors
///
/// Returns [`HavenmailError::CryptoError`] if the signature is
/// malformed or does not verify.
pub fn verify_signed_key_list(skl: &SignedKeyList, signer: &PublicKey) -> Result<()> {
    let signature = Signature::from_hex(&skl.signature)?;
    verify(signer, &signing_message(skl.data.as_bytes()), &signature)
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

/// Builds the domain-prefixed byte message covered by the signature.
fn signing_message(data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(SKL_SIGNING_PREFIX.len() + data.len());
    message.extend_from_slice(SKL_SIGNING_PREFIX);
    message.extend_from_slice(data);
    message
}

/// Selects the key that signs the manifest.
///
/// A key is signing-capable when its flags include `NOT_COMPROMISED`;
/// a compromised key must not anchor trust for the whole list.
fn signing_key_for(active: &[ActiveKey]) -> Result<&PrivateKey> {
    if let Some(primary) = active.iter().find(|key| key.is_primary()) {
        if primary.flags.contains(KeyFlags::NOT_COMPROMISED) {
            return Ok(&primary.private_key);
        }
    }
    active
        .iter()
        .find(|key| key.flags.contains(KeyFlags::NOT_COMPROMISED))
        .map(|key| &key.private_key)
        .ok_or(HavenmailError::NoSigningKeyAvailable)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use havenmail_types::KeyId;

    fn active_key(id: &str, seed: u8, primary: u8, flags: KeyFlags) -> ActiveKey {
        ActiveKey::from_private_key(
            KeyId::new(id),
            PrivateKey::from_seed(&[seed; 32]),
            primary,
            flags,
        )
    }

    #[test]
    fn building_twice_is_byte_identical() -> Result<()> {
        let active = vec![
            active_key("k1", 1, 1, KeyFlags::default()),
            active_key("k2", 2, 0, KeyFlags::NOT_OBSOLETE | KeyFlags::NOT_COMPROMISED),
        ];
        let a = build_signed_key_list(&active)?;
        let b = build_signed_key_list(&active)?;
        assert_eq!(a.data, b.data);
        assert_eq!(a.signature, b.signature);
        Ok(())
    }

    #[test]
    fn entries_mirror_active_set_order() -> Result<()> {
        let active = vec![
            active_key("k2", 2, 1, KeyFlags::default()),
            active_key("k1", 1, 0, KeyFlags::default()),
        ];
        let skl = build_signed_key_list(&active)?;
        let entries = skl.parse_entries()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].fingerprint, active[0].fingerprint);
        assert_eq!(entries[0].primary, 1);
        assert_eq!(entries[1].fingerprint, active[1].fingerprint);
        assert_eq!(entries[1].primary, 0);
        Ok(())
    }

    #[test]
    fn signature_verifies_with_primary_key() -> Result<()> {
        let active = vec![
            active_key("k1", 1, 1, KeyFlags::default()),
            active_key("k2", 2, 0, KeyFlags::default()),
        ];
        let skl = build_signed_key_list(&active)?;
        verify_signed_key_list(&skl, &active[0].private_key.public_key())?;
        // Non-primary key did not sign.
        assert!(verify_signed_key_list(&skl, &active[1].private_key.public_key()).is_err());
        Ok(())
    }

    #[test]
    fn compromised_primary_delegates_signing() -> Result<()> {
        let active = vec![
            active_key("k1", 1, 1, KeyFlags::empty()),
            active_key("k2", 2, 0, KeyFlags::NOT_COMPROMISED),
        ];
        let skl = build_signed_key_list(&active)?;
        verify_signed_key_list(&skl, &active[1].private_key.public_key())?;
        Ok(())
    }

    #[test]
    fn empty_set_has_no_signing_key() {
        assert!(matches!(
            build_signed_key_list(&[]),
            Err(HavenmailError::NoSigningKeyAvailable)
        ));
    }

    #[test]
    fn all_compromised_has_no_signing_key() {
        let active = vec![
            active_key("k1", 1, 1, KeyFlags::empty()),
            active_key("k2", 2, 0, KeyFlags::NOT_OBSOLETE),
        ];
        assert!(matches!(
            build_signed_key_list(&active),
            Err(HavenmailError::NoSigningKeyAvailable)
        ));
    }

    #[test]
    fn missing_fingerprint_is_serialization_error() {
        let mut key = active_key("k1", 1, 1, KeyFlags::default());
        key.fingerprint = havenmail_types::Fingerprint::new("");
        assert!(matches!(
            build_signed_key_list(&[key]),
            Err(HavenmailError::SerializationError { .. })
        ));
    }

    #[test]
    fn tampered_data_fails_verification() -> Result<()> {
        let active = vec![active_key("k1", 1, 1, KeyFlags::default())];
        let mut skl = build_signed_key_list(&active)?;
        skl.data.push(' ');
        assert!(verify_signed_key_list(&skl, &active[0].private_key.public_key()).is_err());
        Ok(())
    }
}
