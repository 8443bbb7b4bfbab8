//! Active key set resolution.
//!
//! The active key set is the ordered, role-annotated list of keys
//! currently valid for a scope. It is derived fresh on every pipeline
//! run and never persisted; the next resolution supersedes it.
//!
//! When a reference Signed Key List exists it is the source of truth
//! for order, primary flag, and capability flags. A key that decrypts
//! fine but does not appear in the reference list is **orphaned** and
//! excluded — resolving it back in would silently resurrect a key
//! that was deliberately removed.

use havenmail_crypto::key::{DecryptedKey, PrivateKey};
use havenmail_types::skl::SignedKeyList;
use havenmail_types::{Fingerprint, HavenmailError, KeyFlags, KeyId, KeyRecord, Result};

// ---------------------------------------------------------------------------
// ActiveKey
// ---------------------------------------------------------------------------

/// A currently valid key of a scope.
///
/// Pairs the server record identity with the decrypted private-key
/// handle and the role annotations that will appear in the next
/// Signed Key List.
#[derive(Clone)]
pub struct ActiveKey {
    /// Server identifier of the key.
    pub id: KeyId,
    /// Decrypted private-key handle.
    pub private_key: PrivateKey,
    /// Hex public-key fingerprint.
    pub fingerprint: Fingerprint,
    /// SHA-256 fingerprints of the key and its subkeys.
    pub sha256_fingerprints: Vec<String>,
    /// 1 for the scope's default key, 0 otherwise.
    pub primary: u8,
    /// Capability flags.
    pub flags: KeyFlags,
}

impl ActiveKey {
    /// Builds an active key from a decrypted handle, deriving both
    /// fingerprint forms fresh.
    pub fn from_private_key(id: KeyId, private_key: PrivateKey, primary: u8, flags: KeyFlags) -> Self {
        let fingerprint = private_key.fingerprint();
        let sha256_fingerprints = private_key.sha256_fingerprints();
        Self {
            id,
            private_key,
            fingerprint,
            sha256_fingerprints,
            primary,
            flags,
        }
    }

    /// Returns `true` if this is the scope's primary key.
    pub fn is_primary(&self) -> bool {
        self.primary == 1
    }
}

/// Primary flag for a key about to join `active`: 1 only if the set
/// has no primary yet.
pub fn primary_flag(active: &[ActiveKey]) -> u8 {
    if active.iter().any(ActiveKey::is_primary) {
        0
    } else {
        1
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Derives the active key set for a scope. Pure: no side effects.
///
/// # Algorithm
///
/// 1. Pair each [`KeyRecord`] with its decrypted material by id;
///    unmatched records and unmatched material are dropped.
/// 2. With a `reference` SKL, walk its entries in order: each entry
///    must have a decryptable counterpart
///    ([`HavenmailError::MissingActiveKeyMaterial`] otherwise, because
///    silently dropping it would publish an SKL that removes a key the
///    caller never asked to remove); decryptable keys absent from the
///    reference are excluded as orphaned.
/// 3. Without a reference, fall back to record order; the first
///    decryptable key becomes primary and record flags are carried
///    over (full capabilities when the record has none).
///
/// # Errors
///
/// - [`HavenmailError::MissingActiveKeyMaterial`] — see above.
/// - [`HavenmailError::ActiveKeySetInconsistent`] if `records` is
///   non-empty but no valid active key can be produced.
pub fn resolve_active_keys(
    reference: Option<&SignedKeyList>,
    records: &[KeyRecord],
    decrypted: &[DecryptedKey],
) -> Result<Vec<ActiveKey>> {
    let pairs: Vec<(&KeyRecord, &DecryptedKey)> = records
        .iter()
        .filter_map(|record| {
            decrypted
                .iter()
                .find(|key| key.id == record.id)
                .map(|key| (record, key))
        })
        .collect();

    let active = match reference {
        Some(skl) => resolve_from_reference(skl, &pairs)?,
        None => resolve_from_records(&pairs),
    };

    if !records.is_empty() && active.is_empty() {
        return Err(HavenmailError::ActiveKeySetInconsistent {
            reason: format!("{} key record(s) yielded no active key", records.len()),
        });
    }

    Ok(active)
}

/// Resolution against a reference SKL: the list dictates membership,
/// order, primary flag, and capability flags.
fn resolve_from_reference(
    reference: &SignedKeyList,
    pairs: &[(&KeyRecord, &DecryptedKey)],
) -> Result<Vec<ActiveKey>> {
    let entries = reference.parse_entries()?;

    let mut active = Vec::with_capacity(entries.len());
    for entry in &entries {
        let (record, key) = pairs
            .iter()
            .find(|(_, key)| key.private_key.fingerprint() == entry.fingerprint)
            .ok_or_else(|| HavenmailError::MissingActiveKeyMaterial {
                reason: format!(
                    "signed key list entry {} has no decrypted counterpart",
                    entry.fingerprint
                ),
            })?;
        debug_assert_eq!(record.id, key.id);

        active.push(ActiveKey::from_private_key(
            key.id.clone(),
            key.private_key.clone(),
            entry.primary,
            entry.flags,
        ));
    }

    Ok(active)
}

/// Fallback resolution for scopes without a Signed Key List yet
/// (new addresses, legacy accounts): record order, first decryptable
/// key is primary.
fn resolve_from_records(pairs: &[(&KeyRecord, &DecryptedKey)]) -> Vec<ActiveKey> {
    pairs
        .iter()
        .enumerate()
        .map(|(index, (record, key))| {
            let flags = if record.flags.is_empty() {
                KeyFlags::default()
            } else {
                record.flags
            };
            let primary = u8::from(index == 0);
            ActiveKey::from_private_key(key.id.clone(), key.private_key.clone(), primary, flags)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
