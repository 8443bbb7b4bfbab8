//! Single-key mutation pipelines.
//!
//! All four mutations share the same commit-or-nothing shape:
//!
//! 1. Resolve the active key set from the server records and the
//!    scope's last Signed Key List.
//! 2. Apply the mutation to a candidate copy of the set.
//! 3. Build and sign the candidate's Signed Key List.
//! 4. Gate the candidate through the Key Transparency audit.
//! 5. Submit key change and list together.
//!
//! A failure at any step aborts before submission, leaving server
//! state untouched. The returned [`KtAdvisory`] carries the audit's
//! informational message; it never blocks the mutation it came from.

use havenmail_crypto::key::DecryptedKey;
use havenmail_crypto::lockbox::{export_private_key, Argon2Params};
use havenmail_skl::active::{primary_flag, resolve_active_keys, ActiveKey};
use havenmail_skl::audit::{audit_candidate, KtContext, KtVerifier};
use havenmail_skl::builder::build_signed_key_list;
use havenmail_types::{
    AddressRecord, HavenmailError, KeyFlags, KeyId, KtAdvisory, MemberVisibility, Result, UserInfo,
};
use tracing::{debug, info};

use crate::api::{
    ActivateKeyRequest, DeleteKeyRequest, KeyApi, SetKeyFlagsRequest, SetPrimaryKeyRequest,
};
use crate::record_flags;

// ---------------------------------------------------------------------------
// Baseline resolution
// ---------------------------------------------------------------------------

/// Resolves the address's current active key set.
fn resolve_baseline(address: &AddressRecord, decrypted: &[DecryptedKey]) -> Result<Vec<ActiveKey>> {
    let reference = address
        .signed_key_list
        .as_ref()
        .map(|info| info.to_signed_key_list());
    resolve_active_keys(reference.as_ref(), &address.keys, decrypted)
}

// ---------------------------------------------------------------------------
// Set primary
// ---------------------------------------------------------------------------

/// Makes `id` the address's primary key.
///
/// The target moves to the front of the set; the relative order of the
/// remaining keys is preserved. Exactly one key carries the primary
/// flag afterwards.
///
/// # Errors
///
/// - [`HavenmailError::KeyNotFound`] if `id` is not in the active set.
/// - Resolution, build, audit, and submission errors propagate; none
///   of them leaves a partial change behind.
pub async fn set_primary_key<A, V>(
    api: &A,
    address: &AddressRecord,
    decrypted: &[DecryptedKey],
    id: &KeyId,
    kt: Option<&KtContext<V>>,
) -> Result<KtAdvisory>
where
    A: KeyApi + Sync,
    V: KtVerifier + Sync,
{
    let baseline = resolve_baseline(address, decrypted)?;
    if !baseline.iter().any(|key| &key.id == id) {
        return Err(HavenmailError::KeyNotFound { id: id.clone() });
    }

    let mut candidate: Vec<ActiveKey> = baseline
        .into_iter()
        .map(|mut key| {
            key.primary = u8::from(&key.id == id);
            key
        })
        .collect();
    // Stable sort: the new primary moves to the front, everything else
    // keeps its relative order.
    candidate.sort_by_key(|key| std::cmp::Reverse(key.primary));

    let skl = build_signed_key_list(&candidate)?;
    let scope = address.scope();
    let message = audit_candidate(&scope, &skl, kt)
        .await
        .into_advisory("set primary key")?;

    api.set_primary_key(SetPrimaryKeyRequest {
        id: id.clone(),
        signed_key_list: skl,
    })
    .await?;

    info!(scope = %scope, key = %id, "primary key reassigned");
    Ok(KtAdvisory {
        scope_id: address.id.clone(),
        message,
    })
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// Deletes `id` from the address.
///
/// The primary key can never be deleted; reassign primary first. A key
/// the active set does not contain (already removed, or undecryptable
/// and thus excluded) still submits: the server drops its record and
/// the unchanged list is republished.
///
/// # Errors
///
/// - [`HavenmailError::CannotDeletePrimaryKey`] if `id` is the current
///   primary.
pub async fn delete_key<A, V>(
    api: &A,
    address: &AddressRecord,
    decrypted: &[DecryptedKey],
    id: &KeyId,
    kt: Option<&KtContext<V>>,
) -> Result<KtAdvisory>
where
    A: KeyApi + Sync,
    V: KtVerifier + Sync,
{
    let baseline = resolve_baseline(address, decrypted)?;
    if let Some(target) = baseline.iter().find(|key| &key.id == id) {
        if target.is_primary() {
            return Err(HavenmailError::CannotDeletePrimaryKey { id: id.clone() });
        }
    }

    let candidate: Vec<ActiveKey> = baseline
        .into_iter()
        .filter(|key| &key.id != id)
        .collect();

    let skl = build_signed_key_list(&candidate)?;
    let scope = address.scope();
    let message = audit_candidate(&scope, &skl, kt)
        .await
        .into_advisory("delete key")?;

    api.delete_key(DeleteKeyRequest {
        id: id.clone(),
        signed_key_list: skl,
    })
    .await?;

    info!(scope = %scope, key = %id, "key deleted");
    Ok(KtAdvisory {
        scope_id: address.id.clone(),
        message,
    })
}

// ---------------------------------------------------------------------------
// Set flags
// ---------------------------------------------------------------------------

/// Replaces the capability flags of `id`.
///
/// Membership, order, and primary assignment are untouched. Flagging a
/// key absent from the active set republishes the unchanged list.
pub async fn set_key_flags<A, V>(
    api: &A,
    address: &AddressRecord,
    decrypted: &[DecryptedKey],
    id: &KeyId,
    flags: KeyFlags,
    kt: Option<&KtContext<V>>,
) -> Result<KtAdvisory>
where
    A: KeyApi + Sync,
    V: KtVerifier + Sync,
{
    let baseline = resolve_baseline(address, decrypted)?;
    let candidate: Vec<ActiveKey> = baseline
        .into_iter()
        .map(|mut key| {
            if &key.id == id {
                key.flags = flags;
            }
            key
        })
        .collect();

    let skl = build_signed_key_list(&candidate)?;
    let scope = address.scope();
    let message = audit_candidate(&scope, &skl, kt)
        .await
        .into_advisory("change key flags")?;

    api.set_key_flags(SetKeyFlagsRequest {
        id: id.clone(),
        flags,
        signed_key_list: skl,
    })
    .await?;

    info!(scope = %scope, key = %id, flags = %flags, "key flags changed");
    Ok(KtAdvisory {
        scope_id: address.id.clone(),
        message,
    })
}

// ---------------------------------------------------------------------------
// Member key activation
// ---------------------------------------------------------------------------

/// Returns the addresses of `user` that still hold keys awaiting
/// activation.
///
/// Only members with admin-readable mailboxes activate keys, and never
/// from a session signed in through the organization key.
pub fn addresses_with_keys_to_activate<'a>(
    user: &UserInfo,
    addresses: &'a [AddressRecord],
) -> Vec<&'a AddressRecord> {
    if user.member_visibility != MemberVisibility::Readable || user.has_organization_key {
        return Vec::new();
    }
    addresses
        .iter()
        .filter(|address| address.keys.iter().any(|key| key.activation.is_some()))
        .collect()
}

/// Activates every pending admin-provisioned key of one address.
///
/// Each key is re-encrypted under the account key password, joined
/// into a candidate set, gated, and submitted with its own Signed Key
/// List; the baseline advances after each accepted submission so later
/// activations build on earlier ones. Records without an activation
/// token or without decrypted material are skipped.
///
/// # Errors
///
/// - [`HavenmailError::CryptoError`] if `key_password` is empty while
///   keys are pending.
pub async fn activate_address_keys<A, V>(
    api: &A,
    address: &AddressRecord,
    decrypted: &[DecryptedKey],
    key_password: &str,
    kt: Option<&KtContext<V>>,
) -> Result<KtAdvisory>
where
    A: KeyApi + Sync,
    V: KtVerifier + Sync,
{
    let pending: Vec<_> = address
        .keys
        .iter()
        .filter(|record| record.activation.is_some())
        .collect();
    if pending.is_empty() {
        return Ok(KtAdvisory {
            scope_id: address.id.clone(),
            message: String::new(),
        });
    }
    if key_password.is_empty() {
        return Err(HavenmailError::CryptoError {
            reason: "no key password available to activate member keys".into(),
        });
    }

    let mut baseline = resolve_baseline(address, decrypted)?;
    let scope = address.scope();
    let mut last_message = String::new();

    for record in pending {
        let Some(key) = decrypted.iter().find(|key| key.id == record.id) else {
            debug!(scope = %scope, key = %record.id, "pending key has no decrypted material, skipping");
            continue;
        };

        let armored = export_private_key(
            &key.private_key,
            key_password,
            &address.email,
            &Argon2Params::default(),
        )?;

        let mut candidate: Vec<ActiveKey> = baseline
            .iter()
            .filter(|active| active.id != record.id)
            .cloned()
            .collect();
        candidate.push(ActiveKey::from_private_key(
            record.id.clone(),
            key.private_key.clone(),
            primary_flag(&candidate),
            record_flags(record),
        ));

        let skl = build_signed_key_list(&candidate)?;
        let message = audit_candidate(&scope, &skl, kt)
            .await
            .into_advisory("activate key")?;

        api.activate_key(ActivateKeyRequest {
            id: record.id.clone(),
            private_key: armored,
            signed_key_list: skl,
        })
        .await?;

        info!(scope = %scope, key = %record.id, "member key activated");
        baseline = candidate;
        if !message.is_empty() {
            last_message = message;
        }
    }

    Ok(KtAdvisory {
        scope_id: address.id.clone(),
        message: last_message,
    })
}
