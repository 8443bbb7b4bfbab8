//! Batched key reactivation with two-level failure isolation.
//!
//! Reactivation restores keys whose passphrase was lost and later
//! recovered (password reset, imported backup). Keys arrive grouped
//! per scope; the batch runs sequentially and every key reports its
//! own outcome through a callback instead of aborting the batch:
//!
//! - **record level** — if a scope's baseline cannot even be resolved,
//!   every key of that scope fails with the same
//!   [`ReactivationError::Record`] and processing moves to the next
//!   scope;
//! - **key level** — a single key's export, audit, or submission
//!   failure marks only that key ([`ReactivationError::Key`]); the
//!   scope's remaining keys still run against the unchanged baseline.
//!
//! After each accepted submission the scope's baseline advances, so
//! later keys of the same scope build their Signed Key List on top of
//! earlier successes.

use havenmail_crypto::key::{DecryptedKey, PrivateKey};
use havenmail_crypto::lockbox::{export_private_key, Argon2Params};
use havenmail_skl::active::{primary_flag, resolve_active_keys, ActiveKey};
use havenmail_skl::audit::{audit_candidate, KtContext, KtVerifier};
use havenmail_skl::builder::build_signed_key_list;
use havenmail_types::skl::SignedKeyList;
use havenmail_types::{KeyRecord, KeyScope, KtAdvisory};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{KeyApi, ReactivateKeyRequest};
use crate::record_flags;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Identity string account-scoped keys are bound to when exported.
/// Deliberately not a routable address.
pub const ACCOUNT_KEY_IDENTITY: &str = "not-for-email-use@havenmail.invalid";

// ---------------------------------------------------------------------------
// ReactivationError
// ---------------------------------------------------------------------------

/// Per-key failure reported through the reactivation callback.
///
/// Cloneable so a record-level failure can be delivered to every key
/// of the record.
#[derive(Clone, Debug, Error)]
pub enum ReactivationError {
    /// The whole record failed before any key was attempted.
    #[error("record reactivation failed: {reason}")]
    Record {
        /// Why the record's baseline could not be established.
        reason: String,
    },
    /// This key alone failed; other keys of the record were unaffected.
    #[error("key reactivation failed: {reason}")]
    Key {
        /// Why this key could not be reactivated.
        reason: String,
    },
}

/// Callback outcome type: `Ok` on success, the isolated error otherwise.
pub type ReactivationOutcome = std::result::Result<(), ReactivationError>;

// ---------------------------------------------------------------------------
// Batch input
// ---------------------------------------------------------------------------

/// One key to reactivate, with the caller's correlation id.
pub struct KeyReactivationData {
    /// Caller-side identifier echoed back through the callback.
    pub local_id: String,
    /// The inactive server record.
    pub record: KeyRecord,
    /// Recovered private material, if decryption succeeded upstream.
    pub private_key: Option<PrivateKey>,
}

/// All keys to reactivate for one scope, plus the state the scope's
/// baseline resolves from.
pub struct KeyReactivationRecord {
    /// The scope the keys belong to.
    pub scope: KeyScope,
    /// The scope's last accepted Signed Key List, if any.
    pub reference: Option<SignedKeyList>,
    /// All currently active server key records of the scope.
    pub key_records: Vec<KeyRecord>,
    /// Decrypted material of the currently active keys.
    pub decrypted: Vec<DecryptedKey>,
    /// The inactive keys to bring back.
    pub keys: Vec<KeyReactivationData>,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Runs a reactivation batch sequentially.
///
/// Never returns an error: every failure is scoped to a record or a
/// key and reported through `on_reactivation(local_id, outcome)`. One
/// advisory is returned per address-scope record whose baseline
/// resolved, carrying the last audit message (empty when the audit had
/// nothing to say).
pub async fn reactivate_key_records<A, V, F>(
    api: &A,
    records: &[KeyReactivationRecord],
    key_password: &str,
    on_reactivation: &mut F,
    kt: Option<&KtContext<V>>,
) -> Vec<KtAdvisory>
where
    A: KeyApi + Sync,
    V: KtVerifier + Sync,
    F: FnMut(&str, ReactivationOutcome),
{
    let mut advisories = Vec::new();

    for record in records {
        let baseline = match record_baseline(record, key_password) {
            Ok(baseline) => baseline,
            Err(error) => {
                warn!(scope = %record.scope, %error, "reactivation record failed");
                for key in &record.keys {
                    on_reactivation(&key.local_id, Err(error.clone()));
                }
                continue;
            }
        };

        if let Some(advisory) =
            reactivate_record(api, record, baseline, key_password, on_reactivation, kt).await
        {
            advisories.push(advisory);
        }
    }

    advisories
}

/// Establishes a record's baseline, mapping any failure to the shared
/// record-level error.
fn record_baseline(
    record: &KeyReactivationRecord,
    key_password: &str,
) -> std::result::Result<Vec<ActiveKey>, ReactivationError> {
    if key_password.is_empty() {
        return Err(ReactivationError::Record {
            reason: "no key password available".into(),
        });
    }
    resolve_active_keys(
        record.reference.as_ref(),
        &record.key_records,
        &record.decrypted,
    )
    .map_err(|e| ReactivationError::Record {
        reason: e.to_string(),
    })
}

/// Reactivates one record's keys against an established baseline.
async fn reactivate_record<A, V, F>(
    api: &A,
    record: &KeyReactivationRecord,
    mut baseline: Vec<ActiveKey>,
    key_password: &str,
    on_reactivation: &mut F,
    kt: Option<&KtContext<V>>,
) -> Option<KtAdvisory>
where
    A: KeyApi + Sync,
    V: KtVerifier + Sync,
    F: FnMut(&str, ReactivationOutcome),
{
    let mut last_message = String::new();

    for key in &record.keys {
        match reactivate_one(api, record, &mut baseline, key, key_password, kt).await {
            Ok(message) => {
                info!(scope = %record.scope, key = %key.record.id, "key reactivated");
                if !message.is_empty() {
                    last_message = message;
                }
                on_reactivation(&key.local_id, Ok(()));
            }
            Err(error) => {
                warn!(scope = %record.scope, key = %key.record.id, %error, "key reactivation failed");
                on_reactivation(&key.local_id, Err(error));
            }
        }
    }

    record.scope.address_id().map(|id| KtAdvisory {
        scope_id: id.clone(),
        message: last_message,
    })
}

/// Reactivates a single key. On success the baseline is advanced to
/// include it; on error the baseline is left untouched.
async fn reactivate_one<A, V>(
    api: &A,
    record: &KeyReactivationRecord,
    baseline: &mut Vec<ActiveKey>,
    key: &KeyReactivationData,
    key_password: &str,
    kt: Option<&KtContext<V>>,
) -> std::result::Result<String, ReactivationError>
where
    A: KeyApi + Sync,
    V: KtVerifier + Sync,
{
    let private_key = key.private_key.as_ref().ok_or(ReactivationError::Key {
        reason: "no decrypted material recovered for this key".into(),
    })?;

    let identity = match &record.scope {
        KeyScope::Address { email, .. } => email.as_str(),
        KeyScope::Account => ACCOUNT_KEY_IDENTITY,
    };
    let armored = export_private_key(private_key, key_password, identity, &Argon2Params::default())
        .map_err(key_error)?;

    let mut candidate: Vec<ActiveKey> = baseline
        .iter()
        .filter(|active| active.id != key.record.id)
        .cloned()
        .collect();
    candidate.push(ActiveKey::from_private_key(
        key.record.id.clone(),
        private_key.clone(),
        primary_flag(&candidate),
        record_flags(&key.record),
    ));

    // Account keys have no Signed Key List; only address scopes build
    // and gate one.
    let (skl, message) = match &record.scope {
        KeyScope::Address { .. } => {
            let skl = build_signed_key_list(&candidate).map_err(key_error)?;
            let message = audit_candidate(&record.scope, &skl, kt)
                .await
                .into_advisory("reactivate key")
                .map_err(key_error)?;
            (Some(skl), message)
        }
        KeyScope::Account => (None, String::new()),
    };

    api.reactivate_key(ReactivateKeyRequest {
        id: key.record.id.clone(),
        private_key: armored,
        signed_key_list: skl,
    })
    .await
    .map_err(key_error)?;

    *baseline = candidate;
    Ok(message)
}

/// Maps a pipeline error to the key-level isolation error.
fn key_error(error: havenmail_types::HavenmailError) -> ReactivationError {
    ReactivationError::Key {
        reason: error.to_string(),
    }
}
