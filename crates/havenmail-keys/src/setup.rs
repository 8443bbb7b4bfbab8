//! Initial account key bootstrap.
//!
//! Runs exactly once per account: derives the key passphrase from the
//! login password, generates the account key plus one key per address,
//! builds each address's initial single-key Signed Key List, and
//! submits the whole bundle in a single password-authenticated
//! request. Nothing is persisted client-side until the server accepts.
//!
//! Two export formats exist:
//!
//! - [`SetupVersion::V1`] exports every address key directly under the
//!   derived key passphrase;
//! - [`SetupVersion::V2`] exports each address key under its own
//!   random token, seals the token under the key passphrase, and signs
//!   the sealed token with the account key so its origin can be
//!   verified before use.
//!
//! The per-address transparency audit runs after submission and is
//! advisory only: setup itself is already committed, so a failing
//! audit surfaces a warning instead of aborting.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use havenmail_crypto::key::{PrivateKey, PublicKey};
use havenmail_crypto::lockbox::{
    export_private_key, generate_key_salt_and_passphrase, seal_secret, Argon2Params,
};
use havenmail_skl::active::ActiveKey;
use havenmail_skl::audit::{audit_candidate, AuditDecision, KtContext, KtVerifier};
use havenmail_skl::builder::build_signed_key_list;
use havenmail_types::skl::SignedKeyList;
use havenmail_types::{
    AddressRecord, HavenmailError, KeyFlags, KeyId, KeyScope, KtAdvisory, Result,
};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, warn};

use crate::api::{AddressKeyPayload, KeyApi, SetupKeysRequest, SrpProver};
use crate::reactivation::ACCOUNT_KEY_IDENTITY;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Domain-separation prefix for the account-key signature over an
/// address-key token.
pub const KEY_TOKEN_SIGNING_PREFIX: &[u8] = b"havenmail-key-token:v1:";

/// Byte length of a random address-key token.
const KEY_TOKEN_LEN: usize = 32;

// ---------------------------------------------------------------------------
// SetupVersion / SetupOutcome
// ---------------------------------------------------------------------------

/// Address-key export format used during setup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetupVersion {
    /// Address keys exported directly under the key passphrase.
    V1,
    /// Address keys exported under per-key random tokens, the tokens
    /// sealed under the key passphrase and signed by the account key.
    V2,
}

/// Everything the caller needs after a successful setup.
pub struct SetupOutcome {
    /// The derived key passphrase; unlocks every key created here.
    pub key_password: String,
    /// Base64 random salt the passphrase was derived with, as
    /// submitted to the server.
    pub key_salt: String,
    /// Public half of the new account key.
    pub account_public_key: PublicKey,
    /// Post-submission audit advisories, one per address with a
    /// non-empty message.
    pub advisories: Vec<KtAdvisory>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Bootstraps the account's entire key material.
///
/// # Process
///
/// 1. Generate a key salt and derive the key passphrase from
///    `password`.
/// 2. Generate the account key, exported under the fixed account
///    identity.
/// 3. Per address: generate a key, export it per `version`, and build
///    its single-entry Signed Key List.
/// 4. Prove `password` through `srp` and submit the bundle.
/// 5. Audit each address's new list; failures become advisories.
///
/// # Errors
///
/// - [`HavenmailError::SetupRequiresAddress`] if `addresses` is empty.
/// - Crypto, proof, and submission errors propagate; the account ends
///   up with either all keys or none.
pub async fn setup_account_keys<A, S, V>(
    api: &A,
    srp: &S,
    addresses: &[AddressRecord],
    password: &str,
    version: SetupVersion,
    kt: Option<&KtContext<V>>,
) -> Result<SetupOutcome>
where
    A: KeyApi + Sync,
    S: SrpProver + Sync,
    V: KtVerifier + Sync,
{
    if addresses.is_empty() {
        return Err(HavenmailError::SetupRequiresAddress);
    }

    let salted = generate_key_salt_and_passphrase(password)?;
    let params = Argon2Params::default();

    let account_key = PrivateKey::generate();
    let primary_key = export_private_key(
        &account_key,
        &salted.passphrase,
        ACCOUNT_KEY_IDENTITY,
        &params,
    )?;

    let mut address_keys = Vec::with_capacity(addresses.len());
    let mut built_lists: Vec<(KeyScope, SignedKeyList)> = Vec::with_capacity(addresses.len());

    for address in addresses {
        let key = PrivateKey::generate();

        let (armored, token, signature) = match version {
            SetupVersion::V1 => {
                let armored =
                    export_private_key(&key, &salted.passphrase, &address.email, &params)?;
                (armored, None, None)
            }
            SetupVersion::V2 => {
                let token = generate_key_token();
                let armored = export_private_key(&key, &token, &address.email, &params)?;
                let sealed =
                    seal_secret(token.as_bytes(), &salted.passphrase, &address.email, &params)?;
                let signature = account_key
                    .sign(&token_signing_message(token.as_bytes()))
                    .to_hex();
                (armored, Some(sealed), Some(signature))
            }
        };

        // No server id exists before submission; the SKL only carries
        // fingerprints, so the address id stands in.
        let active = vec![ActiveKey::from_private_key(
            KeyId::new(address.id.as_str()),
            key,
            1,
            KeyFlags::default(),
        )];
        let skl = build_signed_key_list(&active)?;
        built_lists.push((address.scope(), skl.clone()));

        address_keys.push(AddressKeyPayload {
            address_id: address.id.clone(),
            private_key: armored,
            token,
            signature,
            signed_key_list: skl,
        });
    }

    let proof = srp.prove(password).await?;
    api.setup_keys(
        proof,
        SetupKeysRequest {
            key_salt: salted.salt.clone(),
            primary_key,
            address_keys,
        },
    )
    .await?;
    info!(addresses = addresses.len(), "account keys set up");

    let mut advisories = Vec::new();
    for (scope, skl) in &built_lists {
        let message = match audit_candidate(scope, skl, kt).await {
            AuditDecision::Ok { message } => message,
            AuditDecision::Failed { error } => {
                warn!(scope = %scope, %error, "post-setup audit failed");
                format!("key transparency audit failed: {error}")
            }
        };
        if let (Some(id), false) = (scope.address_id(), message.is_empty()) {
            advisories.push(KtAdvisory {
                scope_id: id.clone(),
                message,
            });
        }
    }

    Ok(SetupOutcome {
        key_password: salted.passphrase,
        key_salt: salted.salt,
        account_public_key: account_key.public_key(),
        advisories,
    })
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

/// Generates a random base64 address-key token.
fn generate_key_token() -> String {
    let mut bytes = [0u8; KEY_TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

/// Builds the domain-prefixed message the account key signs over a
/// token.
fn token_signing_message(token: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(KEY_TOKEN_SIGNING_PREFIX.len() + token.len());
    message.extend_from_slice(KEY_TOKEN_SIGNING_PREFIX);
    message.extend_from_slice(token);
    message
}
