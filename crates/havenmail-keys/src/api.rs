//! External capability contracts.
//!
//! The pipelines never speak to the network themselves; they submit
//! through the [`KeyApi`] trait and authenticate initial setup through
//! the [`SrpProver`] trait. Implementations own transport, retry, and
//! timeout policy. Request structs mirror the server's wire schema
//! (PascalCase field names, optional fields omitted when absent).

use async_trait::async_trait;
use havenmail_types::skl::SignedKeyList;
use havenmail_types::{AddressId, KeyFlags, KeyId, Result};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Activates an admin-provisioned member key.
#[derive(Clone, Debug, Serialize)]
pub struct ActivateKeyRequest {
    /// Key being activated.
    #[serde(rename = "ID")]
    pub id: KeyId,
    /// Armored private key re-encrypted under the account passphrase.
    #[serde(rename = "PrivateKey")]
    pub private_key: String,
    /// Manifest of the post-activation active key set.
    #[serde(rename = "SignedKeyList")]
    pub signed_key_list: SignedKeyList,
}

/// Reassigns the scope's primary key.
#[derive(Clone, Debug, Serialize)]
pub struct SetPrimaryKeyRequest {
    /// Key becoming primary.
    #[serde(rename = "ID")]
    pub id: KeyId,
    /// Manifest with the primary flag reassigned.
    #[serde(rename = "SignedKeyList")]
    pub signed_key_list: SignedKeyList,
}

/// Deletes a non-primary key.
#[derive(Clone, Debug, Serialize)]
pub struct DeleteKeyRequest {
    /// Key being removed.
    #[serde(rename = "ID")]
    pub id: KeyId,
    /// Manifest without the removed key.
    #[serde(rename = "SignedKeyList")]
    pub signed_key_list: SignedKeyList,
}

/// Replaces a key's capability flags.
#[derive(Clone, Debug, Serialize)]
pub struct SetKeyFlagsRequest {
    /// Key whose flags change.
    #[serde(rename = "ID")]
    pub id: KeyId,
    /// The new flags.
    #[serde(rename = "Flags")]
    pub flags: KeyFlags,
    /// Manifest with the flags replaced.
    #[serde(rename = "SignedKeyList")]
    pub signed_key_list: SignedKeyList,
}

/// Re-enables a previously deactivated key.
#[derive(Clone, Debug, Serialize)]
pub struct ReactivateKeyRequest {
    /// Key being reactivated.
    #[serde(rename = "ID")]
    pub id: KeyId,
    /// Armored private key re-encrypted under the current passphrase.
    #[serde(rename = "PrivateKey")]
    pub private_key: String,
    /// Manifest including the reactivated key. Absent for
    /// account-scope keys, which no address SKL tracks.
    #[serde(rename = "SignedKeyList", skip_serializing_if = "Option::is_none")]
    pub signed_key_list: Option<SignedKeyList>,
}

/// One address's freshly generated key inside a setup request.
#[derive(Clone, Debug, Serialize)]
pub struct AddressKeyPayload {
    /// Address the key belongs to.
    #[serde(rename = "AddressID")]
    pub address_id: AddressId,
    /// Armored private key.
    #[serde(rename = "PrivateKey")]
    pub private_key: String,
    /// Sealed key token (migrated-key setup only).
    #[serde(rename = "Token", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Detached account-key signature binding the token to the
    /// address (migrated-key setup only).
    #[serde(rename = "Signature", skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Manifest of the address's initial single-key active set.
    #[serde(rename = "SignedKeyList")]
    pub signed_key_list: SignedKeyList,
}

/// Bootstrap request creating the account key and all address keys.
#[derive(Clone, Debug, Serialize)]
pub struct SetupKeysRequest {
    /// Base64 random salt the key passphrase was derived with.
    #[serde(rename = "KeySalt")]
    pub key_salt: String,
    /// Armored account (user) private key.
    #[serde(rename = "PrimaryKey")]
    pub primary_key: String,
    /// One payload per address.
    #[serde(rename = "AddressKeys")]
    pub address_keys: Vec<AddressKeyPayload>,
}

// ---------------------------------------------------------------------------
// Password proof
// ---------------------------------------------------------------------------

/// Tokens produced by a completed password-proof (SRP) exchange.
#[derive(Clone, Debug, Serialize)]
pub struct SrpProof {
    /// Client ephemeral value.
    #[serde(rename = "ClientEphemeral")]
    pub client_ephemeral: String,
    /// Client proof of password knowledge.
    #[serde(rename = "ClientProof")]
    pub client_proof: String,
    /// Server session the proof answers.
    #[serde(rename = "SRPSession")]
    pub srp_session: String,
}

/// The password-proof capability.
///
/// Used only by initial setup, where no key exists yet to authenticate
/// with. Failures propagate to the caller unchanged.
#[async_trait]
pub trait SrpProver {
    /// Runs the proof exchange for `password` against the server.
    async fn prove(&self, password: &str) -> Result<SrpProof>;
}

// ---------------------------------------------------------------------------
// KeyApi
// ---------------------------------------------------------------------------

/// The key-management endpoint contract, one method per command.
///
/// Every submission carries the freshly built Signed Key List for its
/// scope; the server validates and persists both atomically. A
/// returned error leaves server state unknown — callers re-resolve
/// instead of assuming rollback.
#[async_trait]
pub trait KeyApi {
    /// Submits a member key activation.
    async fn activate_key(&self, request: ActivateKeyRequest) -> Result<()>;

    /// Submits a primary-key reassignment.
    async fn set_primary_key(&self, request: SetPrimaryKeyRequest) -> Result<()>;

    /// Submits a key deletion.
    async fn delete_key(&self, request: DeleteKeyRequest) -> Result<()>;

    /// Submits a flag change.
    async fn set_key_flags(&self, request: SetKeyFlagsRequest) -> Result<()>;

    /// Submits a key reactivation.
    async fn reactivate_key(&self, request: ReactivateKeyRequest) -> Result<()>;

    /// Submits the initial key bootstrap, authenticated by `proof`.
    async fn setup_keys(&self, proof: SrpProof, request: SetupKeysRequest) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reactivate_request_omits_absent_skl() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let request = ReactivateKeyRequest {
            id: KeyId::new("k1"),
            private_key: "armored".into(),
            signed_key_list: None,
        };
        let json = serde_json::to_value(&request)?;
        assert!(json.get("SignedKeyList").is_none());
        Ok(())
    }

    #[test]
    fn setup_request_wire_names() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let request = SetupKeysRequest {
            key_salt: "c2FsdA==".into(),
            primary_key: "armored".into(),
            address_keys: vec![AddressKeyPayload {
                address_id: AddressId::new("addr_1"),
                private_key: "armored".into(),
                token: None,
                signature: None,
                signed_key_list: SignedKeyList {
                    data: "[]".into(),
                    signature: "00".into(),
                },
            }],
        };
        let json = serde_json::to_value(&request)?;
        assert_eq!(json["KeySalt"], "c2FsdA==");
        assert_eq!(json["AddressKeys"][0]["AddressID"], "addr_1");
        assert!(json["AddressKeys"][0].get("Token").is_none());
        Ok(())
    }
}
