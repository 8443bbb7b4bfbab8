//! Core shared types for the Havenmail key-lifecycle manager.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod skl;

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// KeyId
// ---------------------------------------------------------------------------

/// Opaque server-assigned identifier of a single key.
///
/// The server owns key identity; clients treat the ID as an opaque
/// string and never derive meaning from its contents.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Creates a new `KeyId` from a server-provided string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// AddressId
// ---------------------------------------------------------------------------

/// Opaque server-assigned identifier of an email address.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressId(String);

impl AddressId {
    /// Creates a new `AddressId` from a server-provided string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AddressId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Hex-encoded public-key fingerprint.
///
/// The primary identity of a key inside a Signed Key List. Computed by
/// `havenmail-crypto` from the raw public key bytes; this crate only
/// carries the encoded form.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Creates a `Fingerprint` from its hex string form.
    pub fn new(fp: impl Into<String>) -> Self {
        Self(fp.into())
    }

    /// Returns the hex form as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the fingerprint is empty (malformed key).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// KeyFlags
// ---------------------------------------------------------------------------

/// Capability flags attached to every key in a Signed Key List.
///
/// Serialized on the wire as the raw integer. A key with no flags set
/// is fully disabled: it may neither verify signatures nor receive
/// newly encrypted data.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyFlags(u32);

impl KeyFlags {
    /// The key is not compromised: signatures from it are trusted and
    /// it may anchor trust (sign a Signed Key List).
    pub const NOT_COMPROMISED: KeyFlags = KeyFlags(1);

    /// The key is not obsolete: new data may be encrypted to it.
    pub const NOT_OBSOLETE: KeyFlags = KeyFlags(2);

    /// No capabilities.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Creates flags from the raw wire integer.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw wire integer.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set in `self`.
    pub fn contains(&self, other: KeyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flags are set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for KeyFlags {
    /// Full capabilities: `NOT_COMPROMISED | NOT_OBSOLETE`.
    fn default() -> Self {
        Self::NOT_COMPROMISED | Self::NOT_OBSOLETE
    }
}

impl BitOr for KeyFlags {
    type Output = KeyFlags;

    fn bitor(self, rhs: KeyFlags) -> KeyFlags {
        KeyFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for KeyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// KeyScope
// ---------------------------------------------------------------------------

/// The unit against which an active key set exists.
///
/// Address-scoped keys are tracked by a Signed Key List and bound to the
/// address email; account-scoped keys have no SKL and are bound to a
/// fixed non-routable account identity. The two cases are an explicit
/// enum so every consumer matches exhaustively instead of probing an
/// optional field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyScope {
    /// Keys of a single email address.
    Address {
        /// Server identifier of the address.
        id: AddressId,
        /// Email the keys are bound to when re-encrypted.
        email: String,
    },
    /// Account-level keys (no Signed Key List).
    Account,
}

impl KeyScope {
    /// Returns the address identifier for address scopes.
    pub fn address_id(&self) -> Option<&AddressId> {
        match self {
            Self::Address { id, .. } => Some(id),
            Self::Account => None,
        }
    }
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address { id, .. } => write!(f, "address:{id}"),
            Self::Account => write!(f, "account"),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyRecord
// ---------------------------------------------------------------------------

/// Server-known key for an address or account.
///
/// Owned by the server and mirrored locally read-only. The private key
/// material is an armored ciphertext; decryption is performed elsewhere
/// and paired back with the record by [`KeyId`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Server identifier of the key.
    #[serde(rename = "ID")]
    pub id: KeyId,
    /// Armored encrypted private key material.
    #[serde(rename = "PrivateKey")]
    pub private_key: String,
    /// Capability flags as last published.
    #[serde(rename = "Flags")]
    pub flags: KeyFlags,
    /// Activation token, present while the key still needs activation
    /// (member keys provisioned by an organization admin).
    #[serde(rename = "Activation")]
    pub activation: Option<String>,
    /// Server-side primary marker (1 for the default key).
    #[serde(rename = "Primary")]
    pub primary: u8,
}

// ---------------------------------------------------------------------------
// AddressRecord
// ---------------------------------------------------------------------------

/// An address together with its server key records and last known SKL.
///
/// This is the read-only server view every mutation pipeline starts
/// from; the derived active key set never feeds back into it.
#[derive(Clone, Debug)]
pub struct AddressRecord {
    /// Server identifier of the address.
    pub id: AddressId,
    /// The email of the address.
    pub email: String,
    /// All keys the server knows for this address, in server order.
    pub keys: Vec<KeyRecord>,
    /// The last Signed Key List accepted by the server, if any.
    /// Absent for new addresses and legacy accounts that predate SKLs.
    pub signed_key_list: Option<skl::SignedKeyListInfo>,
}

impl AddressRecord {
    /// Returns the scope value for this address.
    pub fn scope(&self) -> KeyScope {
        KeyScope::Address {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// MemberVisibility / UserInfo
// ---------------------------------------------------------------------------

/// Whether an organization member's mailbox is readable by the admin.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MemberVisibility {
    /// Admin-provisioned keys; the member activates them on first login.
    Readable,
    /// The member generated their own keys.
    Private,
}

/// The subset of account state the key pipelines need.
#[derive(Clone, Debug)]
pub struct UserInfo {
    /// Mailbox visibility of this account within its organization.
    pub member_visibility: MemberVisibility,
    /// Set when signed in through an organization key (sub-user
    /// session); such sessions never activate member keys themselves.
    pub has_organization_key: bool,
}

// ---------------------------------------------------------------------------
// KtAdvisory
// ---------------------------------------------------------------------------

/// Advisory produced by a mutation pipeline for one scope.
///
/// The message comes from the transparency audit and is informational:
/// the caller surfaces it but it never blocks the mutation that
/// produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KtAdvisory {
    /// The scope (address) the advisory refers to.
    pub scope_id: AddressId,
    /// Informational message; empty when the audit had nothing to say.
    pub message: String,
}

// ---------------------------------------------------------------------------
// HavenmailError
// ---------------------------------------------------------------------------

/// Central error type for the Havenmail key-lifecycle manager.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
#[derive(Debug, Error)]
pub enum HavenmailError {
    /// A reference SKL entry has no decryptable counterpart. Dropping
    /// it silently would publish an SKL that removes a key the caller
    /// never asked to remove.
    #[error("missing active key material: {reason}")]
    MissingActiveKeyMaterial {
        /// Which entry could not be paired with decrypted material.
        reason: String,
    },

    /// Key records exist but no valid active key could be derived.
    #[error("active key set inconsistent: {reason}")]
    ActiveKeySetInconsistent {
        /// Human-readable description of the inconsistency.
        reason: String,
    },

    /// The candidate set is empty or contains no signing-capable key.
    #[error("no signing key available for the signed key list")]
    NoSigningKeyAvailable,

    /// Canonical serialization of the signed key list failed.
    #[error("signed key list serialization failed: {reason}")]
    SerializationError {
        /// Human-readable description of the serialization failure.
        reason: String,
    },

    /// The transparency audit vetoed the candidate, or its state could
    /// not be verified (both are terminal for the mutation).
    #[error("key transparency audit failed: {reason}")]
    AuditFailed {
        /// Error reported by the audit capability.
        reason: String,
    },

    /// The server rejected the submission or transport failed. Server
    /// state is unknown afterwards; callers must re-resolve.
    #[error("submission failed: {reason}")]
    SubmissionFailed {
        /// Human-readable description of the rejection.
        reason: String,
    },

    /// The requested key is not part of the active key set.
    #[error("key not found in active key set: {id}")]
    KeyNotFound {
        /// The key identifier that was requested.
        id: KeyId,
    },

    /// The key targeted for deletion is the current primary key.
    #[error("cannot delete primary key: {id}")]
    CannotDeletePrimaryKey {
        /// The primary key identifier.
        id: KeyId,
    },

    /// Initial setup was invoked without any address.
    #[error("an address is required to set up keys")]
    SetupRequiresAddress,

    /// A cryptographic operation failed (key export, signing, KDF).
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// The password-proof exchange was rejected.
    #[error("authentication failed: {reason}")]
    AuthenticationFailed {
        /// Human-readable description of the authentication failure.
        reason: String,
    },

    /// A tuning parameter is invalid (KDF costs, salt length).
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`HavenmailError`].
pub type Result<T> = std::result::Result<T, HavenmailError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
