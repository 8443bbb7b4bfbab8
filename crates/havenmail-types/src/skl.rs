//! Signed Key List wire types.
//!
//! A Signed Key List (SKL) is the canonical signed manifest of a
//! scope's active key set. `Data` is the canonical JSON serialization
//! of the entries; `Signature` is a detached signature over it,
//! produced by a key drawn from the listed set itself. Server-returned
//! copies additionally carry the transparency-log epoch bounds in
//! which the list was published.
//!
//! Field order inside [`SignedKeyListEntry`] is fixed at the type
//! level: serialization order is declaration order, which is what
//! makes `Data` reproducible byte-for-byte.

use serde::{Deserialize, Serialize};

use crate::{Fingerprint, HavenmailError, KeyFlags, Result};

// ---------------------------------------------------------------------------
// SignedKeyListEntry
// ---------------------------------------------------------------------------

/// One entry of a Signed Key List, describing a single active key.
///
/// Entries appear in the same order as the active key set they were
/// built from: primary first, remainder stable.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignedKeyListEntry {
    /// 1 for the scope's primary key, 0 otherwise. Exactly one entry
    /// carries 1 in a non-empty list.
    #[serde(rename = "Primary")]
    pub primary: u8,
    /// Capability flags of the key.
    #[serde(rename = "Flags")]
    pub flags: KeyFlags,
    /// Hex public-key fingerprint.
    #[serde(rename = "Fingerprint")]
    pub fingerprint: Fingerprint,
    /// SHA-256 fingerprints of the key and its subkeys.
    #[serde(rename = "SHA256Fingerprints")]
    pub sha256_fingerprints: Vec<String>,
}

// ---------------------------------------------------------------------------
// SignedKeyList
// ---------------------------------------------------------------------------

/// Canonical signed manifest of an active key set.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignedKeyList {
    /// Canonical JSON array of [`SignedKeyListEntry`] values.
    #[serde(rename = "Data")]
    pub data: String,
    /// Hex detached signature over the domain-prefixed `data` bytes.
    #[serde(rename = "Signature")]
    pub signature: String,
}

impl SignedKeyList {
    /// Parses `Data` back into its entries.
    ///
    /// # Errors
    ///
    /// Returns [`HavenmailError::SerializationError`] if `Data` is not
    /// a valid entry array.
    pub fn parse_entries(&self) -> Result<Vec<SignedKeyListEntry>> {
        serde_json::from_str(&self.data).map_err(|e| HavenmailError::SerializationError {
            reason: format!("invalid signed key list data: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// SignedKeyListInfo
// ---------------------------------------------------------------------------

/// A Signed Key List as returned by the server, with the transparency
/// epoch bounds of its publication.
///
/// `min_epoch_id`/`max_epoch_id` are `None` until the list has been
/// included in a published epoch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignedKeyListInfo {
    /// Canonical JSON array of [`SignedKeyListEntry`] values.
    #[serde(rename = "Data")]
    pub data: String,
    /// Hex detached signature over the domain-prefixed `data` bytes.
    #[serde(rename = "Signature")]
    pub signature: String,
    /// First transparency epoch the list was published in.
    #[serde(rename = "MinEpochID")]
    pub min_epoch_id: Option<u64>,
    /// Last transparency epoch the list was published in.
    #[serde(rename = "MaxEpochID")]
    pub max_epoch_id: Option<u64>,
}

impl SignedKeyListInfo {
    /// Strips the epoch bounds, leaving the plain signed manifest.
    pub fn to_signed_key_list(&self) -> SignedKeyList {
        SignedKeyList {
            data: self.data.clone(),
            signature: self.signature.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(primary: u8, fp: &str) -> SignedKeyListEntry {
        SignedKeyListEntry {
            primary,
            flags: KeyFlags::default(),
            fingerprint: Fingerprint::new(fp),
            sha256_fingerprints: vec![format!("{fp}-sha256")],
        }
    }

    #[test]
    fn entry_serializes_in_declaration_order() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let json = serde_json::to_string(&entry(1, "abc"))?;
        let primary_pos = json.find("\"Primary\"").unwrap_or(usize::MAX);
        let flags_pos = json.find("\"Flags\"").unwrap_or(usize::MAX);
        let fp_pos = json.find("\"Fingerprint\"").unwrap_or(usize::MAX);
        let sha_pos = json.find("\"SHA256Fingerprints\"").unwrap_or(usize::MAX);
        assert!(primary_pos < flags_pos);
        assert!(flags_pos < fp_pos);
        assert!(fp_pos < sha_pos);
        Ok(())
    }

    #[test]
    fn parse_entries_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let entries = vec![entry(1, "aa"), entry(0, "bb")];
        let skl = SignedKeyList {
            data: serde_json::to_string(&entries)?,
            signature: "00".into(),
        };
        assert_eq!(skl.parse_entries()?, entries);
        Ok(())
    }

    #[test]
    fn parse_entries_rejects_garbage() {
        let skl = SignedKeyList {
            data: "not json".into(),
            signature: String::new(),
        };
        assert!(skl.parse_entries().is_err());
    }

    #[test]
    fn info_strips_epoch_bounds() {
        let info = SignedKeyListInfo {
            data: "[]".into(),
            signature: "ff".into(),
            min_epoch_id: Some(10),
            max_epoch_id: Some(12),
        };
        let skl = info.to_signed_key_list();
        assert_eq!(skl.data, "[]");
        assert_eq!(skl.signature, "ff");
    }

    #[test]
    fn info_wire_names() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let info = SignedKeyListInfo {
            data: "[]".into(),
            signature: "ff".into(),
            min_epoch_id: None,
            max_epoch_id: Some(7),
        };
        let json = serde_json::to_value(&info)?;
        assert!(json["MinEpochID"].is_null());
        assert_eq!(json["MaxEpochID"], 7);
        Ok(())
    }
}
