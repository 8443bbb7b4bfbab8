//! Key mutation pipelines for the Havenmail identity service.
//!
//! Every mutation follows the same shape: resolve the active key set,
//! apply the operation, build a fresh Signed Key List, gate it through
//! the Key Transparency audit, and only then submit. Either the whole
//! pipeline succeeds or nothing is submitted.
//!
//! # Modules
//!
//! - [`api`] — the key-management transport and password-proof
//!   capability contracts
//! - [`actions`] — single-key mutations (activate, set primary,
//!   delete, set flags)
//! - [`reactivation`] — the batched reactivation processor with
//!   record- and key-level failure isolation
//! - [`setup`] — initial account/address key bootstrap
//!
//! # Concurrency
//!
//! Pipelines suspend at crypto and network calls but hold no locks:
//! callers must serialize mutations against the same scope, because
//! two concurrent pipelines would resolve from the same baseline and
//! race to submit divergent Signed Key Lists, of which the server
//! accepts only one.

pub mod actions;
pub mod api;
pub mod reactivation;
pub mod setup;

use havenmail_types::{KeyFlags, KeyRecord};

/// Flags a freshly (re)activated key enters the active set with: the
/// record's published flags, or full capabilities when the record
/// carries none yet.
pub(crate) fn record_flags(record: &KeyRecord) -> KeyFlags {
    if record.flags.is_empty() {
        KeyFlags::default()
    } else {
        record.flags
    }
}
