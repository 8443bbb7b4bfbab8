//! Cryptographic primitives for the Havenmail key-lifecycle manager.
//!
//! This crate is the **sole** location for all cryptographic operations.
//! No other crate in the workspace may perform raw crypto directly.
//!
//! # Modules
//!
//! - [`key`] — the opaque private-key capability: generation, signing,
//!   fingerprints
//! - [`lockbox`] — passphrase-based private-key export/unlock with
//!   identity binding, and key-salt/passphrase generation for setup

pub mod key;
pub mod lockbox;
