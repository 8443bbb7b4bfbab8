//! Active key set resolution and the Signed Key List protocol.
//!
//! Every key mutation in Havenmail flows through the same three steps
//! defined here:
//!
//! 1. [`active`] — derive the ordered, role-annotated active key set
//!    from server records, decrypted handles, and the last known
//!    Signed Key List.
//! 2. [`builder`] — serialize an active key set into a canonical,
//!    signed manifest.
//! 3. [`audit`] — optionally let the Key Transparency self-audit veto
//!    the candidate manifest before anything is submitted.

pub mod active;
pub mod audit;
pub mod builder;
