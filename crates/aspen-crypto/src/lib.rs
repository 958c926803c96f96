//! Aspen MDM Crypto Utilities
//!
//! The cert-auth hash and the Mdm-Signature transport decode. CMS
//! signature verification proper lives outside this workspace; the
//! seam here only undoes the transport encoding for it.

mod cert;
mod signature;

pub use cert::*;
pub use signature::*;
