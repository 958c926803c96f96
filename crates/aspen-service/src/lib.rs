//! Aspen MDM Service Layer
//!
//! Check-in and command dispatch plus the certificate-authorization
//! gate.

mod certauth;
mod server;
mod traits;

pub use certauth::{CertAuthPolicy, CertAuthService};
pub use server::AspenMdm;
pub use traits::*;
