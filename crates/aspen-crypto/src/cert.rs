//! Certificate hashing.

use sha2::{Digest as _, Sha256};

/// SHA-256 of the DER certificate, lowercase hex.
///
/// This is the identity every cert-auth association is keyed by.
pub fn cert_hash(cert_der: &[u8]) -> String {
    hex::encode(Sha256::digest(cert_der))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cert_hash_is_lowercase_hex_sha256() {
        // Well-known SHA-256 of "abc".
        assert_eq!(
            cert_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn cert_hash_deterministic() {
        assert_eq!(cert_hash(b"cert"), cert_hash(b"cert"));
        assert_ne!(cert_hash(b"cert"), cert_hash(b"cert2"));
    }
}
