//! Mdm-Signature transport decoding.

use color_eyre::eyre::WrapErr as _;

/// Decode the `Mdm-Signature` header into the raw CMS/PKCS#7 DER.
///
/// The header carries a base64-encoded detached signature over the
/// request body. Verifying it and extracting the signing leaf is the
/// job of an external verifier; this only undoes the transport
/// encoding for it.
pub fn decode_mdm_signature(signature_header: &str) -> color_eyre::eyre::Result<Vec<u8>> {
    use base64::Engine as _;

    base64::engine::general_purpose::STANDARD
        .decode(signature_header.trim())
        .wrap_err("failed to decode Mdm-Signature base64")
}
