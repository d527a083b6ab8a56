//! HMAC-SHA256 webhook signatures
//!
//! The header value is `sha256=<hex>` computed over the exact body bytes
//! that were posted. Receivers must verify against those bytes, not a
//! re-serialization.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Scheme prefix of the header value
pub const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signing key")]
    InvalidKey,
    #[error("signature header must start with sha256=")]
    InvalidFormat,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("signature mismatch")]
    Mismatch,
}

fn mac(secret: &[u8]) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)
}

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`
pub fn sign(secret: &[u8], payload: &[u8]) -> Result<String, SignatureError> {
    let mut mac = mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Full header value (`sha256=<hex>`)
pub fn signature_header(secret: &[u8], payload: &[u8]) -> Result<String, SignatureError> {
    Ok(format!("{SIGNATURE_PREFIX}{}", sign(secret, payload)?))
}

/// Verify a `sha256=<hex>` header against the received body bytes
pub fn verify_signature(secret: &[u8], payload: &[u8], header: &str) -> Result<(), SignatureError> {
    let hex_sig = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::InvalidFormat)?;
    let expected = hex::decode(hex_sig).map_err(|_| SignatureError::InvalidHex)?;

    let mut mac = mac(secret)?;
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}
