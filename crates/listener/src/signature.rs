//! `X-Hub-Signature-256` handling.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::ListenerError;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

/// Computes the header value a provider would send for `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, ListenerError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| ListenerError::InvalidSignature)?;
    mac.update(body);
    Ok(format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks `header` against the HMAC-SHA256 of `body` keyed with `secret`.
///
/// The comparison is constant-time.
///
/// # Errors
///
/// [`ListenerError::InvalidSignature`] when the header is absent, not
/// `sha256=<hex>`, or does not match.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), ListenerError> {
    let provided = header
        .and_then(|h| h.trim().strip_prefix(PREFIX))
        .and_then(|h| hex::decode(h).ok())
        .ok_or(ListenerError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| ListenerError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| ListenerError::InvalidSignature)
}
