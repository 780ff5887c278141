//! Webhook signature verification.
//!
//! Two schemes are accepted:
//!
//! - **V2**: `x-webhook-signature: <scheme>=<hex>` plus `x-webhook-timestamp`,
//!   HMAC-SHA256 over `timestamp:body`.
//! - **V1**: `x-notion-signature: <hex>` (optionally `sha256=<hex>`),
//!   HMAC-SHA256 over the body alone. Used only when the V2 pair is incomplete.

use pagebot_core::SignatureHeaders;
use ring::hmac;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    V1,
    V2,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing signature header")]
    MissingSignature,
    #[error("webhook secret not configured")]
    NotConfigured,
    #[error("invalid signature")]
    Invalid,
}

/// Check `raw_body` against whichever signature the headers carry.
///
/// Header presence is checked before the secret, so an unsigned request is
/// reported as such even on a misconfigured server.
pub fn verify(
    raw_body: &[u8],
    headers: &SignatureHeaders,
    shared_secret: Option<&str>,
) -> Result<Scheme, Rejection> {
    let (scheme, digest, message) = match (&headers.signature, &headers.timestamp) {
        (Some(sig), Some(ts)) => {
            let mut message = Vec::with_capacity(ts.len() + 1 + raw_body.len());
            message.extend_from_slice(ts.as_bytes());
            message.push(b':');
            message.extend_from_slice(raw_body);
            let digest = sig.split_once('=').map_or(sig.as_str(), |(_, hex)| hex);
            (Scheme::V2, digest, message)
        }
        _ => {
            let sig = headers
                .legacy_signature
                .as_deref()
                .ok_or(Rejection::MissingSignature)?;
            let digest = sig.strip_prefix("sha256=").unwrap_or(sig);
            (Scheme::V1, digest, raw_body.to_vec())
        }
    };

    let secret = shared_secret
        .filter(|s| !s.is_empty())
        .ok_or(Rejection::NotConfigured)?;
    let expected = hex::decode(digest.trim()).map_err(|_| Rejection::Invalid)?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, &message, &expected).map_err(|_| Rejection::Invalid)?;
    Ok(scheme)
}

/// Hex HMAC-SHA256 of `message`, as a sender would compute it.
pub fn sign(secret: &str, message: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hex::encode(hmac::sign(&key, message).as_ref())
}
