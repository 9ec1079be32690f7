//! Slack request signature verification
//!
//! Slack signs every request with `v0=` + hex(HMAC-SHA256(secret,
//! `v0:{timestamp}:{body}`)) and sends the timestamp alongside it.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Maximum age of a request timestamp (five minutes)
///
/// Applies to future timestamps as well, to absorb clock skew.
pub const TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;

const VERSION: &str = "v0";

/// Why a request was not accepted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("timestamp is not a number: {0}")]
    BadTimestamp(String),

    #[error("timestamp {timestamp} outside tolerance (now {now})")]
    Stale { timestamp: i64, now: i64 },

    #[error("signature is malformed")]
    Malformed,

    #[error("signature does not match")]
    Mismatch,

    #[error("signing secret cannot be used as an HMAC key")]
    InvalidKey,
}

fn is_timestamp_within_tolerance(timestamp_secs: i64, now_secs: i64) -> bool {
    (now_secs - timestamp_secs).abs() <= TIMESTAMP_TOLERANCE_SECONDS
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(format!("{}:{}:", VERSION, timestamp).as_bytes());
    mac.update(body);
    Ok(mac)
}

/// Signature Slack would send for this request
pub fn compute_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<String, SignatureError> {
    let digest = mac_for(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("{}={}", VERSION, hex::encode(digest)))
}

/// Check a request's signature and freshness
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_secs: i64,
) -> Result<(), SignatureError> {
    let timestamp_secs: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::BadTimestamp(timestamp.to_string()))?;

    if !is_timestamp_within_tolerance(timestamp_secs, now_secs) {
        return Err(SignatureError::Stale {
            timestamp: timestamp_secs,
            now: now_secs,
        });
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
        .ok_or(SignatureError::Malformed)?;

    // verify_slice compares in constant time
    mac_for(secret, timestamp.trim(), body)?
        .verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}
