//! Webhook signatures.
//!
//! The provider signs every delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`, where each HMAC-SHA256
//! is computed over `"<t>.<raw body>"` with the endpoint secret. Several `v1`
//! entries may be present while a secret is being rotated.

use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default allowed clock skew between the provider's timestamp and ours.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Validates `header` against `body`. Nothing about the body is trusted before this passes.
    pub fn verify(&self, header: &str, body: &[u8], now: DateTime<Utc>) -> Result<()> {
        let (timestamp, signatures) = parse_header(header)?;

        // abs_diff cannot overflow, whatever `t` the header carries.
        if now.timestamp().abs_diff(timestamp) > self.tolerance_secs {
            return Err(SettlementError::SignatureInvalid(
                "timestamp outside the tolerance window".to_string(),
            ));
        }

        let mac = signed_payload_mac(&self.secret, timestamp, body)?;
        let matched = signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

        if matched {
            Ok(())
        } else {
            Err(SettlementError::SignatureInvalid(
                "no matching v1 signature".to_string(),
            ))
        }
    }
}

/// Builds the header value the provider would send for `body` at `timestamp`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String> {
    let mac = signed_payload_mac(secret, timestamp, body)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn signed_payload_mac(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SettlementError::InternalError(Box::new(std::io::Error::other(e.to_string()))))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

fn parse_header(header: &str) -> Result<(i64, Vec<Vec<u8>>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    SettlementError::SignatureInvalid("malformed timestamp".to_string())
                })?);
            }
            // Unparseable candidates simply never match.
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| SettlementError::SignatureInvalid("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(SettlementError::SignatureInvalid(
            "missing v1 signature".to_string(),
        ));
    }
    Ok((timestamp, signatures))
}
