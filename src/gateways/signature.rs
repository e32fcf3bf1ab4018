use crate::gateways::GatewayError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Checks a `t=<unix>,v1=<hex>` signature header over `"<t>.<payload>"`.
/// Any one matching `v1` entry is accepted; the timestamp must be within
/// `tolerance_secs` of `now`.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), GatewayError> {
    if secret.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "webhook secret not configured".to_string(),
        ));
    }

    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp = v.parse().ok(),
            (Some("v1"), Some(v)) => {
                if let Ok(bytes) = hex::decode(v) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".to_string()))?;
    if candidates.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }
    if (now.timestamp() - timestamp).abs() > tolerance_secs {
        return Err(GatewayError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    for candidate in candidates {
        let mac = keyed(secret, timestamp, payload)?;
        if mac.verify_slice(&candidate).is_ok() {
            return Ok(());
        }
    }

    Err(GatewayError::InvalidSignature(
        "no matching signature".to_string(),
    ))
}

pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, GatewayError> {
    let mac = keyed(secret, timestamp, payload)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn keyed(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}
