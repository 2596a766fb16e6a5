// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed OAuth `state` parameter (CSRF protection for the authorization flow).
//!
//! Format before encoding: `redirect|timestamp_ms_hex|hmac_sha256_hex`,
//! then URL-safe base64 without padding.

use crate::error::AppError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// States older than this are rejected.
pub const STATE_MAX_AGE_SECS: i64 = 10 * 60;

fn mac_for(payload: &str, key: &[u8]) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Sign `redirect` into a state value issued at `now`.
pub fn sign_state(redirect: &str, key: &[u8], now: DateTime<Utc>) -> Result<String, AppError> {
    let payload = format!("{}|{:x}", redirect, now.timestamp_millis());
    let signature = mac_for(&payload, key)?.finalize().into_bytes();
    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Verify a state value and return the redirect it carries.
///
/// Returns `None` for malformed, tampered or expired states.
pub fn verify_state(state: &str, key: &[u8], now: DateTime<Utc>) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;

    // Split from the right so a `|` inside the redirect survives.
    let mut parts = decoded.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let redirect = parts.next()?;

    let signature = hex::decode(signature_hex).ok()?;
    let payload = format!("{}|{}", redirect, timestamp_hex);
    if mac_for(&payload, key).ok()?.verify_slice(&signature).is_err() {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = i64::from_str_radix(timestamp_hex, 16).ok()?;
    let issued = DateTime::from_timestamp_millis(issued_ms)?;
    let age = now - issued;
    if age > Duration::seconds(STATE_MAX_AGE_SECS) || age < Duration::seconds(-60) {
        tracing::warn!(age_secs = age.num_seconds(), "OAuth state expired");
        return None;
    }

    Some(redirect.to_string())
}
