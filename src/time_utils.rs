// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time handling.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Whether `last` lies within `window` before `now`.
pub fn is_within(last: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(window) {
        Ok(window) => now - last < window,
        Err(_) => true,
    }
}

/// Interpret an `X-RateLimit-Reset` value.
///
/// Large values are Unix epoch seconds; small ones are seconds from `now`.
pub fn parse_reset_header(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs: i64 = value.trim().parse().ok()?;
    if secs < 0 {
        return None;
    }
    // Anything before 2001-09-09 is treated as a relative delay.
    if secs >= 1_000_000_000 {
        DateTime::from_timestamp(secs, 0)
    } else {
        Some(now + chrono::Duration::seconds(secs))
    }
}
