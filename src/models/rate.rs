// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rate-limit window counters and status reports.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Granularity of a rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateWindow {
    Hourly,
    Minute,
}

impl RateWindow {
    pub fn length(self) -> Duration {
        match self {
            RateWindow::Hourly => Duration::hours(1),
            RateWindow::Minute => Duration::minutes(1),
        }
    }

    /// Window number since the Unix epoch.
    pub fn index(self, now: DateTime<Utc>) -> i64 {
        let millis = now.timestamp_millis();
        millis.div_euclid(self.length().num_milliseconds())
    }

    /// Start of the window containing `now`.
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let millis = self.index(now) * self.length().num_milliseconds();
        DateTime::from_timestamp_millis(millis).unwrap_or(now)
    }

    /// End of the window containing `now`.
    pub fn reset_at(self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start(now) + self.length()
    }

    /// KV key of the counter. One record per granularity; an expired
    /// record is overwritten by the next window's counter.
    pub fn key(self) -> &'static str {
        match self {
            RateWindow::Hourly => "rate:hourly",
            RateWindow::Minute => "rate:minute",
        }
    }
}

/// Request counter for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateCounter {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateCounter {
    pub fn fresh(window: RateWindow, now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            reset_at: window.reset_at(now),
        }
    }

    /// Expired counters read as zero.
    pub fn current(&self, now: DateTime<Utc>) -> u32 {
        if now >= self.reset_at {
            0
        } else {
            self.count
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }
}

/// Usage of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub used: u32,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl BudgetStatus {
    pub fn new(used: u32, limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            used,
            remaining: limit.saturating_sub(used),
            limit,
            reset_at,
        }
    }

    /// Whole seconds until this window resets, at least one.
    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> u64 {
        let secs = (self.reset_at - now).num_seconds();
        secs.max(1) as u64
    }
}

/// Current usage of both windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub hourly: BudgetStatus,
    pub burst: BudgetStatus,
}

/// Last rate-limit view reported by upstream headers, stored at `rate:upstream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRateInfo {
    pub remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}
