// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local request budgets for the Lightroom API.
//!
//! Two independent windows are tracked in the KV store, one record each: a
//! clock-hour quota and a per-minute burst quota. Upstream `X-RateLimit-*` headers correct
//! the hourly count when they report a tighter budget.
//!
//! Counters are read-then-written without transactions. Concurrent
//! invocations may lose an increment (undercount); reconciliation only ever
//! raises a count, so corrections err toward rejecting work.

use crate::config::RateLimitSettings;
use crate::db::CacheDb;
use crate::error::AppError;
use crate::models::{BudgetStatus, RateCounter, RateLimitStatus, RateWindow, UpstreamRateInfo};
use chrono::{DateTime, Utc};

/// Upstream hourly usage expressed against the local limit.
///
/// Usage is measured against the upstream's own limit (the local one when
/// the header is absent), scaled proportionally and rounded up.
fn scaled_usage(info: &UpstreamRateInfo, local_limit: u32) -> u32 {
    let upstream_limit = info.limit.filter(|l| *l > 0).unwrap_or(local_limit);
    if upstream_limit == 0 {
        return 0;
    }
    let used = u64::from(upstream_limit.saturating_sub(info.remaining));
    let scaled = (used * u64::from(local_limit)).div_ceil(u64::from(upstream_limit));
    scaled.min(u64::from(local_limit)) as u32
}

/// Rate limiter backed by KV counters.
#[derive(Clone)]
pub struct RateLimiter {
    db: CacheDb,
    settings: RateLimitSettings,
    /// Hourly requests that must remain before non-forced work starts.
    budget_floor: u32,
}

impl RateLimiter {
    pub fn new(db: CacheDb, settings: RateLimitSettings, budget_floor: u32) -> Self {
        Self {
            db,
            settings,
            budget_floor,
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    async fn load(&self, window: RateWindow, now: DateTime<Utc>) -> Result<RateCounter, AppError> {
        let counter = self.db.get_counter(window.key()).await?;
        Ok(match counter {
            Some(c) if !c.is_expired(now) => c,
            _ => RateCounter::fresh(window, now),
        })
    }

    fn limit(&self, window: RateWindow) -> u32 {
        match window {
            RateWindow::Hourly => self.settings.hourly_limit,
            RateWindow::Minute => self.settings.burst_limit,
        }
    }

    /// Usage of both windows at `now`.
    pub async fn status_at(&self, now: DateTime<Utc>) -> Result<RateLimitStatus, AppError> {
        let (hourly, minute) = tokio::try_join!(
            self.load(RateWindow::Hourly, now),
            self.load(RateWindow::Minute, now)
        )?;
        Ok(RateLimitStatus {
            hourly: BudgetStatus::new(
                hourly.current(now),
                self.limit(RateWindow::Hourly),
                hourly.reset_at,
            ),
            burst: BudgetStatus::new(
                minute.current(now),
                self.limit(RateWindow::Minute),
                minute.reset_at,
            ),
        })
    }

    pub async fn status(&self) -> Result<RateLimitStatus, AppError> {
        self.status_at(Utc::now()).await
    }

    /// Pre-flight check for one upstream request; consumes one unit of both budgets.
    ///
    /// An exhausted hour raises `BudgetProtected`; an exhausted minute raises
    /// `RateLimited` with the seconds left in the minute.
    pub async fn check_and_increment(&self) -> Result<(), AppError> {
        let now = Utc::now();
        let (mut hourly, mut minute) = tokio::try_join!(
            self.load(RateWindow::Hourly, now),
            self.load(RateWindow::Minute, now)
        )?;

        let hourly_limit = self.limit(RateWindow::Hourly);
        if hourly.count >= hourly_limit {
            tracing::warn!(count = hourly.count, limit = hourly_limit, "Hourly API budget exhausted");
            return Err(AppError::BudgetProtected {
                remaining: 0,
                required: 1,
            });
        }

        let burst_limit = self.limit(RateWindow::Minute);
        if minute.count >= burst_limit {
            let status = BudgetStatus::new(minute.count, burst_limit, minute.reset_at);
            let retry_after_seconds = status.seconds_until_reset(now);
            tracing::warn!(count = minute.count, retry_after_seconds, "Burst API budget exhausted");
            return Err(AppError::RateLimited {
                retry_after_seconds,
            });
        }

        hourly.count += 1;
        minute.count += 1;
        tokio::try_join!(
            self.db.set_counter(RateWindow::Hourly.key(), &hourly),
            self.db.set_counter(RateWindow::Minute.key(), &minute)
        )?;
        Ok(())
    }

    /// Fold upstream rate-limit headers into local bookkeeping.
    ///
    /// The upstream view wins when it reports fewer remaining requests than
    /// the local hourly counter does.
    pub async fn reconcile(&self, info: UpstreamRateInfo) -> Result<(), AppError> {
        let now = info.observed_at;
        let mut hourly = self.load(RateWindow::Hourly, now).await?;
        let hourly_limit = self.limit(RateWindow::Hourly);

        let upstream_used = scaled_usage(&info, hourly_limit);
        if upstream_used > hourly.count {
            tracing::info!(
                local = hourly.count,
                upstream = upstream_used,
                remaining = info.remaining,
                "Raising hourly count to match upstream rate limit"
            );
            hourly.count = upstream_used;
            self.db
                .set_counter(RateWindow::Hourly.key(), &hourly)
                .await?;
        }

        self.db.set_upstream_rate(&info).await
    }

    /// Refuse non-forced work when the hourly budget is below the floor or
    /// below `required`.
    pub async fn ensure_budget(
        &self,
        required: u32,
        force: bool,
    ) -> Result<RateLimitStatus, AppError> {
        let status = self.status().await?;
        if force {
            return Ok(status);
        }

        let remaining = status.hourly.remaining;
        if remaining < self.budget_floor || remaining < required {
            tracing::warn!(remaining, required, floor = self.budget_floor, "Budget protection");
            return Err(AppError::BudgetProtected {
                remaining,
                required,
            });
        }
        Ok(status)
    }

    /// Last upstream rate-limit snapshot, if any header was seen.
    pub async fn upstream_info(&self) -> Result<Option<UpstreamRateInfo>, AppError> {
        self.db.get_upstream_rate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(db: CacheDb) -> RateLimiter {
        RateLimiter::new(db, RateLimitSettings::default(), 5)
    }

    async fn seed_hourly(db: &CacheDb, count: u32) {
        let now = Utc::now();
        let counter = RateCounter {
            count,
            reset_at: RateWindow::Hourly.reset_at(now),
        };
        db.set_counter(RateWindow::Hourly.key(), &counter)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_increment_counts_both_windows() {
        let limiter = limiter(CacheDb::in_memory());
        limiter.check_and_increment().await.unwrap();
        limiter.check_and_increment().await.unwrap();

        let status = limiter.status().await.unwrap();
        assert_eq!(status.hourly.used, 2);
        assert_eq!(status.hourly.remaining, 98);
        assert_eq!(status.burst.used, 2);
        assert_eq!(status.burst.remaining, 28);
    }

    #[tokio::test]
    async fn test_burst_exhaustion_is_rate_limited() {
        let db = CacheDb::in_memory();
        let settings = RateLimitSettings {
            hourly_limit: 100,
            burst_limit: 2,
        };
        let limiter = RateLimiter::new(db, settings, 5);
        limiter.check_and_increment().await.unwrap();
        limiter.check_and_increment().await.unwrap();

        match limiter.check_and_increment().await {
            Err(AppError::RateLimited {
                retry_after_seconds,
            }) => assert!((1..=60).contains(&retry_after_seconds)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hourly_exhaustion_is_budget_protected() {
        let db = CacheDb::in_memory();
        seed_hourly(&db, 100).await;
        let err = limiter(db).check_and_increment().await.unwrap_err();
        assert!(matches!(err, AppError::BudgetProtected { remaining: 0, .. }));
    }

    #[tokio::test]
    async fn test_ensure_budget_floor() {
        let db = CacheDb::in_memory();
        seed_hourly(&db, 96).await;
        let limiter = limiter(db);

        let err = limiter.ensure_budget(10, false).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::BudgetProtected {
                remaining: 4,
                required: 10
            }
        ));
        assert!(limiter.ensure_budget(10, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_reconcile_prefers_tighter_upstream() {
        let db = CacheDb::in_memory();
        seed_hourly(&db, 10).await;
        let limiter = limiter(db);

        let info = UpstreamRateInfo {
            remaining: 50,
            limit: Some(100),
            reset_at: None,
            observed_at: Utc::now(),
        };
        limiter.reconcile(info.clone()).await.unwrap();
        assert_eq!(limiter.status().await.unwrap().hourly.used, 50);

        // A looser upstream view never lowers the local count.
        limiter
            .reconcile(UpstreamRateInfo {
                remaining: 90,
                ..info
            })
            .await
            .unwrap();
        assert_eq!(limiter.status().await.unwrap().hourly.used, 50);
        assert!(limiter.upstream_info().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_windows_reuse_one_record_each() {
        let db = CacheDb::in_memory();
        let past = Utc::now() - chrono::Duration::hours(3);
        for window in [RateWindow::Hourly, RateWindow::Minute] {
            let stale = RateCounter {
                count: 77,
                reset_at: window.reset_at(past),
            };
            db.set_counter(window.key(), &stale).await.unwrap();
        }

        let limiter = limiter(db.clone());
        limiter.check_and_increment().await.unwrap();
        limiter.check_and_increment().await.unwrap();

        let status = limiter.status().await.unwrap();
        assert_eq!(status.hourly.used, 2);
        assert_eq!(status.burst.used, 2);
        assert_eq!(
            db.kv().list("rate:").await.unwrap(),
            vec!["rate:hourly".to_string(), "rate:minute".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reconcile_scales_upstream_limit() {
        let limiter = limiter(CacheDb::in_memory());
        let info = UpstreamRateInfo {
            remaining: 500,
            limit: Some(1000),
            reset_at: None,
            observed_at: Utc::now(),
        };
        limiter.reconcile(info.clone()).await.unwrap();
        assert_eq!(limiter.status().await.unwrap().hourly.used, 50);

        // A remaining count above the local limit with no upstream limit means no usage.
        limiter
            .reconcile(UpstreamRateInfo {
                remaining: 5000,
                limit: None,
                ..info.clone()
            })
            .await
            .unwrap();
        assert_eq!(limiter.status().await.unwrap().hourly.used, 50);

        limiter
            .reconcile(UpstreamRateInfo {
                remaining: 0,
                limit: Some(5000),
                ..info
            })
            .await
            .unwrap();
        assert_eq!(limiter.status().await.unwrap().hourly.used, 100);
    }
}
