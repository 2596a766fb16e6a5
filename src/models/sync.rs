// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persisted sync progress: one record per sync track.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of error entries kept in a persisted `SyncState`.
pub const MAX_SYNC_ERRORS: usize = 20;

/// One item-level failure recorded by a sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorEntry {
    /// Album or asset the failure concerns.
    pub item_id: String,
    /// Rendition size for download failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub at: DateTime<Utc>,
}

impl SyncErrorEntry {
    pub fn new(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            size: None,
            message: message.into(),
            status: None,
            at: Utc::now(),
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }
}

/// Explicit resumable paginator over an upstream cursor listing.
///
/// `page_index` counts pages fetched in the current invocation; it is reset
/// at the start of each invocation while `cursor` carries over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default)]
    pub page_index: u32,
    #[serde(default)]
    pub max_pages: u32,
}

impl PageCursor {
    /// Start an invocation from a previously persisted cursor.
    pub fn resume(cursor: Option<String>, max_pages: u32) -> Self {
        Self {
            cursor,
            page_index: 0,
            max_pages,
        }
    }

    /// Whether the page cap still allows another fetch.
    pub fn can_fetch(&self) -> bool {
        self.page_index < self.max_pages
    }

    /// Record a fetched page and the cursor of the page after it.
    pub fn advance(&mut self, next: Option<String>) {
        self.page_index += 1;
        self.cursor = next;
    }

    /// True when the listing has no further pages.
    pub fn is_exhausted(&self) -> bool {
        self.page_index > 0 && self.cursor.is_none()
    }

    /// Whether another invocation is needed to finish the listing.
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }
}

/// Progress record of one sync track (`sync:state` or `sync:album:{id}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Present while more pages remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Last pass that completed without an aborting failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_synced: u64,
    #[serde(default)]
    pub last_batch_size: u32,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub errors: Vec<SyncErrorEntry>,
}

impl SyncState {
    /// Append errors, keeping only the newest `MAX_SYNC_ERRORS`.
    pub fn record_errors(&mut self, errors: &[SyncErrorEntry]) {
        self.errors.extend_from_slice(errors);
        if self.errors.len() > MAX_SYNC_ERRORS {
            let excess = self.errors.len() - MAX_SYNC_ERRORS;
            self.errors.drain(..excess);
        }
    }

    /// Seconds since the last successful pass, if any.
    pub fn seconds_since_last_sync(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_sync.map(|t| (now - t).num_seconds())
    }
}
