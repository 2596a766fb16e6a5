// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod album;
pub mod flags;
pub mod rate;
pub mod sync;
pub mod tokens;

pub use album::{Album, AlbumDetail, AlbumSubtype, AlbumsIndex, Asset, Rendition, RenditionSize};
pub use flags::{AlbumFlags, SlugMapping};
pub use rate::{BudgetStatus, RateCounter, RateLimitStatus, RateWindow, UpstreamRateInfo};
pub use sync::{PageCursor, SyncErrorEntry, SyncState};
pub use tokens::OAuthTokenSet;
