// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod gallery;
pub mod ims;
pub mod lightroom;
pub mod oauth_state;
pub mod publish;
pub mod rate_limit;
pub mod retry;
pub mod sync;
pub mod tokens;

pub use auth::{AuthProvider, SessionAuth};
pub use gallery::{AlbumsStats, GalleryAlbum, GalleryReader};
pub use ims::ImsClient;
pub use lightroom::LightroomClient;
pub use publish::{PublishRequest, PublishResult, PublishService};
pub use rate_limit::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
pub use sync::{
    AlbumAssetsOutcome, AlbumSyncOptions, AlbumSyncOutcome, AssetSyncOptions, SyncOrchestrator,
};
pub use tokens::TokenManager;
