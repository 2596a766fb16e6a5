// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable cache: a key-value store for small records and a blob store for
//! JSON documents and rendition binaries.

pub mod blob;
pub mod cache;
pub mod firestore;
pub mod kv;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore, ObjectMeta};
pub use cache::CacheDb;
pub use firestore::FirestoreKv;
pub use kv::{KvStore, MemoryKv};

/// Firestore collection names as constants.
pub mod collections {
    /// Key-value records (one document per key).
    pub const KV: &str = "kv";
}

/// Key-value record keys.
pub mod keys {
    pub const OAUTH_TOKENS: &str = "oauth:tokens";
    pub const SYNC_STATE: &str = "sync:state";
    pub const CATALOG_ID: &str = "catalog:id";
    pub const RATE_UPSTREAM: &str = "rate:upstream";
    pub const FLAGS_PREFIX: &str = "flags:";
    pub const SLUG_PREFIX: &str = "slug:";
    pub const SESSION_PREFIX: &str = "session:";

    pub fn flags(album_id: &str) -> String {
        format!("{FLAGS_PREFIX}{album_id}")
    }

    pub fn slug(slug: &str) -> String {
        format!("{SLUG_PREFIX}{slug}")
    }

    pub fn album_sync(album_id: &str) -> String {
        format!("sync:album:{album_id}")
    }

    pub fn session(token: &str) -> String {
        format!("{SESSION_PREFIX}{token}")
    }
}

/// Blob store object paths.
pub mod paths {
    use crate::models::RenditionSize;

    pub const ALBUMS_INDEX: &str = "albums/metadata.json";

    pub fn album_metadata(album_id: &str) -> String {
        format!("albums/{album_id}/metadata.json")
    }

    pub fn album_detail(album_id: &str) -> String {
        format!("albums/{album_id}/detail.json")
    }

    pub fn asset_metadata(asset_id: &str) -> String {
        format!("assets/{asset_id}/metadata.json")
    }

    pub fn rendition(asset_id: &str, size: RenditionSize) -> String {
        format!("assets/{asset_id}/renditions/{}.jpg", size.as_str())
    }
}

/// `Cache-Control` values attached to stored objects.
pub mod cache_control {
    /// Mutable JSON indexes and album documents.
    pub const JSON: &str = "public, max-age=3600";
    /// Per-asset metadata.
    pub const ASSET_METADATA: &str = "public, max-age=86400";
    /// Rendition binaries never change once written.
    pub const RENDITION: &str = "public, max-age=31536000, immutable";
}
