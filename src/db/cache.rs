// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed facade over the key-value and blob stores.
//!
//! Provides high-level operations for:
//! - OAuth tokens, sessions and rate counters (KV)
//! - Sync progress and publishing flags (KV)
//! - Album index, album documents, asset metadata and renditions (blobs)

use crate::config::{Config, StorageBackend};
use crate::db::blob::{BlobStore, FsBlobStore, MemoryBlobStore, ObjectMeta};
use crate::db::firestore::FirestoreKv;
use crate::db::kv::{KvStore, MemoryKv};
use crate::db::{keys, paths};
use crate::error::AppError;
use crate::models::{
    Album, AlbumDetail, AlbumFlags, AlbumsIndex, Asset, OAuthTokenSet, RateCounter, RenditionSize,
    SlugMapping, SyncState, UpstreamRateInfo,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Handles to both durable stores.
#[derive(Clone)]
pub struct CacheDb {
    kv: Arc<dyn KvStore>,
    blobs: Arc<dyn BlobStore>,
}

impl CacheDb {
    pub fn new(kv: Arc<dyn KvStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { kv, blobs }
    }

    /// Process-local stores, for tests and development.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()), Arc::new(MemoryBlobStore::new()))
    }

    /// Build the stores selected by configuration.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        match config.storage_backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; cached data will not persist");
                Ok(Self::in_memory())
            }
            StorageBackend::Durable => {
                let kv = FirestoreKv::new(&config.gcp_project_id).await?;
                let blobs = FsBlobStore::new(&config.cache_dir);
                tracing::info!(cache_dir = %config.cache_dir.display(), "Using durable storage");
                Ok(Self::new(Arc::new(kv), Arc::new(blobs)))
            }
        }
    }

    pub fn kv(&self) -> &dyn KvStore {
        self.kv.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    // ─── Generic JSON helpers ────────────────────────────────────

    /// Read a KV record. Corrupt JSON is logged and treated as absent.
    pub async fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring corrupt record");
                Ok(None)
            }
        }
    }

    pub async fn put_record<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), AppError> {
        self.kv.put(key, serde_json::to_string(value)?).await
    }

    pub async fn delete_record(&self, key: &str) -> Result<(), AppError> {
        self.kv.delete(key).await
    }

    /// Read a JSON document. Corrupt JSON is logged and treated as absent.
    pub async fn get_document<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, AppError> {
        let Some((bytes, _)) = self.blobs.get(path).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(path, error = %e, "Ignoring corrupt document");
                Ok(None)
            }
        }
    }

    /// Overwrite a JSON document in full.
    pub async fn put_document<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        meta: ObjectMeta,
    ) -> Result<(), AppError> {
        let bytes = serde_json::to_vec(value)?;
        self.blobs.put(path, bytes, meta).await
    }

    // ─── Tokens ──────────────────────────────────────────────────

    pub async fn get_tokens(&self) -> Result<Option<OAuthTokenSet>, AppError> {
        self.get_record(keys::OAUTH_TOKENS).await
    }

    pub async fn set_tokens(&self, tokens: &OAuthTokenSet) -> Result<(), AppError> {
        self.put_record(keys::OAUTH_TOKENS, tokens).await
    }

    pub async fn delete_tokens(&self) -> Result<(), AppError> {
        self.delete_record(keys::OAUTH_TOKENS).await
    }

    // ─── Rate counters ───────────────────────────────────────────

    pub async fn get_counter(&self, key: &str) -> Result<Option<RateCounter>, AppError> {
        self.get_record(key).await
    }

    pub async fn set_counter(&self, key: &str, counter: &RateCounter) -> Result<(), AppError> {
        self.put_record(key, counter).await
    }

    pub async fn get_upstream_rate(&self) -> Result<Option<UpstreamRateInfo>, AppError> {
        self.get_record(keys::RATE_UPSTREAM).await
    }

    pub async fn set_upstream_rate(&self, info: &UpstreamRateInfo) -> Result<(), AppError> {
        self.put_record(keys::RATE_UPSTREAM, info).await
    }

    // ─── Sync progress ───────────────────────────────────────────

    pub async fn get_sync_state(&self) -> Result<SyncState, AppError> {
        Ok(self
            .get_record(keys::SYNC_STATE)
            .await?
            .unwrap_or_default())
    }

    pub async fn set_sync_state(&self, state: &SyncState) -> Result<(), AppError> {
        self.put_record(keys::SYNC_STATE, state).await
    }

    pub async fn get_album_sync_state(&self, album_id: &str) -> Result<SyncState, AppError> {
        Ok(self
            .get_record(&keys::album_sync(album_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn set_album_sync_state(
        &self,
        album_id: &str,
        state: &SyncState,
    ) -> Result<(), AppError> {
        self.put_record(&keys::album_sync(album_id), state).await
    }

    pub async fn get_catalog_id(&self) -> Result<Option<String>, AppError> {
        self.get_record(keys::CATALOG_ID).await
    }

    pub async fn set_catalog_id(&self, catalog_id: &str) -> Result<(), AppError> {
        self.put_record(keys::CATALOG_ID, catalog_id).await
    }

    // ─── Flags and slugs ─────────────────────────────────────────

    pub async fn get_flags(&self, album_id: &str) -> Result<Option<AlbumFlags>, AppError> {
        self.get_record(&keys::flags(album_id)).await
    }

    pub async fn set_flags(&self, album_id: &str, flags: &AlbumFlags) -> Result<(), AppError> {
        self.put_record(&keys::flags(album_id), flags).await
    }

    /// Album ids that have a flags record.
    pub async fn flagged_album_ids(&self) -> Result<Vec<String>, AppError> {
        let keys = self.kv.list(keys::FLAGS_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(keys::FLAGS_PREFIX).map(str::to_string))
            .collect())
    }

    pub async fn get_slug(&self, slug: &str) -> Result<Option<SlugMapping>, AppError> {
        self.get_record(&keys::slug(slug)).await
    }

    pub async fn set_slug(&self, slug: &str, album_id: &str) -> Result<(), AppError> {
        let mapping = SlugMapping {
            album_id: album_id.to_string(),
        };
        self.put_record(&keys::slug(slug), &mapping).await
    }

    pub async fn delete_slug(&self, slug: &str) -> Result<(), AppError> {
        self.delete_record(&keys::slug(slug)).await
    }

    // ─── Album documents ─────────────────────────────────────────

    pub async fn get_albums_index(&self) -> Result<Option<AlbumsIndex>, AppError> {
        self.get_document(paths::ALBUMS_INDEX).await
    }

    pub async fn put_albums_index(&self, index: &AlbumsIndex) -> Result<(), AppError> {
        self.put_document(paths::ALBUMS_INDEX, index, ObjectMeta::json())
            .await
    }

    pub async fn get_album(&self, album_id: &str) -> Result<Option<Album>, AppError> {
        self.get_document(&paths::album_metadata(album_id)).await
    }

    pub async fn put_album(&self, album: &Album) -> Result<(), AppError> {
        self.put_document(&paths::album_metadata(&album.id), album, ObjectMeta::json())
            .await
    }

    pub async fn get_album_detail(&self, album_id: &str) -> Result<Option<AlbumDetail>, AppError> {
        self.get_document(&paths::album_detail(album_id)).await
    }

    pub async fn put_album_detail(&self, detail: &AlbumDetail) -> Result<(), AppError> {
        self.put_document(&paths::album_detail(&detail.id), detail, ObjectMeta::json())
            .await
    }

    pub async fn put_asset_metadata(&self, asset: &Asset) -> Result<(), AppError> {
        self.put_document(
            &paths::asset_metadata(&asset.id),
            asset,
            ObjectMeta::asset_metadata(),
        )
        .await
    }

    // ─── Renditions ──────────────────────────────────────────────

    pub async fn has_rendition(&self, asset_id: &str, size: RenditionSize) -> Result<bool, AppError> {
        self.blobs.exists(&paths::rendition(asset_id, size)).await
    }

    pub async fn put_rendition(
        &self,
        asset_id: &str,
        size: RenditionSize,
        data: Vec<u8>,
    ) -> Result<(), AppError> {
        let path = paths::rendition(asset_id, size);
        let meta = ObjectMeta::rendition(&path);
        self.blobs.put(&path, data, meta).await
    }

    pub async fn get_rendition(
        &self,
        asset_id: &str,
        size: RenditionSize,
    ) -> Result<Option<(Vec<u8>, ObjectMeta)>, AppError> {
        self.blobs.get(&paths::rendition(asset_id, size)).await
    }
}
