// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync orchestration between the Lightroom catalog and the local cache.
//!
//! Two tracks are driven here:
//! - Album listing: paginated catalog listing into `albums/metadata.json`,
//!   resumable through the cursor in `sync:state`
//! - Per-album assets: asset listing into `albums/{id}/detail.json` plus a
//!   bounded rendition download pass, resumable through `sync:album:{id}`
//!
//! Authentication and budget failures abort a track. Failures of a single
//! album, asset or rendition are recorded in the report and the track goes on.

use crate::config::SyncSettings;
use crate::db::CacheDb;
use crate::error::AppError;
use crate::models::{
    AlbumDetail, AlbumSubtype, AlbumsIndex, Asset, PageCursor, RateLimitStatus, RenditionSize,
    SyncErrorEntry, SyncState,
};
use crate::services::lightroom::{AlbumListOptions, LightroomClient};
use crate::time_utils::is_within;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Upstream page size ceiling for album listing.
const MAX_ALBUM_PAGE_SIZE: u32 = 250;

/// Options for one album listing pass.
#[derive(Debug, Clone, Default)]
pub struct AlbumSyncOptions {
    /// Ignore the minimum interval and the budget floor.
    pub force: bool,
    /// Page size override (capped at 250).
    pub limit: Option<u32>,
    /// Discard any saved cursor and start from the first page.
    pub restart: bool,
    pub subtype: Option<AlbumSubtype>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumSyncReport {
    pub album_ids: Vec<String>,
    pub pages_fetched: u32,
    pub total_synced: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub errors: Vec<SyncErrorEntry>,
    pub rate_limits: RateLimitStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlbumSyncOutcome {
    /// The previous pass finished within the minimum interval.
    Skipped {
        #[serde(rename = "lastSync")]
        last_sync: DateTime<Utc>,
        #[serde(rename = "nextSyncAvailable")]
        next_sync_available: DateTime<Utc>,
    },
    Completed(AlbumSyncReport),
}

/// Options for one per-album asset/rendition pass.
#[derive(Debug, Clone, Default)]
pub struct AssetSyncOptions {
    /// Ignore the freshness window and the budget floor.
    pub force: bool,
    /// Cap on assets selected for rendition download.
    pub max_assets: Option<usize>,
    /// Rendition sizes to cache; defaults to the configured set.
    pub sizes: Option<Vec<RenditionSize>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumAssetsReport {
    pub album_id: String,
    pub assets_found: usize,
    pub pages_fetched: u32,
    pub has_more: bool,
    /// Assets selected for the rendition pass.
    pub assets_processed: usize,
    pub renditions_downloaded: usize,
    /// Assets with every required size cached after the pass.
    pub renditions_synced: usize,
    pub errors: Vec<SyncErrorEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlbumAssetsOutcome {
    Skipped {
        #[serde(rename = "albumId")]
        album_id: String,
        #[serde(rename = "lastSynced")]
        last_synced: DateTime<Utc>,
    },
    Completed(AlbumAssetsReport),
}

/// Result of the per-album track for one public album.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAlbumSync {
    pub album_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AlbumAssetsOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Drives both sync tracks against one Lightroom client.
#[derive(Clone)]
pub struct SyncOrchestrator {
    db: CacheDb,
    client: LightroomClient,
    settings: SyncSettings,
    /// Restrict album listing to children of this collection set.
    collection_set_id: Option<String>,
}

impl SyncOrchestrator {
    pub fn new(
        db: CacheDb,
        client: LightroomClient,
        settings: SyncSettings,
        collection_set_id: Option<String>,
    ) -> Self {
        Self {
            db,
            client,
            settings,
            collection_set_id,
        }
    }

    pub fn client(&self) -> &LightroomClient {
        &self.client
    }

    /// Catalog id from the KV cache, fetched and cached on a miss.
    async fn catalog_id(&self) -> Result<String, AppError> {
        if let Some(id) = self.db.get_catalog_id().await? {
            return Ok(id);
        }
        let catalog = self.client.get_catalog().await?;
        self.db.set_catalog_id(&catalog.id).await?;
        tracing::info!(catalog_id = %catalog.id, "Cached catalog id");
        Ok(catalog.id)
    }

    // ─── Album listing track ─────────────────────────────────────

    pub async fn sync_albums(&self, options: AlbumSyncOptions) -> Result<AlbumSyncOutcome, AppError> {
        let now = Utc::now();
        let mut state = self.db.get_sync_state().await?;
        if options.restart {
            state.cursor = None;
        }

        if !options.force {
            if let Some(last_sync) = state.last_sync {
                if is_within(last_sync, self.settings.min_sync_interval, now) {
                    let interval = chrono::Duration::from_std(self.settings.min_sync_interval)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                    tracing::info!(last_sync = %last_sync, "Album sync skipped, synced recently");
                    return Ok(AlbumSyncOutcome::Skipped {
                        last_sync,
                        next_sync_available: last_sync + interval,
                    });
                }
            }
        }

        // One call per page plus the catalog lookup.
        let required = self.settings.max_album_pages + 1;
        self.client
            .limiter()
            .ensure_budget(required, options.force)
            .await?;

        let mut pager = PageCursor::resume(state.cursor.clone(), self.settings.max_album_pages);
        let appending = pager.cursor.is_some();
        let page_size = options
            .limit
            .unwrap_or(self.settings.album_page_size)
            .clamp(1, MAX_ALBUM_PAGE_SIZE);

        tracing::info!(
            appending,
            page_size,
            max_pages = pager.max_pages,
            "Starting album listing sync"
        );

        let mut index = if appending {
            self.db.get_albums_index().await?.unwrap_or_default()
        } else {
            AlbumsIndex::default()
        };
        let mut album_ids = Vec::new();
        let mut errors = Vec::new();
        let mut listing_complete = true;

        let catalog_id = match self.catalog_id().await {
            Ok(id) => id,
            Err(e) => {
                self.save_failed_attempt(&mut state, &pager, &e, now).await?;
                return Err(e);
            }
        };

        while pager.can_fetch() {
            let list_options = AlbumListOptions {
                limit: Some(page_size),
                cursor: pager.cursor.clone(),
                subtype: options.subtype,
                parent: self.collection_set_id.clone(),
            };

            let page = match self.client.list_albums(&catalog_id, &list_options).await {
                Ok(page) => page,
                Err(e) if e.aborts_sync() => {
                    // Pages fetched before the failure are kept, since the saved cursor is past them.
                    self.persist_index(&mut index, &pager, now, &mut errors).await;
                    state.total_synced += album_ids.len() as u64;
                    state.last_batch_size = album_ids.len() as u32;
                    state.record_errors(&errors);
                    self.save_failed_attempt(&mut state, &pager, &e, now).await?;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, page = pager.page_index, "Album page fetch failed");
                    errors.push(
                        SyncErrorEntry::new("albums", e.to_string()).with_status(e.status()),
                    );
                    listing_complete = false;
                    break;
                }
            };

            let mut stored = Vec::with_capacity(page.albums.len());
            for album in page.albums {
                match self.db.put_album(&album).await {
                    Ok(()) => {
                        tracing::debug!(album_id = %album.id, name = %album.name, "Stored album metadata");
                        album_ids.push(album.id.clone());
                        stored.push(album);
                    }
                    Err(e) => {
                        tracing::error!(album_id = %album.id, error = %e, "Failed to store album");
                        errors.push(SyncErrorEntry::new(&album.id, e.to_string()));
                    }
                }
            }
            index.merge(&stored);
            pager.advance(page.next_cursor);

            if !pager.has_more() {
                break;
            }
        }

        self.persist_index(&mut index, &pager, now, &mut errors).await;

        state.cursor = pager.cursor.clone();
        state.has_more = pager.has_more();
        state.total_synced += album_ids.len() as u64;
        state.last_batch_size = album_ids.len() as u32;
        state.last_attempt = Some(now);
        if listing_complete {
            state.last_sync = Some(now);
        }
        state.record_errors(&errors);
        self.db.set_sync_state(&state).await?;

        tracing::info!(
            albums = album_ids.len(),
            pages = pager.page_index,
            total = index.total_count,
            has_more = state.has_more,
            errors = errors.len(),
            "Album listing sync finished"
        );

        Ok(AlbumSyncOutcome::Completed(AlbumSyncReport {
            album_ids,
            pages_fetched: pager.page_index,
            total_synced: state.total_synced,
            next_cursor: state.cursor,
            has_more: state.has_more,
            errors,
            rate_limits: self.client.get_rate_limit_status().await?,
        }))
    }

    /// Write the merged albums index. A pass that fetched nothing leaves the
    /// previous index in place.
    async fn persist_index(
        &self,
        index: &mut AlbumsIndex,
        pager: &PageCursor,
        now: DateTime<Utc>,
        errors: &mut Vec<SyncErrorEntry>,
    ) {
        if pager.page_index == 0 {
            return;
        }
        index.last_updated = Some(now);
        index.next_cursor = pager.cursor.clone();
        if let Err(e) = self.db.put_albums_index(index).await {
            tracing::error!(error = %e, "Failed to update albums index");
            errors.push(SyncErrorEntry::new("albums-index", e.to_string()));
        }
    }

    /// Persist an aborted album-listing attempt so the next run can report it.
    async fn save_failed_attempt(
        &self,
        state: &mut SyncState,
        pager: &PageCursor,
        error: &AppError,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        tracing::error!(error = %error, "Album listing sync aborted");
        state.cursor = pager.cursor.clone();
        state.has_more = pager.has_more();
        state.last_attempt = Some(now);
        state.record_errors(&[SyncErrorEntry::new("albums", error.to_string()).with_status(error.status())]);
        self.db.set_sync_state(state).await
    }

    // ─── Per-album asset track ───────────────────────────────────

    pub async fn sync_album_assets(
        &self,
        album_id: &str,
        options: AssetSyncOptions,
    ) -> Result<AlbumAssetsOutcome, AppError> {
        let now = Utc::now();
        let mut state = self.db.get_album_sync_state(album_id).await?;
        let existing = self.db.get_album_detail(album_id).await?;

        // Only a pass that finished (no abort, no pending cursor) makes the album fresh.
        if !options.force && state.cursor.is_none() {
            if let (Some(last_sync), Some(detail)) = (state.last_sync, &existing) {
                if !detail.has_more && is_within(last_sync, self.settings.album_freshness, now) {
                    tracing::info!(album_id, last_sync = %last_sync, "Album assets fresh, skipping");
                    return Ok(AlbumAssetsOutcome::Skipped {
                        album_id: album_id.to_string(),
                        last_synced: last_sync,
                    });
                }
            }
        }

        let required = self.settings.max_asset_pages + 1;
        self.client
            .limiter()
            .ensure_budget(required, options.force)
            .await?;

        let sizes = options
            .sizes
            .unwrap_or_else(|| self.settings.rendition_sizes.clone());
        let max_assets = options
            .max_assets
            .unwrap_or(self.settings.max_rendition_assets);

        let mut pager = PageCursor::resume(state.cursor.clone(), self.settings.max_asset_pages);
        let mut detail = match existing {
            Some(detail) if pager.cursor.is_some() => detail,
            _ => AlbumDetail::new(album_id, Vec::new(), now),
        };
        let mut errors = Vec::new();
        let mut listing_complete = true;
        let mut fetched = 0usize;

        // The first page and the catalog lookup are independent.
        let (catalog_id, first_page) = match tokio::try_join!(
            self.catalog_id(),
            self.client.list_album_assets(
                album_id,
                self.settings.asset_page_size,
                pager.cursor.as_deref()
            )
        ) {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(album_id, error = %e, "Album asset sync aborted");
                state.last_attempt = Some(now);
                state.record_errors(&[SyncErrorEntry::new(album_id, e.to_string()).with_status(e.status())]);
                self.db.set_album_sync_state(album_id, &state).await?;
                return Err(e);
            }
        };
        fetched += first_page.assets.len();
        detail.merge_assets(first_page.assets);
        pager.advance(first_page.next_cursor);

        while pager.has_more() && pager.can_fetch() {
            match self
                .client
                .list_album_assets(album_id, self.settings.asset_page_size, pager.cursor.as_deref())
                .await
            {
                Ok(page) => {
                    fetched += page.assets.len();
                    detail.merge_assets(page.assets);
                    pager.advance(page.next_cursor);
                }
                Err(e) if e.aborts_sync() => {
                    state.cursor = pager.cursor.clone();
                    state.has_more = true;
                    state.last_attempt = Some(now);
                    state.record_errors(&[SyncErrorEntry::new(album_id, e.to_string()).with_status(e.status())]);
                    self.db.set_album_sync_state(album_id, &state).await?;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(album_id, error = %e, page = pager.page_index, "Asset page fetch failed");
                    errors.push(SyncErrorEntry::new(album_id, e.to_string()).with_status(e.status()));
                    listing_complete = false;
                    break;
                }
            }
        }

        if pager.has_more() {
            tracing::warn!(album_id, pages = pager.page_index, "Hit page cap, asset listing will resume next pass");
        }

        detail.last_synced = now;
        detail.has_more = pager.has_more();
        self.db.put_album_detail(&detail).await?;

        tracing::info!(
            album_id,
            assets = detail.asset_count,
            pages = pager.page_index,
            "Stored album asset listing"
        );

        let selected = self.select_for_download(&detail.assets, &sizes, max_assets).await?;
        let pass = self
            .download_renditions(&catalog_id, &selected, &mut errors)
            .await;

        detail.renditions_synced = self.count_complete(&detail.assets, &sizes).await?;
        detail.last_rendition_sync = Some(Utc::now());
        self.db.put_album_detail(&detail).await?;

        state.cursor = pager.cursor.clone();
        state.has_more = pager.has_more();
        state.total_synced = detail.asset_count as u64;
        state.last_batch_size = fetched as u32;
        state.last_attempt = Some(now);
        if listing_complete && pass.is_ok() {
            state.last_sync = Some(now);
        }
        state.record_errors(&errors);
        self.db.set_album_sync_state(album_id, &state).await?;

        let renditions_downloaded = pass?;

        tracing::info!(
            album_id,
            selected = selected.len(),
            downloaded = renditions_downloaded,
            complete = detail.renditions_synced,
            errors = errors.len(),
            "Album asset sync finished"
        );

        Ok(AlbumAssetsOutcome::Completed(AlbumAssetsReport {
            album_id: album_id.to_string(),
            assets_found: detail.asset_count,
            pages_fetched: pager.page_index,
            has_more: detail.has_more,
            assets_processed: selected.len(),
            renditions_downloaded,
            renditions_synced: detail.renditions_synced,
            errors,
        }))
    }

    /// First `max_assets` assets still missing one of `sizes`, with the missing sizes.
    async fn select_for_download(
        &self,
        assets: &[Asset],
        sizes: &[RenditionSize],
        max_assets: usize,
    ) -> Result<Vec<(Asset, Vec<RenditionSize>)>, AppError> {
        let mut selected = Vec::new();
        for asset in assets {
            if selected.len() >= max_assets {
                break;
            }
            let mut missing = Vec::new();
            for size in sizes {
                if !self.db.has_rendition(&asset.id, *size).await? {
                    missing.push(*size);
                }
            }
            if !missing.is_empty() {
                selected.push((asset.clone(), missing));
            }
        }
        Ok(selected)
    }

    /// Download missing renditions one at a time.
    ///
    /// Item failures go into `errors`; an aborting failure stops the pass
    /// and is returned after the work done so far is kept.
    async fn download_renditions(
        &self,
        catalog_id: &str,
        selected: &[(Asset, Vec<RenditionSize>)],
        errors: &mut Vec<SyncErrorEntry>,
    ) -> Result<usize, AppError> {
        let mut downloaded = 0;
        let mut first = true;

        for (asset, missing) in selected {
            if let Err(e) = self.db.put_asset_metadata(asset).await {
                tracing::error!(asset_id = %asset.id, error = %e, "Failed to store asset metadata");
                errors.push(SyncErrorEntry::new(&asset.id, e.to_string()));
                continue;
            }

            for size in missing {
                if !first && !self.settings.rendition_delay.is_zero() {
                    tokio::time::sleep(self.settings.rendition_delay).await;
                }
                first = false;

                let result = match self.client.fetch_rendition(catalog_id, &asset.id, *size).await {
                    Ok(bytes) => self.db.put_rendition(&asset.id, *size, bytes).await,
                    Err(e) => Err(e),
                };

                match result {
                    Ok(()) => {
                        tracing::debug!(asset_id = %asset.id, size = %size, "Stored rendition");
                        downloaded += 1;
                    }
                    Err(e) if e.aborts_sync() => {
                        tracing::error!(asset_id = %asset.id, size = %size, error = %e, "Rendition pass aborted");
                        errors.push(
                            SyncErrorEntry::new(&asset.id, e.to_string())
                                .with_size(size.as_str())
                                .with_status(e.status()),
                        );
                        return Err(e);
                    }
                    Err(e) => {
                        tracing::warn!(asset_id = %asset.id, size = %size, error = %e, "Rendition download failed");
                        errors.push(
                            SyncErrorEntry::new(&asset.id, e.to_string())
                                .with_size(size.as_str())
                                .with_status(e.status()),
                        );
                    }
                }
            }
        }
        Ok(downloaded)
    }

    async fn count_complete(&self, assets: &[Asset], sizes: &[RenditionSize]) -> Result<usize, AppError> {
        let mut complete = 0;
        'assets: for asset in assets {
            for size in sizes {
                if !self.db.has_rendition(&asset.id, *size).await? {
                    continue 'assets;
                }
            }
            complete += 1;
        }
        Ok(complete)
    }

    // ─── Public albums ───────────────────────────────────────────

    /// Run the per-album track for every public album.
    ///
    /// Per-album failures are collected; an aborting failure stops the run
    /// after being recorded for the album that hit it.
    pub async fn sync_public_albums(&self, force: bool) -> Result<Vec<PublicAlbumSync>, AppError> {
        let mut results = Vec::new();
        for album_id in self.db.flagged_album_ids().await? {
            let is_public = self
                .db
                .get_flags(&album_id)
                .await?
                .is_some_and(|f| f.public);
            if !is_public {
                continue;
            }

            let options = AssetSyncOptions {
                force,
                ..Default::default()
            };
            match self.sync_album_assets(&album_id, options).await {
                Ok(outcome) => results.push(PublicAlbumSync {
                    album_id,
                    outcome: Some(outcome),
                    error: None,
                }),
                Err(e) => {
                    let abort = e.aborts_sync();
                    tracing::warn!(album_id = %album_id, error = %e, "Public album sync failed");
                    results.push(PublicAlbumSync {
                        album_id,
                        outcome: None,
                        error: Some(e.to_string()),
                    });
                    if abort {
                        break;
                    }
                }
            }
        }
        Ok(results)
    }
}
