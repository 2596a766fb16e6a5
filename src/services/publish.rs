// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Album publishing: visibility flags and slug aliases.

use crate::db::CacheDb;
use crate::error::AppError;
use crate::models::AlbumFlags;
use crate::services::sync::{AssetSyncOptions, SyncOrchestrator};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if SLUG_PATTERN.is_match(slug) {
        Ok(())
    } else {
        Err(ValidationError::new("slug_format"))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[validate(length(min = 1, max = 128))]
    pub album_id: String,
    /// Custom slug; the album id is used when absent.
    #[validate(length(min = 1, max = 64), custom(function = "validate_slug"))]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub album_id: String,
    pub flags: AlbumFlags,
    /// The follow-up asset sync succeeded.
    pub synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Clone)]
pub struct PublishService {
    db: CacheDb,
    sync: Option<SyncOrchestrator>,
}

impl PublishService {
    pub fn new(db: CacheDb, sync: Option<SyncOrchestrator>) -> Self {
        Self { db, sync }
    }

    async fn flags_or_default(&self, album_id: &str) -> Result<AlbumFlags, AppError> {
        Ok(self.db.get_flags(album_id).await?.unwrap_or_default())
    }

    /// Mark an album public under `slug` and sync its assets (best effort).
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishResult, AppError> {
        request
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let album_id = request.album_id;
        let slug = request.slug.unwrap_or_else(|| album_id.clone());

        if slug != album_id {
            if let Some(mapping) = self.db.get_slug(&slug).await? {
                if mapping.album_id != album_id {
                    return Err(AppError::BadRequest(format!("Slug '{}' is already in use", slug)));
                }
            }
        }

        let previous = self.flags_or_default(&album_id).await?;
        if let Some(old) = previous.custom_slug(&album_id) {
            if old != slug {
                self.db.delete_slug(old).await?;
            }
        }

        let now = Utc::now();
        let flags = AlbumFlags {
            public: true,
            featured: previous.featured,
            slug: Some(slug.clone()),
            published_at: Some(now),
            unpublished_at: None,
            updated_at: Some(now),
        };
        self.db.set_flags(&album_id, &flags).await?;
        if slug != album_id {
            self.db.set_slug(&slug, &album_id).await?;
        }
        tracing::info!(album_id = %album_id, slug = %slug, "Album published");

        let warning = match &self.sync {
            Some(sync) => match sync
                .sync_album_assets(&album_id, AssetSyncOptions::default())
                .await
            {
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(album_id = %album_id, error = %e, "Album published, sync will retry later");
                    Some(e.to_string())
                }
            },
            None => Some("Lightroom client not configured, sync skipped".to_string()),
        };

        Ok(PublishResult {
            album_id,
            flags,
            synced: warning.is_none(),
            warning,
        })
    }

    /// Hide an album and drop its custom slug.
    pub async fn unpublish(&self, album_id: &str) -> Result<AlbumFlags, AppError> {
        let mut flags = self
            .db
            .get_flags(album_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No flags for album {}", album_id)))?;

        if let Some(slug) = flags.custom_slug(album_id) {
            self.db.delete_slug(slug).await?;
        }

        let now = Utc::now();
        flags.public = false;
        flags.slug = None;
        flags.unpublished_at = Some(now);
        flags.updated_at = Some(now);
        self.db.set_flags(album_id, &flags).await?;

        tracing::info!(album_id, "Album unpublished");
        Ok(flags)
    }

    pub async fn set_public(&self, album_id: &str, public: bool) -> Result<AlbumFlags, AppError> {
        let mut flags = self.flags_or_default(album_id).await?;
        let now = Utc::now();
        if public && !flags.public {
            flags.published_at = Some(now);
        } else if !public && flags.public {
            flags.unpublished_at = Some(now);
        }
        flags.public = public;
        flags.updated_at = Some(now);
        self.db.set_flags(album_id, &flags).await?;
        Ok(flags)
    }

    pub async fn set_featured(&self, album_id: &str, featured: bool) -> Result<AlbumFlags, AppError> {
        let mut flags = self.flags_or_default(album_id).await?;
        flags.featured = featured;
        flags.updated_at = Some(Utc::now());
        self.db.set_flags(album_id, &flags).await?;
        Ok(flags)
    }
}
