// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read path for the public gallery. Serves only from the cache.

use crate::db::{CacheDb, ObjectMeta};
use crate::error::AppError;
use crate::models::{Album, AlbumDetail, AlbumFlags, RenditionSize};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A public album with its publishing flags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryAlbum {
    #[serde(flatten)]
    pub album: Album,
    pub slug: String,
    pub featured: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumsStats {
    pub total: usize,
    pub public: usize,
    pub featured: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct GalleryReader {
    db: CacheDb,
}

impl GalleryReader {
    pub fn new(db: CacheDb) -> Self {
        Self { db }
    }

    fn to_gallery(album: Album, flags: &AlbumFlags) -> GalleryAlbum {
        GalleryAlbum {
            slug: flags.slug.clone().unwrap_or_else(|| album.id.clone()),
            featured: flags.featured,
            album,
        }
    }

    /// Public albums from the index, featured first.
    pub async fn public_albums(&self) -> Result<Vec<GalleryAlbum>, AppError> {
        let index = self.db.get_albums_index().await?.unwrap_or_default();
        let mut albums = Vec::new();
        for album in index.albums {
            if let Some(flags) = self.db.get_flags(&album.id).await? {
                if flags.public {
                    albums.push(Self::to_gallery(album, &flags));
                }
            }
        }
        albums.sort_by_key(|a| !a.featured);
        Ok(albums)
    }

    /// Resolve a slug alias or album id to a public album id.
    async fn resolve(&self, slug_or_id: &str) -> Result<Option<(String, AlbumFlags)>, AppError> {
        let album_id = match self.db.get_slug(slug_or_id).await? {
            Some(mapping) => mapping.album_id,
            None => slug_or_id.to_string(),
        };
        Ok(self
            .db
            .get_flags(&album_id)
            .await?
            .filter(|f| f.public)
            .map(|flags| (album_id, flags)))
    }

    pub async fn album_by_slug_or_id(&self, slug_or_id: &str) -> Result<Option<GalleryAlbum>, AppError> {
        let Some((album_id, flags)) = self.resolve(slug_or_id).await? else {
            return Ok(None);
        };
        let album = match self.db.get_album(&album_id).await? {
            Some(album) => Some(album),
            None => self
                .db
                .get_albums_index()
                .await?
                .and_then(|index| index.albums.into_iter().find(|a| a.id == album_id)),
        };
        Ok(album.map(|album| Self::to_gallery(album, &flags)))
    }

    /// Cached asset listing of a public album.
    pub async fn album_detail(&self, slug_or_id: &str) -> Result<Option<AlbumDetail>, AppError> {
        match self.resolve(slug_or_id).await? {
            Some((album_id, _)) => self.db.get_album_detail(&album_id).await,
            None => Ok(None),
        }
    }

    pub async fn rendition(
        &self,
        asset_id: &str,
        size: RenditionSize,
    ) -> Result<Option<(Vec<u8>, ObjectMeta)>, AppError> {
        self.db.get_rendition(asset_id, size).await
    }

    pub async fn albums_stats(&self) -> Result<AlbumsStats, AppError> {
        let index = self.db.get_albums_index().await?.unwrap_or_default();
        let mut public = 0;
        let mut featured = 0;
        for id in self.db.flagged_album_ids().await? {
            if let Some(flags) = self.db.get_flags(&id).await? {
                public += usize::from(flags.public);
                featured += usize::from(flags.public && flags.featured);
            }
        }
        Ok(AlbumsStats {
            total: index.total_count,
            public,
            featured,
            last_sync: self.db.get_sync_state().await?.last_sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlbumSubtype, AlbumsIndex};

    fn album(id: &str) -> Album {
        Album {
            id: id.to_string(),
            name: format!("Album {}", id),
            subtype: AlbumSubtype::Collection,
            parent_id: None,
            created: String::new(),
            updated: String::new(),
            cover: None,
            assets: None,
        }
    }

    async fn seeded() -> CacheDb {
        let db = CacheDb::in_memory();
        let mut index = AlbumsIndex::default();
        index.replace(&[album("a"), album("b"), album("c")]);
        db.put_albums_index(&index).await.unwrap();

        let public = |featured| AlbumFlags {
            public: true,
            featured,
            ..Default::default()
        };
        db.set_flags("a", &public(false)).await.unwrap();
        db.set_flags("b", &AlbumFlags::default()).await.unwrap();
        db.set_flags(
            "c",
            &AlbumFlags {
                slug: Some("coast".to_string()),
                ..public(true)
            },
        )
        .await
        .unwrap();
        db.set_slug("coast", "c").await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_public_albums_featured_first() {
        let gallery = GalleryReader::new(seeded().await);
        let albums = gallery.public_albums().await.unwrap();
        let ids: Vec<_> = albums.iter().map(|a| a.album.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(albums[0].slug, "coast");
        assert_eq!(albums[1].slug, "a");
    }

    #[tokio::test]
    async fn test_lookup_by_slug_hides_private() {
        let gallery = GalleryReader::new(seeded().await);
        let found = gallery.album_by_slug_or_id("coast").await.unwrap().unwrap();
        assert_eq!(found.album.id, "c");
        assert!(gallery.album_by_slug_or_id("b").await.unwrap().is_none());
        assert!(gallery.album_by_slug_or_id("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let stats = GalleryReader::new(seeded().await).albums_stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.public, 2);
        assert_eq!(stats.featured, 1);
        assert!(stats.last_sync.is_none());
    }
}
