// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Album, asset and rendition models as cached for the gallery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lightroom album subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumSubtype {
    /// Plain collection (a leaf gallery).
    Collection,
    /// Folder grouping other albums.
    CollectionSet,
    Smart,
    Topic,
}

impl AlbumSubtype {
    pub fn as_str(self) -> &'static str {
        match self {
            AlbumSubtype::Collection => "collection",
            AlbumSubtype::CollectionSet => "collection_set",
            AlbumSubtype::Smart => "smart",
            AlbumSubtype::Topic => "topic",
        }
    }

    /// Parse an upstream subtype, treating unknown values as plain collections.
    pub fn from_upstream(raw: Option<&str>) -> Self {
        match raw {
            Some("collection_set") => AlbumSubtype::CollectionSet,
            Some("smart") => AlbumSubtype::Smart,
            Some("topic") => AlbumSubtype::Topic,
            _ => AlbumSubtype::Collection,
        }
    }
}

/// Fixed set of rendition size classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenditionSize {
    #[serde(rename = "640")]
    S640,
    #[serde(rename = "1280")]
    S1280,
    #[serde(rename = "2048")]
    S2048,
    #[serde(rename = "2560")]
    S2560,
    #[serde(rename = "fullsize")]
    Fullsize,
}

impl RenditionSize {
    /// Size classes advertised for every asset.
    pub const ADVERTISED: [RenditionSize; 4] = [
        RenditionSize::S640,
        RenditionSize::S1280,
        RenditionSize::S2048,
        RenditionSize::S2560,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RenditionSize::S640 => "640",
            RenditionSize::S1280 => "1280",
            RenditionSize::S2048 => "2048",
            RenditionSize::S2560 => "2560",
            RenditionSize::Fullsize => "fullsize",
        }
    }

    /// Long-edge pixel width, unknown for full size.
    pub fn width(self) -> Option<u32> {
        match self {
            RenditionSize::S640 => Some(640),
            RenditionSize::S1280 => Some(1280),
            RenditionSize::S2048 => Some(2048),
            RenditionSize::S2560 => Some(2560),
            RenditionSize::Fullsize => None,
        }
    }
}

impl fmt::Display for RenditionSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenditionSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "640" => Ok(RenditionSize::S640),
            "1280" => Ok(RenditionSize::S1280),
            "2048" => Ok(RenditionSize::S2048),
            "2560" => Ok(RenditionSize::S2560),
            "fullsize" => Ok(RenditionSize::Fullsize),
            other => Err(format!("Invalid rendition size: {}", other)),
        }
    }
}

/// Pre-sized derived image of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rendition {
    pub size: RenditionSize,
    /// Upstream URL of the rendition.
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// One photo in an album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_date: Option<String>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub renditions: Vec<Rendition>,
}

/// Album (or collection set) as cached by sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub subtype: AlbumSubtype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created: String,
    pub updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<Asset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<Vec<Asset>>,
}

impl Album {
    /// Collection sets are roots of the album forest.
    pub fn is_root(&self) -> bool {
        self.subtype == AlbumSubtype::CollectionSet || self.parent_id.is_none()
    }
}

/// The `albums/metadata.json` index document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumsIndex {
    pub albums: Vec<Album>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl AlbumsIndex {
    /// Merge albums into the index, replacing entries with the same id in place.
    pub fn merge(&mut self, albums: &[Album]) {
        for album in albums {
            match self.albums.iter_mut().find(|a| a.id == album.id) {
                Some(existing) => *existing = album.clone(),
                None => self.albums.push(album.clone()),
            }
        }
        self.total_count = self.albums.len();
    }

    /// Replace the index contents wholesale.
    pub fn replace(&mut self, albums: &[Album]) {
        self.albums = albums.to_vec();
        self.total_count = self.albums.len();
    }
}

/// The `albums/{id}/detail.json` document written by the per-album sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumDetail {
    pub id: String,
    pub assets: Vec<Asset>,
    pub last_synced: DateTime<Utc>,
    pub asset_count: usize,
    /// Assets for which every configured rendition size is cached.
    #[serde(default)]
    pub renditions_synced: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rendition_sync: Option<DateTime<Utc>>,
    /// The asset listing stopped at the page cap.
    #[serde(default)]
    pub has_more: bool,
}

impl AlbumDetail {
    pub fn new(id: &str, assets: Vec<Asset>, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            asset_count: assets.len(),
            assets,
            last_synced: synced_at,
            renditions_synced: 0,
            last_rendition_sync: None,
            has_more: false,
        }
    }

    /// Append assets not already present (by id).
    pub fn merge_assets(&mut self, assets: Vec<Asset>) {
        for asset in assets {
            if !self.assets.iter().any(|a| a.id == asset.id) {
                self.assets.push(asset);
            }
        }
        self.asset_count = self.assets.len();
    }
}
