// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Publishing flags and slug aliases. Written by publishing actions, never by sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-album visibility flags stored at `flags:{albumId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumFlags {
    pub public: bool,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpublished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AlbumFlags {
    /// The custom slug, if one differs from the album id.
    pub fn custom_slug<'a>(&'a self, album_id: &str) -> Option<&'a str> {
        self.slug.as_deref().filter(|slug| *slug != album_id)
    }
}

/// Slug alias stored at `slug:{slug}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlugMapping {
    pub album_id: String,
}
