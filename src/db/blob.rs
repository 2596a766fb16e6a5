// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Blob store for JSON documents and rendition binaries.
//!
//! Objects are addressed by hierarchical paths such as
//! `albums/{id}/detail.json` and carry content-type and cache-lifetime
//! metadata set at write time.

use crate::db::cache_control;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io;

/// Sidecar directory holding object metadata in [`FsBlobStore`].
const META_DIR: &str = ".meta";

/// Per-object metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub content_type: String,
    pub cache_control: String,
    /// Filled in by the store on write.
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(content_type: &str, cache_control: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            cache_control: cache_control.to_string(),
            size: 0,
            updated_at: None,
        }
    }

    /// Mutable JSON document.
    pub fn json() -> Self {
        Self::new("application/json", cache_control::JSON)
    }

    /// Per-asset metadata document.
    pub fn asset_metadata() -> Self {
        Self::new("application/json", cache_control::ASSET_METADATA)
    }

    /// Immutable rendition binary; content type follows the path extension.
    pub fn rendition(path: &str) -> Self {
        Self::new(content_type_for(path), cache_control::RENDITION)
    }
}

/// Content type derived from the path extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => "application/json",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Reject absolute paths and `..` components.
pub fn validate_path(path: &str) -> Result<(), AppError> {
    if path.is_empty() {
        return Err(AppError::BadRequest("Empty object path".to_string()));
    }
    let valid = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !valid || path.starts_with(META_DIR) {
        return Err(AppError::BadRequest(format!("Invalid object path: {}", path)));
    }
    Ok(())
}

/// Object store for large documents and binaries.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>, AppError>;

    /// Overwrite the object at `path`. `meta.size` and `meta.updated_at` are set by the store.
    async fn put(&self, path: &str, data: Vec<u8>, meta: ObjectMeta) -> Result<(), AppError>;

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>, AppError>;

    async fn exists(&self, path: &str) -> Result<bool, AppError> {
        Ok(self.head(path).await?.is_some())
    }

    /// All object paths starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, AppError>;

    async fn delete(&self, path: &str) -> Result<(), AppError>;
}

fn stamp(mut meta: ObjectMeta, size: usize) -> ObjectMeta {
    meta.size = size as u64;
    meta.updated_at = Some(Utc::now());
    meta
}

/// Process-local blob store.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<DashMap<String, (Vec<u8>, ObjectMeta)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>, AppError> {
        Ok(self.objects.get(path).map(|entry| entry.value().clone()))
    }

    async fn put(&self, path: &str, data: Vec<u8>, meta: ObjectMeta) -> Result<(), AppError> {
        validate_path(path)?;
        let meta = stamp(meta, data.len());
        self.objects.insert(path.to_string(), (data, meta));
        Ok(())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>, AppError> {
        Ok(self.objects.get(path).map(|entry| entry.value().1.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let mut paths: Vec<String> = self
            .objects
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        self.objects.remove(path);
        Ok(())
    }
}

/// Filesystem blob store rooted at a directory.
///
/// Object data lives at `<root>/<path>`, metadata at `<root>/.meta/<path>.json`.
/// Writes go to temporary files that are renamed into place.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn meta_path(&self, path: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{path}.json"))
    }

    async fn read_meta(&self, path: &str) -> Result<Option<ObjectMeta>, AppError> {
        let meta_path = self.meta_path(path);
        let bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("read metadata", &meta_path, e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                tracing::warn!(path = ?meta_path, error = %e, "Failed to parse object metadata");
                Ok(None)
            }
        }
    }
}

fn storage_error(action: &str, path: &Path, err: io::Error) -> AppError {
    AppError::Storage(format!("Failed to {} {}: {}", action, path.display(), err))
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_error("create directory", parent, e))?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    if let Err(e) = fs::write(&temp, data).await {
        let _ = fs::remove_file(&temp).await;
        return Err(storage_error("write", &temp, e));
    }
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(storage_error("rename", &temp, e));
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), AppError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(storage_error("remove", path, e)),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>, AppError> {
        validate_path(path)?;
        let Some(meta) = self.read_meta(path).await? else {
            return Ok(None);
        };

        let data_path = self.data_path(path);
        match fs::read(&data_path).await {
            Ok(data) => Ok(Some((data, meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &data_path, e)),
        }
    }

    async fn put(&self, path: &str, data: Vec<u8>, meta: ObjectMeta) -> Result<(), AppError> {
        validate_path(path)?;
        let meta = stamp(meta, data.len());
        let meta_json = serde_json::to_vec(&meta)?;

        // Data first: an object without metadata reads as absent.
        write_atomic(&self.data_path(path), &data).await?;
        write_atomic(&self.meta_path(path), &meta_json).await?;

        tracing::debug!(path, size = meta.size, "Stored object");
        Ok(())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>, AppError> {
        validate_path(path)?;
        let Some(meta) = self.read_meta(path).await? else {
            return Ok(None);
        };
        let present = fs::try_exists(self.data_path(path))
            .await
            .map_err(|e| storage_error("stat", &self.data_path(path), e))?;
        Ok(present.then_some(meta))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(storage_error("list", &dir, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| storage_error("list", &dir, e))?
            {
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .collect::<Vec<_>>()
                    .join("/");

                if relative == META_DIR || relative.ends_with(".tmp") {
                    continue;
                }

                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| storage_error("stat", &path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if relative.starts_with(prefix) {
                    found.push(relative);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        validate_path(path)?;
        remove_if_present(&self.data_path(path)).await?;
        remove_if_present(&self.meta_path(path)).await
    }
}
