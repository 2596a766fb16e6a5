// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lightroom Partner API client.
//!
//! Handles:
//! - Local budget checks before every request
//! - Bearer token and `X-API-Key` headers
//! - Status mapping (429, 401, other failures) and retry with backoff
//! - Reconciliation against `X-RateLimit-*` response headers
//! - Stripping the `while (1) {}` anti-hijacking prefix
//! - Transforming upstream resources into cached `Album`/`Asset` models

use crate::error::AppError;
use crate::models::{Album, AlbumSubtype, Asset, RateLimitStatus, Rendition, RenditionSize, UpstreamRateInfo};
use crate::services::rate_limit::RateLimiter;
use crate::services::retry::{with_retry, RetryPolicy};
use crate::services::tokens::TokenManager;
use crate::time_utils::parse_reset_header;
use chrono::Utc;
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::LazyLock;

static WHILE1_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^while\s*\(\s*1\s*\)\s*\{\s*\}\s*").unwrap());

/// Dimensions assumed when an asset has no develop crop size.
const DEFAULT_ASSET_WIDTH: u32 = 2048;
const DEFAULT_ASSET_HEIGHT: u32 = 1365;

/// Seconds to wait when a 429 has no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Assets fetched alongside album metadata by `get_album_detail`.
const DETAIL_ASSET_LIMIT: u32 = 100;

/// Remove the anti-JSON-hijacking prefix from a response body.
pub fn strip_while1_prefix(body: &str) -> &str {
    match WHILE1_PREFIX.find(body) {
        Some(m) => &body[m.end()..],
        None => body,
    }
}

/// Extract the `after` cursor from a `links.next.href` value.
pub fn cursor_from_href(href: &str) -> Option<String> {
    let parsed = url::Url::parse(href)
        .or_else(|_| url::Url::parse("http://localhost/").and_then(|base| base.join(href)))
        .ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "after")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn parse_retry_after(headers: &HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn upstream_rate_info(headers: &HeaderMap) -> Option<UpstreamRateInfo> {
    let remaining = header_u32(headers, "x-ratelimit-remaining")?;
    let now = Utc::now();
    Some(UpstreamRateInfo {
        remaining,
        limit: header_u32(headers, "x-ratelimit-limit"),
        reset_at: headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_reset_header(v, now)),
        observed_at: now,
    })
}

// ─── Upstream resource shapes ────────────────────────────────────

/// Paged listing envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
    #[serde(default)]
    pub links: Option<Links>,
}

impl<T> ListResponse<T> {
    pub fn next_cursor(&self) -> Option<String> {
        self.links
            .as_ref()
            .and_then(|l| l.next.as_ref())
            .and_then(|n| cursor_from_href(&n.href))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub next: Option<Href>,
    #[serde(default)]
    pub prev: Option<Href>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Href {
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumResource {
    pub id: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub payload: Option<AlbumPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<IdRef>,
    #[serde(default)]
    pub cover: Option<IdRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetResource {
    pub id: String,
    #[serde(default)]
    pub payload: Option<AssetPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPayload {
    #[serde(default)]
    pub capture_date: Option<String>,
    #[serde(default)]
    pub user_created: Option<String>,
    #[serde(default)]
    pub develop: Option<DevelopSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevelopSettings {
    #[serde(default)]
    pub cropped_width: Option<u32>,
    #[serde(default)]
    pub cropped_height: Option<u32>,
}

/// Entry of an album asset listing (with `embed=asset`).
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumAssetResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub asset: Option<AssetResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One page of albums, transformed.
#[derive(Debug, Clone)]
pub struct AlbumPage {
    pub albums: Vec<Album>,
    pub next_cursor: Option<String>,
}

/// One page of album assets, transformed.
#[derive(Debug, Clone)]
pub struct AssetPage {
    pub assets: Vec<Asset>,
    pub next_cursor: Option<String>,
}

/// Filters for album listing.
#[derive(Debug, Clone, Default)]
pub struct AlbumListOptions {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub subtype: Option<AlbumSubtype>,
    /// Only children of this collection set.
    pub parent: Option<String>,
}

// ─── Transforms ──────────────────────────────────────────────────

/// Rendition descriptors advertised for an asset (approximate 3:2 heights).
pub fn rendition_descriptors(base_url: &str, asset_id: &str) -> Vec<Rendition> {
    RenditionSize::ADVERTISED
        .iter()
        .filter_map(|size| {
            let width = size.width()?;
            Some(Rendition {
                size: *size,
                url: format!("{}/assets/{}/renditions/{}", base_url, asset_id, size),
                width,
                height: (width as f64 * 0.67).round() as u32,
            })
        })
        .collect()
}

pub fn asset_from_resource(base_url: &str, resource: AssetResource) -> Asset {
    let payload = resource.payload.unwrap_or_default();
    let develop = payload.develop.unwrap_or_default();
    Asset {
        caption: payload
            .capture_date
            .clone()
            .or(payload.user_created),
        capture_date: payload.capture_date,
        width: develop
            .cropped_width
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_ASSET_WIDTH),
        height: develop
            .cropped_height
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_ASSET_HEIGHT),
        renditions: rendition_descriptors(base_url, &resource.id),
        id: resource.id,
    }
}

pub fn album_from_resource(resource: AlbumResource) -> Album {
    let payload = resource.payload.unwrap_or_default();
    Album {
        id: resource.id,
        name: payload
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Untitled Album".to_string()),
        subtype: AlbumSubtype::from_upstream(resource.subtype.as_deref()),
        parent_id: payload.parent.map(|p| p.id),
        created: resource.created.unwrap_or_default(),
        updated: resource.updated.unwrap_or_default(),
        // Dimensions are filled in once the cover asset itself is synced.
        cover: payload.cover.map(|c| Asset {
            id: c.id,
            caption: None,
            capture_date: None,
            width: 0,
            height: 0,
            renditions: vec![],
        }),
        assets: None,
    }
}

// ─── Client ──────────────────────────────────────────────────────

/// Rate-limited, retrying Lightroom API client.
#[derive(Clone)]
pub struct LightroomClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl LightroomClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: TokenManager,
        limiter: RateLimiter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            limiter,
            retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Common request path: budget, auth headers, status mapping, reconciliation.
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        accept: &str,
    ) -> Result<reqwest::Response, AppError> {
        self.limiter.check_and_increment().await?;
        let access_token = self.tokens.get_valid_access_token().await?;

        let url = if endpoint.starts_with("http") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.base_url, endpoint)
        };

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&access_token)
            .header(reqwest::header::ACCEPT, accept)
            .header("X-API-Key", self.tokens.client_id());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;

        let status = response.status();
        tracing::debug!(method = %method, endpoint, status = status.as_u16(), "Lightroom API response");

        if let Some(info) = upstream_rate_info(response.headers()) {
            if let Err(e) = self.limiter.reconcile(info).await {
                tracing::warn!(error = %e, "Failed to record upstream rate limit");
            }
        }

        if status.as_u16() == 429 {
            let retry_after_seconds = parse_retry_after(response.headers());
            tracing::warn!(endpoint, retry_after_seconds, "Lightroom rate limit hit (429)");
            return Err(AppError::RateLimited {
                retry_after_seconds,
            });
        }

        if status.as_u16() == 401 {
            tracing::warn!(endpoint, "Lightroom rejected access token (401)");
            self.tokens.forget_cached().await;
            return Err(AppError::AuthFailed);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = strip_while1_prefix(&body).chars().take(200).collect();
            tracing::error!(endpoint, status = status.as_u16(), body = %message, "Lightroom API error");
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, AppError> {
        let response = self
            .send(method, endpoint, query, body, "application/json")
            .await?;
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;

        let cleaned = strip_while1_prefix(&text).trim();
        let cleaned = if cleaned.is_empty() { "{}" } else { cleaned };

        serde_json::from_str(cleaned).map_err(|e| {
            let snippet: String = cleaned.chars().take(200).collect();
            tracing::error!(endpoint, error = %e, body = %snippet, "Invalid JSON from Lightroom API");
            AppError::Internal(anyhow::anyhow!("Invalid JSON response from Lightroom API: {}", e))
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        endpoint: &str,
        query: Vec<(&str, String)>,
    ) -> Result<T, AppError> {
        with_retry(&self.retry, operation, || {
            self.request_json(Method::GET, endpoint, &query, None)
        })
        .await
    }

    // ─── Operations ──────────────────────────────────────────────

    pub async fn get_account(&self) -> Result<serde_json::Value, AppError> {
        self.get_json("get_account", "/account", vec![]).await
    }

    pub async fn get_catalog(&self) -> Result<Catalog, AppError> {
        self.get_json("get_catalog", "/catalog", vec![]).await
    }

    pub async fn list_albums(
        &self,
        catalog_id: &str,
        options: &AlbumListOptions,
    ) -> Result<AlbumPage, AppError> {
        let mut query = Vec::new();
        if let Some(subtype) = options.subtype {
            query.push(("subtype", subtype.as_str().to_string()));
        }
        if let Some(limit) = options.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(parent) = &options.parent {
            query.push(("parent", parent.clone()));
        }
        if let Some(cursor) = &options.cursor {
            query.push(("after", cursor.clone()));
        }

        let endpoint = format!("/catalogs/{}/albums", catalog_id);
        let response: ListResponse<AlbumResource> =
            self.get_json("list_albums", &endpoint, query).await?;

        let next_cursor = response.next_cursor();
        Ok(AlbumPage {
            albums: response
                .resources
                .into_iter()
                .map(album_from_resource)
                .collect(),
            next_cursor,
        })
    }

    pub async fn get_album(&self, album_id: &str) -> Result<Album, AppError> {
        let resource: AlbumResource = self
            .get_json("get_album", &format!("/albums/{}", album_id), vec![])
            .await?;
        Ok(album_from_resource(resource))
    }

    /// One page of an album's assets, embedded asset payloads included.
    pub async fn list_album_assets(
        &self,
        album_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<AssetPage, AppError> {
        let mut query = vec![("embed", "asset".to_string()), ("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("after", cursor.to_string()));
        }

        let endpoint = format!("/albums/{}/assets", album_id);
        let response: ListResponse<AlbumAssetResource> =
            self.get_json("list_album_assets", &endpoint, query).await?;

        let next_cursor = response.next_cursor();
        let assets = response
            .resources
            .into_iter()
            .filter_map(|item| item.asset)
            .map(|asset| asset_from_resource(&self.base_url, asset))
            .collect();
        Ok(AssetPage {
            assets,
            next_cursor,
        })
    }

    /// Album metadata plus its first page of assets; the first asset becomes the cover.
    pub async fn get_album_detail(&self, album_id: &str) -> Result<Album, AppError> {
        let (mut album, page) = tokio::try_join!(
            self.get_album(album_id),
            self.list_album_assets(album_id, DETAIL_ASSET_LIMIT, None)
        )?;
        album.cover = page.assets.first().cloned();
        album.assets = Some(page.assets);
        Ok(album)
    }

    pub async fn get_asset(
        &self,
        catalog_id: &str,
        asset_id: &str,
    ) -> Result<serde_json::Value, AppError> {
        let endpoint = format!("/catalogs/{}/assets/{}", catalog_id, asset_id);
        self.get_json("get_asset", &endpoint, vec![]).await
    }

    pub async fn get_asset_formatted(
        &self,
        catalog_id: &str,
        asset_id: &str,
    ) -> Result<Asset, AppError> {
        let endpoint = format!("/catalogs/{}/assets/{}", catalog_id, asset_id);
        let resource: AssetResource = self
            .get_json("get_asset_formatted", &endpoint, vec![])
            .await?;
        Ok(asset_from_resource(&self.base_url, resource))
    }

    /// Ask upstream to generate a rendition.
    pub async fn generate_rendition(
        &self,
        catalog_id: &str,
        asset_id: &str,
        size: RenditionSize,
    ) -> Result<serde_json::Value, AppError> {
        let endpoint = format!("/catalogs/{}/assets/{}/renditions", catalog_id, asset_id);
        let body = serde_json::json!({ "rendition_type": size.as_str() });
        with_retry(&self.retry, "generate_rendition", || {
            self.request_json(Method::POST, &endpoint, &[], Some(&body))
        })
        .await
    }

    /// Download rendition bytes.
    pub async fn fetch_rendition(
        &self,
        catalog_id: &str,
        asset_id: &str,
        size: RenditionSize,
    ) -> Result<Vec<u8>, AppError> {
        let endpoint = format!(
            "/catalogs/{}/assets/{}/renditions/{}",
            catalog_id, asset_id, size
        );
        let endpoint = endpoint.as_str();
        with_retry(&self.retry, "fetch_rendition", move || async move {
            let response = self
                .send(Method::GET, endpoint, &[], None, "image/jpeg")
                .await?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AppError::Network(e.to_string()))?;
            Ok(bytes.to_vec())
        })
        .await
    }

    pub async fn get_rate_limit_status(&self) -> Result<RateLimitStatus, AppError> {
        self.limiter.status().await
    }
}
