// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets (client secret, admin password, state key) come from the
//! environment as well; the deployment injects them there.

use crate::models::RenditionSize;
use crate::services::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default Lightroom Partner API base URL.
pub const DEFAULT_LIGHTROOM_API_BASE: &str = "https://lr.adobe.io/v2";
/// Default Adobe IMS base URL.
pub const DEFAULT_IMS_BASE_URL: &str = "https://ims-na1.adobelogin.com/ims";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" | "dev" | "" => Ok(Environment::Development),
            other => Err(ConfigError::Invalid("ENVIRONMENT", other.to_string())),
        }
    }
}

/// Which backend the durable cache uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Firestore key-value records and filesystem blobs.
    Durable,
    /// Process-local maps. Nothing survives a restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "durable" | "firestore" => Ok(StorageBackend::Durable),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ConfigError::Invalid("STORAGE_BACKEND", other.to_string())),
        }
    }
}

/// Local request budgets, mirroring the upstream per-user quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Requests allowed per clock hour.
    pub hourly_limit: u32,
    /// Requests allowed per clock minute.
    pub burst_limit: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            hourly_limit: 100,
            burst_limit: 30,
        }
    }
}

/// Tunables for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Minimum time between non-forced album listing syncs.
    pub min_sync_interval: Duration,
    /// Hourly requests that must remain before a non-forced sync starts.
    pub budget_floor: u32,
    /// Albums requested per listing page.
    pub album_page_size: u32,
    /// Listing pages fetched per invocation.
    pub max_album_pages: u32,
    /// A per-album pass newer than this is skipped unless forced.
    pub album_freshness: Duration,
    /// Assets requested per album asset page.
    pub asset_page_size: u32,
    /// Asset pages fetched per invocation.
    pub max_asset_pages: u32,
    /// Assets whose renditions are downloaded per invocation.
    pub max_rendition_assets: usize,
    /// Rendition size classes mirrored for each asset.
    pub rendition_sizes: Vec<RenditionSize>,
    /// Pause between rendition downloads, to stay inside the burst window.
    pub rendition_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_sync_interval: Duration::from_secs(5 * 60),
            budget_floor: 5,
            album_page_size: 250,
            max_album_pages: 5,
            album_freshness: Duration::from_secs(24 * 60 * 60),
            asset_page_size: 50,
            max_asset_pages: 5,
            max_rendition_assets: 10,
            rendition_sizes: vec![
                RenditionSize::S640,
                RenditionSize::S1280,
                RenditionSize::S2048,
            ],
            rendition_delay: Duration::from_millis(100),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Adobe client ID (also sent as `X-API-Key`). `None` selects session auth.
    pub adobe_client_id: Option<String>,
    /// Adobe client secret.
    pub adobe_client_secret: Option<String>,
    pub environment: Environment,
    pub storage_backend: StorageBackend,
    /// GCP project holding the Firestore database.
    pub gcp_project_id: String,
    /// Root directory of the filesystem blob store.
    pub cache_dir: PathBuf,
    pub lightroom_api_base: String,
    pub ims_base_url: String,
    /// Restrict album listing to children of this collection set.
    pub collection_set_id: Option<String>,
    /// Password for the session auth provider.
    pub admin_password: Option<String>,
    /// HMAC key for OAuth `state` parameters (raw bytes).
    pub oauth_state_key: Vec<u8>,
    pub rate_limits: RateLimitSettings,
    pub sync: SyncSettings,
    pub retry: RetryPolicy,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            adobe_client_id: Some("test_client_id".to_string()),
            adobe_client_secret: Some("test_secret".to_string()),
            environment: Environment::Development,
            storage_backend: StorageBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            cache_dir: PathBuf::from("target/test-cache"),
            lightroom_api_base: DEFAULT_LIGHTROOM_API_BASE.to_string(),
            ims_base_url: DEFAULT_IMS_BASE_URL.to_string(),
            collection_set_id: None,
            admin_password: None,
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            rate_limits: RateLimitSettings::default(),
            sync: SyncSettings {
                rendition_delay: Duration::ZERO,
                ..SyncSettings::default()
            },
            retry: RetryPolicy::immediate(3),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .parse()?;

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) if environment.is_production() => StorageBackend::Durable,
            Err(_) => StorageBackend::Memory,
        };

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            min_sync_interval: Duration::from_secs(parse_or(
                "SYNC_MIN_INTERVAL_SECS",
                defaults.min_sync_interval.as_secs(),
            )?),
            budget_floor: parse_or("SYNC_BUDGET_FLOOR", defaults.budget_floor)?,
            album_page_size: parse_or("SYNC_ALBUM_PAGE_SIZE", defaults.album_page_size)?
                .clamp(1, 250),
            max_album_pages: parse_or("SYNC_MAX_ALBUM_PAGES", defaults.max_album_pages)?.max(1),
            album_freshness: Duration::from_secs(
                parse_or("SYNC_ALBUM_FRESHNESS_HOURS", 24u64)? * 60 * 60,
            ),
            asset_page_size: parse_or("SYNC_ASSET_PAGE_SIZE", defaults.asset_page_size)?
                .clamp(1, 500),
            max_asset_pages: parse_or("SYNC_MAX_ASSET_PAGES", defaults.max_asset_pages)?.max(1),
            max_rendition_assets: parse_or(
                "SYNC_MAX_RENDITION_ASSETS",
                defaults.max_rendition_assets,
            )?,
            rendition_sizes: match env::var("SYNC_RENDITION_SIZES") {
                Ok(raw) => parse_sizes(&raw)?,
                Err(_) => defaults.rendition_sizes,
            },
            rendition_delay: Duration::from_millis(parse_or("SYNC_RENDITION_DELAY_MS", 100u64)?),
        };

        let rate_limits = RateLimitSettings {
            hourly_limit: parse_or("RATE_LIMIT_HOURLY", 100u32)?,
            burst_limit: parse_or("RATE_LIMIT_BURST", 30u32)?,
        };

        Ok(Self {
            adobe_client_id: non_empty_var("ADOBE_CLIENT_ID"),
            adobe_client_secret: non_empty_var("ADOBE_CLIENT_SECRET"),
            environment,
            storage_backend,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./cache")),
            lightroom_api_base: env::var("LIGHTROOM_API_BASE")
                .unwrap_or_else(|_| DEFAULT_LIGHTROOM_API_BASE.to_string()),
            ims_base_url: env::var("IMS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_IMS_BASE_URL.to_string()),
            collection_set_id: non_empty_var("COLLECTION_SET_ID"),
            admin_password: non_empty_var("ADMIN_PASSWORD"),
            oauth_state_key: match non_empty_var("OAUTH_STATE_KEY") {
                Some(key) => key.into_bytes(),
                None if environment.is_production() => {
                    return Err(ConfigError::Missing("OAUTH_STATE_KEY"))
                }
                None => b"development-only-state-key".to_vec(),
            },
            rate_limits,
            sync,
            retry: RetryPolicy::default(),
        })
    }

    /// Whether both OAuth client credentials are configured.
    pub fn has_oauth_credentials(&self) -> bool {
        self.adobe_client_id.is_some() && self.adobe_client_secret.is_some()
    }
}

/// Read a trimmed, non-empty environment variable.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name, raw)),
        None => Ok(default),
    }
}

fn parse_sizes(raw: &str) -> Result<Vec<RenditionSize>, ConfigError> {
    let sizes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<RenditionSize>()
                .map_err(|_| ConfigError::Invalid("SYNC_RENDITION_SIZES", s.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if sizes.is_empty() {
        return Err(ConfigError::Invalid(
            "SYNC_RENDITION_SIZES",
            raw.to_string(),
        ));
    }
    Ok(sizes)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
