// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Lightroom Mirror: a durable local cache of an Adobe Lightroom catalog
//!
//! This crate keeps albums, asset listings and image renditions from the
//! Lightroom Partner API in a local cache so a public gallery can be served
//! without calling upstream, while staying inside Adobe's request budget.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use anyhow::Context;
use chrono::Utc;
use config::Config;
use db::CacheDb;
use error::AppError;
use services::{
    oauth_state, AuthProvider, GalleryReader, ImsClient, LightroomClient, PublishService,
    RateLimiter, SyncOrchestrator, TokenManager,
};
use std::time::Duration;

/// Timeout applied to every upstream HTTP request.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state: configuration, both stores and the services
/// built on them.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: CacheDb,
    pub limiter: RateLimiter,
    pub auth: AuthProvider,
    /// Present only when Adobe client credentials are configured.
    pub lightroom: Option<LightroomClient>,
    pub sync: Option<SyncOrchestrator>,
    pub publish: PublishService,
    pub gallery: GalleryReader,
}

impl AppState {
    /// Connect the configured stores and build the services.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let db = CacheDb::from_config(&config).await?;
        Self::build_with_db(config, db)
    }

    /// Build the services on top of an existing cache.
    pub fn build_with_db(config: Config, db: CacheDb) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building HTTP client")?;

        let limiter = RateLimiter::new(
            db.clone(),
            config.rate_limits.clone(),
            config.sync.budget_floor,
        );

        let tokens = match (&config.adobe_client_id, &config.adobe_client_secret) {
            (Some(client_id), Some(client_secret)) => {
                let ims = ImsClient::new(
                    http.clone(),
                    config.ims_base_url.clone(),
                    client_id.clone(),
                    client_secret.clone(),
                );
                Some(TokenManager::new(ims, db.clone()))
            }
            _ => None,
        };

        let lightroom = tokens.clone().map(|tokens| {
            LightroomClient::new(
                http.clone(),
                config.lightroom_api_base.clone(),
                tokens,
                limiter.clone(),
                config.retry.clone(),
            )
        });
        let sync = lightroom.clone().map(|client| {
            SyncOrchestrator::new(
                db.clone(),
                client,
                config.sync.clone(),
                config.collection_set_id.clone(),
            )
        });

        let auth = AuthProvider::from_config(&config, tokens, db.clone());
        tracing::info!(
            auth_provider = auth.name(),
            lightroom = lightroom.is_some(),
            environment = ?config.environment,
            "Application state initialized"
        );

        Ok(Self {
            publish: PublishService::new(db.clone(), sync.clone()),
            gallery: GalleryReader::new(db.clone()),
            config,
            db,
            limiter,
            auth,
            lightroom,
            sync,
        })
    }

    /// The sync orchestrator, or `AuthRequired` when OAuth is not configured.
    pub fn sync(&self) -> Result<&SyncOrchestrator, AppError> {
        self.sync.as_ref().ok_or(AppError::AuthRequired)
    }

    fn token_manager(&self) -> Result<&TokenManager, AppError> {
        self.auth.token_manager().ok_or_else(|| {
            AppError::Config("OAuth is not configured (missing Adobe client credentials)".to_string())
        })
    }

    /// Authorization URL carrying a signed `state` that encodes `return_to`.
    pub fn begin_oauth(&self, redirect_uri: &str, return_to: &str) -> Result<String, AppError> {
        let tokens = self.token_manager()?;
        let state = oauth_state::sign_state(return_to, &self.config.oauth_state_key, Utc::now())?;
        tokens.authorization_url(redirect_uri, Some(&state))
    }

    /// Finish the authorization redirect: check `state`, exchange `code` and
    /// return the page to send the admin back to.
    pub async fn complete_oauth(
        &self,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        let tokens = self.token_manager()?;
        let return_to = oauth_state::verify_state(state, &self.config.oauth_state_key, Utc::now())
            .ok_or_else(|| {
                tracing::warn!("Rejected OAuth callback with invalid state");
                AppError::BadRequest("Invalid or expired OAuth state".to_string())
            })?;
        tokens.exchange_code_for_tokens(code, redirect_uri).await?;
        Ok(return_to)
    }
}
