// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token lifecycle for the single connected Adobe account.
//!
//! Handles:
//! - Code exchange after the authorization redirect
//! - Proactive refresh within a 5-minute margin of expiry
//! - Single-flight refresh when concurrent requests see an expiring token
//! - Best-effort revocation followed by local clearing

use crate::db::CacheDb;
use crate::error::AppError;
use crate::models::OAuthTokenSet;
use crate::services::ims::ImsClient;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Owns the stored token set and hands out valid access tokens.
#[derive(Clone)]
pub struct TokenManager {
    ims: ImsClient,
    db: CacheDb,
    /// Last token set read or written by this process.
    cached: Arc<RwLock<Option<OAuthTokenSet>>>,
    /// Serializes refresh so concurrent callers trigger one upstream call.
    refresh_lock: Arc<Mutex<()>>,
}

impl TokenManager {
    pub fn new(ims: ImsClient, db: CacheDb) -> Self {
        Self {
            ims,
            db,
            cached: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn client_id(&self) -> &str {
        self.ims.client_id()
    }

    fn margin() -> Duration {
        Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)
    }

    async fn cached_valid_token(&self) -> Option<String> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|t| t.is_authenticated() && !t.expires_within(Self::margin(), Utc::now()))
            .map(|t| t.access_token.clone())
    }

    async fn remember(&self, tokens: Option<OAuthTokenSet>) {
        *self.cached.write().await = tokens;
    }

    /// Return a usable access token, refreshing it first when it expires
    /// within five minutes.
    pub async fn get_valid_access_token(&self) -> Result<String, AppError> {
        // Fast path: no I/O.
        if let Some(token) = self.cached_valid_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we were waiting.
        if let Some(token) = self.cached_valid_token().await {
            return Ok(token);
        }

        let tokens = self
            .db
            .get_tokens()
            .await?
            .filter(OAuthTokenSet::is_authenticated)
            .ok_or(AppError::AuthRequired)?;

        if !tokens.expires_within(Self::margin(), Utc::now()) {
            let access_token = tokens.access_token.clone();
            self.remember(Some(tokens)).await;
            return Ok(access_token);
        }

        tracing::info!("Access token expiring, refreshing");
        let refreshed = self.refresh_locked(tokens).await?;
        Ok(refreshed.access_token)
    }

    /// Refresh using the stored refresh token, regardless of expiry.
    pub async fn refresh_tokens(&self) -> Result<OAuthTokenSet, AppError> {
        let _guard = self.refresh_lock.lock().await;
        let tokens = self.db.get_tokens().await?.ok_or(AppError::AuthRequired)?;
        self.refresh_locked(tokens).await
    }

    /// Refresh `current`. Caller holds `refresh_lock`.
    async fn refresh_locked(&self, current: OAuthTokenSet) -> Result<OAuthTokenSet, AppError> {
        let refresh_token = current
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(AppError::AuthRequired)?;

        let response = match self.ims.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                // Another process may have rotated the refresh token first.
                if let Some(stored) = self.db.get_tokens().await? {
                    if stored.access_token != current.access_token
                        && stored.is_authenticated()
                        && !stored.expires_within(Self::margin(), Utc::now())
                    {
                        tracing::info!("Refresh lost a race with another process, using its tokens");
                        self.remember(Some(stored.clone())).await;
                        return Ok(stored);
                    }
                }
                self.remember(None).await;
                return Err(match e {
                    AppError::RefreshFailed(_) => e,
                    other => AppError::RefreshFailed(other.to_string()),
                });
            }
        };

        let tokens = response.into_token_set(Some(refresh_token), Utc::now());
        self.db.set_tokens(&tokens).await?;
        self.remember(Some(tokens.clone())).await;

        tracing::info!(
            expires_at = %tokens.expires_at,
            rotated = tokens.refresh_token != current.refresh_token,
            "Token refreshed and cached"
        );
        Ok(tokens)
    }

    /// Exchange an authorization code and persist the resulting token set.
    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokenSet, AppError> {
        let response = self.ims.exchange_code(code, redirect_uri).await?;
        let tokens = response.into_token_set(None, Utc::now());

        let _guard = self.refresh_lock.lock().await;
        self.db.set_tokens(&tokens).await?;
        self.remember(Some(tokens.clone())).await;

        tracing::info!(
            has_refresh_token = tokens.is_refreshable(),
            expires_at = %tokens.expires_at,
            "OAuth tokens stored"
        );
        Ok(tokens)
    }

    /// Revoke upstream (best effort) and clear the stored token set.
    pub async fn revoke_tokens(&self) -> Result<(), AppError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(tokens) = self.db.get_tokens().await? {
            if tokens.is_authenticated() {
                match self.ims.revoke(&tokens.access_token).await {
                    Ok(()) => tracing::info!("Adobe tokens revoked"),
                    Err(e) => tracing::warn!(error = %e, "Failed to revoke tokens with Adobe"),
                }
            }
        }

        self.db.delete_tokens().await?;
        self.remember(None).await;
        tracing::info!("Local OAuth tokens cleared");
        Ok(())
    }

    /// Whether a valid access token can be produced right now.
    pub async fn is_authenticated(&self) -> bool {
        self.get_valid_access_token().await.is_ok()
    }

    /// Drop the in-memory copy so the next call re-reads the store.
    pub async fn forget_cached(&self) {
        self.remember(None).await;
    }

    pub async fn current_tokens(&self) -> Result<Option<OAuthTokenSet>, AppError> {
        self.db.get_tokens().await
    }

    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<String, AppError> {
        self.ims.authorization_url(redirect_uri, state)
    }

    pub fn logout_url(&self, redirect_uri: &str) -> Result<String, AppError> {
        self.ims.logout_url(redirect_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(db: CacheDb) -> TokenManager {
        // Unroutable base URL: any upstream call fails fast.
        let ims = ImsClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/ims",
            "client".to_string(),
            "secret".to_string(),
        );
        TokenManager::new(ims, db)
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_refresh() {
        let db = CacheDb::in_memory();
        db.set_tokens(&OAuthTokenSet {
            access_token: "still-good".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
            scope: None,
            token_type: "Bearer".to_string(),
        })
        .await
        .unwrap();

        let token = manager(db).get_valid_access_token().await.unwrap();
        assert_eq!(token, "still-good");
    }

    #[tokio::test]
    async fn test_missing_tokens_require_auth() {
        let err = manager(CacheDb::in_memory())
            .get_valid_access_token()
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthRequired));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_requires_auth() {
        let db = CacheDb::in_memory();
        db.set_tokens(&OAuthTokenSet {
            access_token: "stale".to_string(),
            refresh_token: None,
            expires_at: Utc::now() - Duration::minutes(1),
            scope: None,
            token_type: "Bearer".to_string(),
        })
        .await
        .unwrap();

        let err = manager(db).get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, AppError::AuthRequired));
    }
}
