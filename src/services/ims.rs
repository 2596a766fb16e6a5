// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Adobe IMS (identity) client: authorization URLs, code exchange, refresh
//! and revocation.

use crate::error::AppError;
use crate::models::OAuthTokenSet;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Scopes requested for Lightroom Partner API access.
pub const LIGHTROOM_SCOPE: &str =
    "openid,AdobeID,lr_partner_apis,lr_partner_rendition_apis,offline_access";

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 24 * 60 * 60;

/// Adobe IMS client.
#[derive(Clone)]
pub struct ImsClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl ImsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Browser URL that starts the authorization-code flow.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<String, AppError> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", LIGHTROOM_SCOPE),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }
        let url = url::Url::parse_with_params(&format!("{}/authorize/v2", self.base_url), &params)
            .map_err(|e| AppError::Config(format!("Invalid IMS URL: {}", e)))?;
        Ok(url.into())
    }

    /// Browser URL that ends the Adobe session.
    pub fn logout_url(&self, redirect_uri: &str) -> Result<String, AppError> {
        let url = url::Url::parse_with_params(
            &format!("{}/logout", self.base_url),
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
            ],
        )
        .map_err(|e| AppError::Config(format!("Invalid IMS URL: {}", e)))?;
        Ok(url.into())
    }

    /// Exchange an authorization code for a token set.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/token/v3", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| AppError::OAuthExchangeFailed(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Adobe token exchange failed");
            return Err(AppError::OAuthExchangeFailed(format!("HTTP {}", status.as_u16())));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::OAuthExchangeFailed(format!("Failed to parse token response: {}", e))
        })?;

        if !token.has_access_token() {
            return Err(AppError::OAuthExchangeFailed(
                "No access token in OAuth response".to_string(),
            ));
        }
        Ok(token)
    }

    /// Trade a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/token/v3", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::RefreshFailed(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Adobe token refresh failed");
            return Err(AppError::RefreshFailed(format!("HTTP {}", status.as_u16())));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::RefreshFailed(format!("Failed to parse token response: {}", e)))?;

        if !token.has_access_token() {
            return Err(AppError::RefreshFailed(
                "No access token in refresh response".to_string(),
            ));
        }
        Ok(token)
    }

    /// Revoke an access token upstream.
    pub async fn revoke(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/revoke", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("token", access_token),
            ])
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Revoke request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream {
                status: response.status().as_u16(),
                message: "Token revocation failed".to_string(),
            });
        }
        Ok(())
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Build the stored token set, keeping `previous_refresh` when no new
    /// refresh token was issued.
    pub fn into_token_set(
        self,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> OAuthTokenSet {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        OAuthTokenSet {
            access_token: self.access_token.unwrap_or_default(),
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(previous_refresh),
            expires_at: now + Duration::seconds(expires_in),
            scope: self.scope,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}
