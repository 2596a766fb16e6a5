// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin authentication providers.
//!
//! OAuth is used when Adobe client credentials are configured; otherwise a
//! password-based session provider stands in (development deployments).

use crate::config::Config;
use crate::db::{keys, CacheDb};
use crate::error::AppError;
use crate::services::tokens::TokenManager;
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Session lifetime.
const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Password login with server-side sessions stored in the KV store.
#[derive(Clone)]
pub struct SessionAuth {
    db: CacheDb,
    password: Option<String>,
    allow_passwordless: bool,
    rng: SystemRandom,
}

impl SessionAuth {
    pub fn new(db: CacheDb, password: Option<String>, allow_passwordless: bool) -> Self {
        Self {
            db,
            password,
            allow_passwordless,
            rng: SystemRandom::new(),
        }
    }

    /// Check a login password in constant time.
    ///
    /// With no password configured, logins succeed only when passwordless
    /// access is allowed (non-production).
    pub fn validate_password(&self, candidate: &str) -> bool {
        match &self.password {
            Some(expected) => bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())),
            None => self.allow_passwordless,
        }
    }

    fn generate_token(&self) -> Result<String, AppError> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Random generator failed")))?;
        Ok(hex::encode(bytes))
    }

    /// Validate `password` and open a 24-hour session. Returns the session token.
    pub async fn login(&self, password: &str) -> Result<String, AppError> {
        if !self.validate_password(password) {
            tracing::warn!("Rejected admin login");
            return Err(AppError::AuthFailed);
        }
        let token = self.generate_token()?;
        let now = Utc::now();
        let record = SessionRecord {
            created_at: now,
            expires_at: now + Duration::hours(SESSION_TTL_HOURS),
        };
        self.db.put_record(&keys::session(&token), &record).await?;
        tracing::info!("Admin session created");
        Ok(token)
    }

    /// Whether `token` names an unexpired session. Expired sessions are removed.
    pub async fn validate_session(&self, token: &str) -> Result<bool, AppError> {
        if token.is_empty() {
            return Ok(false);
        }
        let key = keys::session(token);
        let Some(record) = self.db.get_record::<SessionRecord>(&key).await? else {
            return Ok(false);
        };
        if Utc::now() > record.expires_at {
            self.db.delete_record(&key).await?;
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn revoke_session(&self, token: &str) -> Result<(), AppError> {
        self.db.delete_record(&keys::session(token)).await
    }
}

/// The configured admin authentication provider.
#[derive(Clone)]
pub enum AuthProvider {
    OAuth(TokenManager),
    Session(SessionAuth),
}

impl AuthProvider {
    /// Pick OAuth when client credentials exist, else session auth.
    pub fn from_config(config: &Config, tokens: Option<TokenManager>, db: CacheDb) -> Self {
        match tokens {
            Some(tokens) if config.has_oauth_credentials() => AuthProvider::OAuth(tokens),
            _ => AuthProvider::Session(SessionAuth::new(
                db,
                config.admin_password.clone(),
                !config.environment.is_production(),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthProvider::OAuth(_) => "oauth",
            AuthProvider::Session(_) => "session",
        }
    }

    /// Whether the admin is authenticated. Session auth needs the caller's token.
    pub async fn is_authenticated(&self, session: Option<&str>) -> bool {
        match self {
            AuthProvider::OAuth(tokens) => tokens.is_authenticated().await,
            AuthProvider::Session(auth) => match session {
                Some(token) => auth.validate_session(token).await.unwrap_or(false),
                None => false,
            },
        }
    }

    /// An upstream access token. Only the OAuth provider can supply one.
    pub async fn access_token(&self) -> Result<String, AppError> {
        match self {
            AuthProvider::OAuth(tokens) => tokens.get_valid_access_token().await,
            AuthProvider::Session(_) => Err(AppError::AuthRequired),
        }
    }

    /// Validate an admin session token. OAuth deployments have no sessions
    /// and report whether the upstream token is usable instead.
    pub async fn validate_session(&self, token: &str) -> Result<bool, AppError> {
        match self {
            AuthProvider::OAuth(tokens) => Ok(tokens.is_authenticated().await),
            AuthProvider::Session(auth) => auth.validate_session(token).await,
        }
    }

    pub fn token_manager(&self) -> Option<&TokenManager> {
        match self {
            AuthProvider::OAuth(tokens) => Some(tokens),
            AuthProvider::Session(_) => None,
        }
    }
}
