// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types.
//!
//! Infrastructure failures (authentication, local budget) abort a sync track
//! and surface to the caller. Item-level failures are collected into sync
//! reports instead of being raised.

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No token set (or no refresh token) is stored.
    #[error("Authentication required")]
    AuthRequired,

    /// Upstream rejected our credentials (HTTP 401).
    #[error("Authentication failed")]
    AuthFailed,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("OAuth token exchange failed: {0}")]
    OAuthExchangeFailed(String),

    #[error("Rate limited, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    /// Local safety floor on the hourly budget.
    #[error("Budget protection: {remaining} requests remaining, {required} required")]
    BudgetProtected { remaining: u32, required: u32 },

    #[error("Lightroom API error: HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<AppError> },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Transient failures the retry helper re-issues: 429s, 5xx and transport errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RateLimited { .. } => true,
            AppError::Upstream { status, .. } => (500..600).contains(status),
            AppError::Network(_) => true,
            _ => false,
        }
    }

    /// Failures that mean the caller must re-authenticate.
    pub fn is_auth_error(&self) -> bool {
        match self {
            AppError::AuthRequired
            | AppError::AuthFailed
            | AppError::RefreshFailed(_)
            | AppError::OAuthExchangeFailed(_) => true,
            AppError::RetriesExhausted { last, .. } => last.is_auth_error(),
            _ => false,
        }
    }

    /// Whether this failure aborts a whole sync track rather than one item.
    pub fn aborts_sync(&self) -> bool {
        match self {
            AppError::BudgetProtected { .. } => true,
            AppError::RetriesExhausted { last, .. } => last.aborts_sync(),
            other => other.is_auth_error(),
        }
    }

    /// Upstream HTTP status, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Upstream { status, .. } => Some(*status),
            AppError::RateLimited { .. } => Some(429),
            AppError::AuthFailed => Some(401),
            AppError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(anyhow::anyhow!("JSON error: {}", err))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
