// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token set stored for the single connected Adobe account.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The one active token set of the deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokenSet {
    /// Empty means unauthenticated.
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry of the access token.
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthTokenSet {
    /// Whether an access token is present at all.
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Whether a refresh token is present.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// True when the access token expires within `margin` of `now` (or already has).
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        now + margin >= self.expires_at
    }
}
