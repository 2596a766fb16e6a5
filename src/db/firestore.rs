// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed key-value store.
//!
//! Each record is one document in the `kv` collection. The document id is the
//! URL-escaped key; the raw key is kept in a `key` field so prefix listing can
//! run as a range query.

use crate::db::collections;
use crate::db::kv::KvStore;
use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Upper bound appended to a prefix for range queries.
const PREFIX_END: char = '\u{f8ff}';

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KvDocument {
    key: String,
    value: String,
    updated_at: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreKv {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreKv {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator accepts any bearer token; skip local credential lookup.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client for tests. Every operation fails.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

/// Firestore document ids may not contain `/`; escape the whole key.
fn document_id(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

#[async_trait]
impl KvStore for FirestoreKv {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let doc: Option<KvDocument> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::KV)
            .obj()
            .one(&document_id(key))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(doc.map(|d| d.value))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), AppError> {
        let doc = KvDocument {
            key: key.to_string(),
            value,
            updated_at: crate::time_utils::format_utc_rfc3339(chrono::Utc::now()),
        };
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::KV)
            .document_id(document_id(key))
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::KV)
            .document_id(document_id(key))
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let start = prefix.to_string();
        let end = format!("{prefix}{PREFIX_END}");
        let docs: Vec<KvDocument> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::KV)
            .filter(move |q| {
                q.for_all([
                    q.field("key").greater_than_or_equal(start.clone()),
                    q.field("key").less_than(end.clone()),
                ])
            })
            .order_by([("key", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(docs.into_iter().map(|d| d.key).collect())
    }
}
