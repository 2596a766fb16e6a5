// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test helpers: an in-process fake of Adobe IMS and the Lightroom
//! API, plus application state wired against it.

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{Duration, Utc};
use lightroom_mirror::config::Config;
use lightroom_mirror::db::CacheDb;
use lightroom_mirror::models::OAuthTokenSet;
use lightroom_mirror::AppState;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Scriptable state of the fake upstream.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockUpstream {
    pub token_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub revoke_calls: AtomicU32,
    pub fail_refresh: AtomicBool,
    /// Requests served under `/v2`.
    pub api_calls: AtomicU32,
    pub rendition_calls: AtomicU32,
    pub last_api_key: Mutex<Option<String>>,
    pub last_authorization: Mutex<Option<String>>,
    /// Statuses returned by successive `/v2/account` calls (200 once drained).
    pub account_statuses: Mutex<VecDeque<u16>>,
    /// Value of `X-RateLimit-Remaining` on every API response.
    pub rate_limit_remaining: Mutex<Option<u32>>,
    /// Album ids served per listing page.
    pub album_pages: Mutex<Vec<Vec<String>>>,
    pub album_assets: Mutex<HashMap<String, Vec<String>>>,
    /// Assets whose rendition downloads return 404.
    pub failing_assets: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl MockUpstream {
    pub fn set_album_pages(&self, pages: &[&[&str]]) {
        *self.album_pages.lock().unwrap() = pages
            .iter()
            .map(|p| p.iter().map(|id| id.to_string()).collect())
            .collect();
    }

    pub fn set_album_assets(&self, album_id: &str, asset_ids: &[&str]) {
        self.album_assets.lock().unwrap().insert(
            album_id.to_string(),
            asset_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    pub fn fail_asset(&self, asset_id: &str) {
        self.failing_assets
            .lock()
            .unwrap()
            .insert(asset_id.to_string());
    }

    pub fn script_account(&self, statuses: &[u16]) {
        self.account_statuses
            .lock()
            .unwrap()
            .extend(statuses.iter().copied());
    }

    pub fn api_calls(&self) -> u32 {
        self.api_calls.load(Ordering::SeqCst)
    }

    pub fn rendition_calls(&self) -> u32 {
        self.rendition_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

type Shared = Arc<MockUpstream>;

fn record(state: &MockUpstream, headers: &HeaderMap) {
    state.api_calls.fetch_add(1, Ordering::SeqCst);
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    *state.last_api_key.lock().unwrap() = header("x-api-key");
    *state.last_authorization.lock().unwrap() = header("authorization");
}

/// JSON response with the anti-hijacking prefix and optional rate headers.
fn lr_json(state: &MockUpstream, status: StatusCode, body: Value) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(remaining) = *state.rate_limit_remaining.lock().unwrap() {
        headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
        headers.insert("x-ratelimit-limit", HeaderValue::from(100u32));
        let reset = (Utc::now() + Duration::minutes(30)).timestamp();
        headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
    }
    (status, headers, format!("while (1) {{}}\n{}", body)).into_response()
}

fn album_json(id: &str) -> Value {
    json!({
        "id": id,
        "subtype": "collection",
        "created": "2024-01-01T00:00:00Z",
        "updated": "2024-02-01T00:00:00Z",
        "payload": { "name": format!("Album {}", id), "parent": { "id": "set-1" } }
    })
}

fn asset_json(id: &str) -> Value {
    json!({
        "id": id,
        "payload": {
            "captureDate": "2024-06-01T10:00:00",
            "develop": { "croppedWidth": 3000, "croppedHeight": 2000 }
        }
    })
}

fn offset(query: &HashMap<String, String>, name: &str, default: usize) -> usize {
    query
        .get(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

async fn ims_token(State(state): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    match form.get("grant_type").map(String::as_str) {
        Some("refresh_token") => {
            let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Widen the window in which concurrent callers could pile up.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if state.fail_refresh.load(Ordering::SeqCst) {
                return (StatusCode::BAD_REQUEST, "{\"error\":\"invalid_grant\"}").into_response();
            }
            axum::Json(json!({
                "access_token": format!("refreshed-{}", n),
                "refresh_token": "rotated-refresh",
                "expires_in": 86400,
                "token_type": "bearer"
            }))
            .into_response()
        }
        Some("authorization_code") if form.get("code").map(String::as_str) == Some("good-code") => {
            axum::Json(json!({
                "access_token": "exchanged-access",
                "refresh_token": "exchanged-refresh",
                "expires_in": 3600
            }))
            .into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "{\"error\":\"invalid_request\"}").into_response(),
    }
}

async fn ims_revoke(State(state): State<Shared>) -> StatusCode {
    state.revoke_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn account(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    let status = state
        .account_statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(200);
    match status {
        200 => lr_json(&state, StatusCode::OK, json!({ "id": "acct-1", "email": "photographer@example.com" })),
        429 => {
            let mut response = lr_json(&state, StatusCode::TOO_MANY_REQUESTS, json!({}));
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from_static("7"));
            response
        }
        other => lr_json(
            &state,
            StatusCode::from_u16(other).unwrap(),
            json!({ "errors": [{ "code": other }] }),
        ),
    }
}

async fn catalog(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    lr_json(&state, StatusCode::OK, json!({ "id": "cat-1", "payload": { "name": "Main" } }))
}

async fn albums(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(_catalog): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    record(&state, &headers);
    let pages = state.album_pages.lock().unwrap().clone();
    let index = offset(&query, "after", 0);
    let resources: Vec<Value> = pages
        .get(index)
        .map(|ids| ids.iter().map(|id| album_json(id)).collect())
        .unwrap_or_default();
    let mut body = json!({ "base": "https://lr.example/v2/", "resources": resources });
    if index + 1 < pages.len() {
        body["links"] = json!({ "next": { "href": format!("albums?after={}", index + 1) } });
    }
    lr_json(&state, StatusCode::OK, body)
}

async fn album(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    record(&state, &headers);
    lr_json(&state, StatusCode::OK, album_json(&id))
}

async fn album_assets(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    record(&state, &headers);
    let ids = state
        .album_assets
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .unwrap_or_default();
    let start = offset(&query, "after", 0).min(ids.len());
    let end = (start + offset(&query, "limit", 50)).min(ids.len());
    let resources: Vec<Value> = ids[start..end]
        .iter()
        .map(|aid| json!({ "id": format!("aa-{}", aid), "asset": asset_json(aid) }))
        .collect();
    let mut body = json!({ "resources": resources });
    if end < ids.len() {
        body["links"] = json!({ "next": { "href": format!("assets?embed=asset&after={}", end) } });
    }
    lr_json(&state, StatusCode::OK, body)
}

async fn asset(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_catalog, id)): Path<(String, String)>,
) -> Response {
    record(&state, &headers);
    lr_json(&state, StatusCode::OK, asset_json(&id))
}

async fn generate_rendition(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record(&state, &headers);
    (StatusCode::ACCEPTED, String::new()).into_response()
}

async fn rendition(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_catalog, id, size)): Path<(String, String, String)>,
) -> Response {
    record(&state, &headers);
    state.rendition_calls.fetch_add(1, Ordering::SeqCst);
    if state.failing_assets.lock().unwrap().contains(&id) {
        return lr_json(&state, StatusCode::NOT_FOUND, json!({ "errors": [{ "code": 404 }] }));
    }
    (StatusCode::OK, format!("jpeg:{}:{}", id, size).into_bytes()).into_response()
}

/// Start the fake upstream on an ephemeral port. Returns its base URL.
#[allow(dead_code)]
pub async fn spawn_upstream() -> (String, Shared) {
    let state: Shared = Arc::new(MockUpstream::default());
    let app = Router::new()
        .route("/ims/token/v3", post(ims_token))
        .route("/ims/revoke", post(ims_revoke))
        .route("/v2/account", get(account))
        .route("/v2/catalog", get(catalog))
        .route("/v2/catalogs/{catalog}/albums", get(albums))
        .route("/v2/albums/{id}", get(album))
        .route("/v2/albums/{id}/assets", get(album_assets))
        .route("/v2/catalogs/{catalog}/assets/{id}", get(asset))
        .route(
            "/v2/catalogs/{catalog}/assets/{id}/renditions",
            post(generate_rendition),
        )
        .route(
            "/v2/catalogs/{catalog}/assets/{id}/renditions/{size}",
            get(rendition),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

/// Test configuration pointing at the fake upstream.
#[allow(dead_code)]
pub fn test_config(base: &str) -> Config {
    let mut config = Config::test_default();
    config.lightroom_api_base = format!("{}/v2", base);
    config.ims_base_url = format!("{}/ims", base);
    config
}

/// Application state over an in-memory cache.
#[allow(dead_code)]
pub fn test_app(config: Config) -> AppState {
    AppState::build_with_db(config, CacheDb::in_memory()).expect("Failed to build app state")
}

/// Store a token set expiring `expires_in` from now.
#[allow(dead_code)]
pub async fn seed_tokens(db: &CacheDb, access_token: &str, expires_in: Duration) {
    db.set_tokens(&OAuthTokenSet {
        access_token: access_token.to_string(),
        refresh_token: Some("seeded-refresh".to_string()),
        expires_at: Utc::now() + expires_in,
        scope: None,
        token_type: "Bearer".to_string(),
    })
    .await
    .unwrap();
}

/// Fake upstream plus app state with a token valid for an hour.
#[allow(dead_code)]
pub async fn authenticated_app() -> (AppState, Shared) {
    authenticated_app_with(|_| {}).await
}

#[allow(dead_code)]
pub async fn authenticated_app_with(tweak: impl FnOnce(&mut Config)) -> (AppState, Shared) {
    let (base, upstream) = spawn_upstream().await;
    let mut config = test_config(&base);
    tweak(&mut config);
    let app = test_app(config);
    seed_tokens(&app.db, "seeded-access", Duration::hours(1)).await;
    (app, upstream)
}
