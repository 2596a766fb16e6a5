// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Album listing and per-album sync tracks against a fake upstream.

use chrono::{Duration, Utc};
use lightroom_mirror::db::CacheDb;
use lightroom_mirror::error::AppError;
use lightroom_mirror::models::{AlbumFlags, RateCounter, RateWindow, RenditionSize};
use lightroom_mirror::services::sync::{
    AlbumAssetsOutcome, AlbumAssetsReport, AlbumSyncOptions, AlbumSyncOutcome, AlbumSyncReport,
    AssetSyncOptions,
};

mod common;
use common::{authenticated_app, authenticated_app_with, spawn_upstream, test_app, test_config};

fn completed(outcome: AlbumSyncOutcome) -> AlbumSyncReport {
    match outcome {
        AlbumSyncOutcome::Completed(report) => report,
        other => panic!("expected a completed album sync, got {other:?}"),
    }
}

fn completed_assets(outcome: AlbumAssetsOutcome) -> AlbumAssetsReport {
    match outcome {
        AlbumAssetsOutcome::Completed(report) => report,
        other => panic!("expected a completed asset sync, got {other:?}"),
    }
}

fn single_size() -> AssetSyncOptions {
    AssetSyncOptions {
        sizes: Some(vec![RenditionSize::S640]),
        ..Default::default()
    }
}

async fn seed_hourly(db: &CacheDb, count: u32) {
    let now = Utc::now();
    db.set_counter(
        RateWindow::Hourly.key(),
        &RateCounter {
            count,
            reset_at: RateWindow::Hourly.reset_at(now),
        },
    )
    .await
    .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// ALBUM LISTING
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_album_sync_walks_all_pages() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_pages(&[&["a1", "a2"], &["a3"]]);
    let sync = app.sync().unwrap();

    let report = completed(sync.sync_albums(AlbumSyncOptions::default()).await.unwrap());
    assert_eq!(report.album_ids, vec!["a1", "a2", "a3"]);
    assert_eq!(report.pages_fetched, 2);
    assert!(!report.has_more);
    assert!(report.errors.is_empty());
    // Catalog lookup plus two pages.
    assert_eq!(report.rate_limits.hourly.used, 3);

    let index = app.db.get_albums_index().await.unwrap().unwrap();
    assert_eq!(index.total_count, 3);
    assert!(app.db.get_album("a2").await.unwrap().is_some());
    assert_eq!(app.db.get_catalog_id().await.unwrap().as_deref(), Some("cat-1"));

    let state = app.db.get_sync_state().await.unwrap();
    assert_eq!(state.total_synced, 3);
    assert!(state.last_sync.is_some());
    assert!(state.cursor.is_none());
}

#[tokio::test]
async fn test_recent_album_sync_is_skipped_without_api_calls() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_pages(&[&["a1"]]);
    let sync = app.sync().unwrap();

    completed(sync.sync_albums(AlbumSyncOptions::default()).await.unwrap());
    let calls = upstream.api_calls();

    let outcome = sync.sync_albums(AlbumSyncOptions::default()).await.unwrap();
    assert!(matches!(outcome, AlbumSyncOutcome::Skipped { .. }));
    assert_eq!(upstream.api_calls(), calls);

    // Forcing bypasses the interval.
    completed(
        sync.sync_albums(AlbumSyncOptions {
            force: true,
            ..Default::default()
        })
        .await
        .unwrap(),
    );
    assert!(upstream.api_calls() > calls);
}

#[tokio::test]
async fn test_page_cap_resumes_and_appends_without_duplicates() {
    let (app, upstream) = authenticated_app_with(|config| config.sync.max_album_pages = 1).await;
    upstream.set_album_pages(&[&["a1", "a2"], &["a2", "a3"]]);
    let sync = app.sync().unwrap();

    let first = completed(sync.sync_albums(AlbumSyncOptions::default()).await.unwrap());
    assert!(first.has_more);
    assert_eq!(first.next_cursor.as_deref(), Some("1"));

    let second = completed(
        sync.sync_albums(AlbumSyncOptions {
            force: true,
            ..Default::default()
        })
        .await
        .unwrap(),
    );
    assert!(!second.has_more);
    assert_eq!(second.album_ids, vec!["a2", "a3"]);

    let index = app.db.get_albums_index().await.unwrap().unwrap();
    let ids: Vec<_> = index.albums.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3"]);

    // A restart replaces the index with the first page.
    completed(
        sync.sync_albums(AlbumSyncOptions {
            force: true,
            restart: true,
            ..Default::default()
        })
        .await
        .unwrap(),
    );
    let index = app.db.get_albums_index().await.unwrap().unwrap();
    assert_eq!(index.total_count, 2);
}

#[tokio::test]
async fn test_budget_floor_rejects_before_any_call() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_pages(&[&["a1"]]);
    seed_hourly(&app.db, 96).await;

    let err = app
        .sync()
        .unwrap()
        .sync_albums(AlbumSyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BudgetProtected { remaining: 4, .. }));
    assert_eq!(upstream.api_calls(), 0);
}

#[tokio::test]
async fn test_missing_tokens_abort_and_record_attempt() {
    let (base, upstream) = spawn_upstream().await;
    let app = test_app(test_config(&base));

    let err = app
        .sync()
        .unwrap()
        .sync_albums(AlbumSyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AuthRequired));
    assert_eq!(upstream.api_calls(), 0);

    let state = app.db.get_sync_state().await.unwrap();
    assert!(state.last_attempt.is_some());
    assert!(state.last_sync.is_none());
    assert_eq!(state.errors.len(), 1);
}

#[tokio::test]
async fn test_aborted_listing_keeps_fetched_pages() {
    let (app, upstream) =
        authenticated_app_with(|config| config.rate_limits.hourly_limit = 3).await;
    upstream.set_album_pages(&[&["a1"], &["a2"], &["a3"]]);
    let sync = app.sync().unwrap();
    let forced = AlbumSyncOptions {
        force: true,
        ..Default::default()
    };

    // Catalog plus two pages use the whole hour; the third page is refused.
    let err = sync.sync_albums(forced.clone()).await.unwrap_err();
    assert!(matches!(err, AppError::BudgetProtected { .. }));

    let state = app.db.get_sync_state().await.unwrap();
    assert_eq!(state.cursor.as_deref(), Some("2"));
    assert_eq!(state.total_synced, 2);
    assert_eq!(state.last_batch_size, 2);
    assert!(state.last_sync.is_none());
    let index = app.db.get_albums_index().await.unwrap().unwrap();
    let ids: Vec<_> = index.albums.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2"]);

    // Next hour: the resumed pass appends the remaining page.
    seed_hourly(&app.db, 0).await;
    let report = completed(sync.sync_albums(forced).await.unwrap());
    assert_eq!(report.album_ids, vec!["a3"]);
    assert!(!report.has_more);

    let index = app.db.get_albums_index().await.unwrap().unwrap();
    let ids: Vec<_> = index.albums.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3"]);
    assert_eq!(app.db.get_sync_state().await.unwrap().total_synced, 3);
}

// ═══════════════════════════════════════════════════════════════════════════
// PER-ALBUM ASSETS AND RENDITIONS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_partial_rendition_failure_is_isolated() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_assets(
        "album-1",
        &["asset-1", "asset-2", "asset-3", "asset-4", "asset-5"],
    );
    upstream.fail_asset("asset-3");

    let report = completed_assets(
        app.sync()
            .unwrap()
            .sync_album_assets("album-1", single_size())
            .await
            .unwrap(),
    );
    assert_eq!(report.assets_found, 5);
    assert_eq!(report.assets_processed, 5);
    assert_eq!(report.renditions_downloaded, 4);
    assert_eq!(report.renditions_synced, 4);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].item_id, "asset-3");
    assert_eq!(report.errors[0].size.as_deref(), Some("640"));
    assert_eq!(report.errors[0].status, Some(404));

    for id in ["asset-1", "asset-2", "asset-4", "asset-5"] {
        assert!(app.db.has_rendition(id, RenditionSize::S640).await.unwrap());
    }
    assert!(!app.db.has_rendition("asset-3", RenditionSize::S640).await.unwrap());

    let detail = app.db.get_album_detail("album-1").await.unwrap().unwrap();
    assert_eq!(detail.asset_count, 5);
    assert_eq!(detail.renditions_synced, 4);
    assert!(detail.last_rendition_sync.is_some());
}

#[tokio::test]
async fn test_cached_renditions_are_not_downloaded_again() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_assets("album-1", &["asset-1", "asset-2"]);
    let sync = app.sync().unwrap();

    let first = completed_assets(sync.sync_album_assets("album-1", single_size()).await.unwrap());
    assert_eq!(first.renditions_downloaded, 2);
    assert_eq!(upstream.rendition_calls(), 2);

    let second = completed_assets(
        sync.sync_album_assets(
            "album-1",
            AssetSyncOptions {
                force: true,
                ..single_size()
            },
        )
        .await
        .unwrap(),
    );
    assert_eq!(second.assets_processed, 0);
    assert_eq!(second.renditions_downloaded, 0);
    assert_eq!(second.renditions_synced, 2);
    assert_eq!(upstream.rendition_calls(), 2);
}

#[tokio::test]
async fn test_fresh_album_is_skipped() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_assets("album-1", &["asset-1"]);
    let sync = app.sync().unwrap();

    completed_assets(sync.sync_album_assets("album-1", single_size()).await.unwrap());
    let calls = upstream.api_calls();

    let outcome = sync.sync_album_assets("album-1", single_size()).await.unwrap();
    assert!(matches!(outcome, AlbumAssetsOutcome::Skipped { .. }));
    assert_eq!(upstream.api_calls(), calls);
}

#[tokio::test]
async fn test_asset_listing_resumes_after_page_cap() {
    let (app, upstream) = authenticated_app_with(|config| {
        config.sync.max_asset_pages = 1;
        config.sync.asset_page_size = 2;
    })
    .await;
    upstream.set_album_assets("album-1", &["a1", "a2", "a3", "a4", "a5"]);
    let sync = app.sync().unwrap();
    let options = AssetSyncOptions {
        max_assets: Some(0),
        ..single_size()
    };

    let first = completed_assets(sync.sync_album_assets("album-1", options.clone()).await.unwrap());
    assert_eq!(first.assets_found, 2);
    assert!(first.has_more);
    let state = app.db.get_album_sync_state("album-1").await.unwrap();
    assert_eq!(state.cursor.as_deref(), Some("2"));

    // A pending cursor overrides the freshness window.
    let second = completed_assets(sync.sync_album_assets("album-1", options.clone()).await.unwrap());
    assert_eq!(second.assets_found, 4);

    let third = completed_assets(sync.sync_album_assets("album-1", options).await.unwrap());
    assert_eq!(third.assets_found, 5);
    assert!(!third.has_more);
    assert!(app.db.get_album_sync_state("album-1").await.unwrap().cursor.is_none());
}

#[tokio::test]
async fn test_rendition_cap_limits_downloads() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_assets("album-1", &["a1", "a2", "a3"]);

    let report = completed_assets(
        app.sync()
            .unwrap()
            .sync_album_assets(
                "album-1",
                AssetSyncOptions {
                    max_assets: Some(2),
                    ..single_size()
                },
            )
            .await
            .unwrap(),
    );
    assert_eq!(report.assets_processed, 2);
    assert_eq!(report.renditions_synced, 2);
    assert!(!app.db.has_rendition("a3", RenditionSize::S640).await.unwrap());
    assert!(app
        .db
        .get_document::<serde_json::Value>("assets/a1/metadata.json")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_public_albums_are_synced() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_assets("album-1", &["asset-1"]);
    upstream.set_album_assets("album-2", &["asset-2"]);
    app.db
        .set_flags(
            "album-1",
            &AlbumFlags {
                public: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    app.db
        .set_flags("album-2", &AlbumFlags::default())
        .await
        .unwrap();

    let results = app.sync().unwrap().sync_public_albums(false).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].album_id, "album-1");
    assert!(results[0].error.is_none());
    assert!(app.db.get_album_detail("album-2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_album_detail_is_resynced() {
    let (app, upstream) = authenticated_app().await;
    upstream.set_album_assets("album-1", &["asset-1"]);
    let stale = lightroom_mirror::models::AlbumDetail::new(
        "album-1",
        Vec::new(),
        Utc::now() - Duration::hours(25),
    );
    app.db.put_album_detail(&stale).await.unwrap();

    let report = completed_assets(
        app.sync()
            .unwrap()
            .sync_album_assets("album-1", single_size())
            .await
            .unwrap(),
    );
    assert_eq!(report.assets_found, 1);
}

#[tokio::test]
async fn test_aborted_rendition_pass_is_not_fresh() {
    let (app, upstream) = authenticated_app_with(|config| {
        config.rate_limits.hourly_limit = 4;
        config.sync.max_asset_pages = 1;
        config.sync.budget_floor = 0;
    })
    .await;
    let assets = ["asset-1", "asset-2", "asset-3", "asset-4", "asset-5"];
    upstream.set_album_assets("album-1", &assets);
    let sync = app.sync().unwrap();

    // Catalog and asset page plus two renditions exhaust the hour.
    let err = sync
        .sync_album_assets(
            "album-1",
            AssetSyncOptions {
                force: true,
                ..single_size()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BudgetProtected { .. }));
    assert_eq!(upstream.rendition_calls(), 2);
    let state = app.db.get_album_sync_state("album-1").await.unwrap();
    assert!(state.last_sync.is_none());
    assert!(state.last_attempt.is_some());

    // Next hour, without forcing, the album is synced again rather than skipped.
    seed_hourly(&app.db, 0).await;
    let report = completed_assets(sync.sync_album_assets("album-1", single_size()).await.unwrap());
    assert_eq!(report.renditions_downloaded, 3);
    assert_eq!(report.renditions_synced, 5);
    for id in assets {
        assert!(app.db.has_rendition(id, RenditionSize::S640).await.unwrap());
    }
    assert!(app
        .db
        .get_album_sync_state("album-1")
        .await
        .unwrap()
        .last_sync
        .is_some());
}
