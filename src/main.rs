// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lightroom Mirror sync runner
//!
//! Runs one sync pass against the Lightroom catalog and prints the outcome
//! as JSON. Scheduling is left to whatever invokes it.

use clap::Parser;
use lightroom_mirror::{
    config::Config,
    services::{AlbumSyncOptions, AssetSyncOptions},
    AppState,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(version, about = "Sync a Lightroom catalog into the local cache")]
struct Args {
    /// Ignore the minimum sync interval, freshness window and budget floor
    #[arg(long)]
    force: bool,

    /// Drop the saved listing cursor and start from the first page
    #[arg(long)]
    restart: bool,

    /// Albums per listing page (capped at 250)
    #[arg(long)]
    limit: Option<u32>,

    /// Sync assets and renditions of this album instead of the listing
    #[arg(long, conflicts_with = "public")]
    album: Option<String>,

    /// Also sync assets and renditions of every public album
    #[arg(long)]
    public: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    let args = Args::parse();
    let config = Config::from_env()?;
    tracing::info!(environment = ?config.environment, "Starting Lightroom sync");

    let state = AppState::build(config).await?;
    let sync = state.sync()?;

    let output = match &args.album {
        Some(album_id) => {
            let options = AssetSyncOptions {
                force: args.force,
                ..Default::default()
            };
            json!({ "album": sync.sync_album_assets(album_id, options).await? })
        }
        None => {
            let options = AlbumSyncOptions {
                force: args.force,
                limit: args.limit,
                restart: args.restart,
                subtype: None,
            };
            let albums = sync.sync_albums(options).await?;
            if args.public {
                let public = sync.sync_public_albums(args.force).await?;
                json!({ "albums": albums, "publicAlbums": public })
            } else {
                json!({ "albums": albums })
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lightroom_mirror=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
