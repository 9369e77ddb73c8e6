mod clean;
mod config;
mod db;
mod dedup;
mod entities;
mod error;
mod import;
mod links;
mod matcher;
mod merge;
mod models;
mod normalize;
mod overrides;
mod pipeline;
mod routes;
mod sources;
mod store;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    matcher::Matcher,
    overrides::OverrideTable,
    pipeline::{Enricher, Selection},
    store::MovieStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: MovieStore,
}

#[derive(Debug, Parser)]
#[command(name = "reelnyc", version, about = "Bilingual movie listings for NYC cinemas")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the read-only JSON API (default).
    Serve,
    /// Fill missing Chinese titles, overviews and ids from TMDB/OMDb.
    Enrich {
        /// Only this movie.
        #[arg(long, conflicts_with = "all")]
        movie: Option<i32>,
        /// Every movie, not just the incomplete ones.
        #[arg(long)]
        all: bool,
        /// Replace stored external ids with the matched ones.
        #[arg(long)]
        force_ids: bool,
    },
    /// Re-clean stored text fields.
    CleanText,
    /// Regenerate Letterboxd and Douban search links.
    Links,
    /// Collapse duplicate screenings.
    Dedup,
    /// Delete placeholder movies such as "Showtimes coming soon".
    Prune,
    /// Import a scraper JSON dump.
    Import {
        file: PathBuf,
        /// Cinema name for every screening in the file.
        #[arg(long)]
        cinema: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,reelnyc=debug,sqlx=warn".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store = MovieStore::new(db);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, store).await?,
        Command::Enrich { movie, all, force_ids } => {
            let http = reqwest::Client::builder()
                .user_agent(concat!("reelnyc/", env!("CARGO_PKG_VERSION")))
                .timeout(config.http_timeout())
                .build()?;
            let connectors = sources::from_config(&config, &http);
            let matcher = Matcher::new(config.match_threshold, config.source_priority.clone());
            let overrides = OverrideTable::load(&config.overrides_path)?;

            let selection = match (movie, all) {
                (Some(id), _) => Selection::One(id),
                (None, true) => Selection::All,
                (None, false) => Selection::NeedsEnrichment,
            };
            let report = Enricher::new(store, connectors, matcher, overrides)
                .force_ids(force_ids)
                .run(selection)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        Command::CleanText => {
            let report = pipeline::clean_stored_text(&store).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        Command::Links => {
            let updated = pipeline::regenerate_links(&store).await?;
            println!("{updated} movies updated");
        },
        Command::Dedup => {
            let report = dedup::dedup_screenings(&store).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        Command::Prune => {
            let report = dedup::prune_placeholders(&store).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        Command::Import { file, cinema } => {
            let report = import::import_file(&store, &file, cinema.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
    }

    Ok(())
}

async fn serve(config: &Config, store: MovieStore) -> anyhow::Result<()> {
    let state = Arc::new(AppState { store });

    let app = routes::router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
