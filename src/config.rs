use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;

use crate::{
    matcher::DEFAULT_THRESHOLD,
    models::SourcePriority,
    sources::{RetryPolicy, retry::Backoff, tmdb::TmdbAuth},
};

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub tmdb_access_token: Option<String>,
    pub tmdb_api_key: Option<String>,
    pub tmdb_base_url: String,
    pub tmdb_rps: u32,
    pub omdb_api_key: Option<String>,
    pub omdb_base_url: String,
    pub overrides_path: PathBuf,
    pub source_priority: SourcePriority,
    pub match_threshold: f64,
    pub max_candidates: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff: Backoff,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://reelnyc.db?mode=rwc".to_string());

        let tmdb_base_url = std::env::var("TMDB_BASE_URL")
            .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string());
        let tmdb_rps: u32 =
            std::env::var("TMDB_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(4);

        let omdb_base_url = std::env::var("OMDB_BASE_URL")
            .unwrap_or_else(|_| "https://www.omdbapi.com/".to_string());

        let overrides_path = std::env::var("OVERRIDES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("overrides.toml"));

        let source_priority = match std::env::var("SOURCE_PRIORITY") {
            Ok(s) => s.parse().context("SOURCE_PRIORITY")?,
            Err(_) => SourcePriority::default(),
        };

        let match_threshold: f64 = std::env::var("MATCH_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|t: &f64| (0.0..1.0).contains(t))
            .unwrap_or(DEFAULT_THRESHOLD);

        let max_candidates: usize =
            std::env::var("MAX_CANDIDATES").ok().and_then(|s| s.parse().ok()).unwrap_or(10);

        let retry_max_attempts: u32 =
            std::env::var("RETRY_MAX_ATTEMPTS").ok().and_then(|s| s.parse().ok()).unwrap_or(3);

        let retry_base_delay_ms: u64 =
            std::env::var("RETRY_BASE_DELAY_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(500);

        let retry_backoff = match std::env::var("RETRY_BACKOFF") {
            Ok(s) => s.parse().context("RETRY_BACKOFF")?,
            Err(_) => Backoff::Exponential,
        };

        let http_timeout_secs: u64 =
            std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(30);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            tmdb_access_token: non_blank_var("TMDB_ACCESS_TOKEN"),
            tmdb_api_key: non_blank_var("TMDB_API_KEY"),
            tmdb_base_url,
            tmdb_rps,
            omdb_api_key: non_blank_var("OMDB_API_KEY"),
            omdb_base_url,
            overrides_path,
            source_priority,
            match_threshold,
            max_candidates: max_candidates.max(1),
            retry_max_attempts,
            retry_base_delay_ms,
            retry_backoff,
            http_timeout_secs,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            self.retry_backoff,
        )
    }

    /// The bearer token is preferred when both TMDB credentials are set.
    pub fn tmdb_auth(&self) -> Option<TmdbAuth> {
        self.tmdb_access_token
            .clone()
            .map(TmdbAuth::Bearer)
            .or_else(|| self.tmdb_api_key.clone().map(TmdbAuth::ApiKey))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn non_blank_var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
