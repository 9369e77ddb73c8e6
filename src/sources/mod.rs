pub mod omdb;
pub mod retry;
pub mod tmdb;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{info, warn};

pub use self::{omdb::OmdbClient, retry::RetryPolicy, tmdb::TmdbClient};
use crate::{
    config::Config,
    error::EnrichError,
    models::{Candidate, Movie, Source},
};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("{connector} unavailable after {attempts} attempt(s): {reason}")]
    Unavailable { connector: Source, attempts: u32, reason: String },
}

impl SourceError {
    /// Transport failures, timeouts, 5xx, 408 and 429 are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Http(_) => true,
            SourceError::Status(status) => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            },
            SourceError::Unavailable { .. } => false,
        }
    }

    pub fn into_enrich(self, connector: Source) -> EnrichError {
        match self {
            SourceError::Unavailable { connector, attempts, reason } => {
                EnrichError::SourceUnavailable { connector, attempts, reason }
            },
            other => {
                EnrichError::SourceUnavailable { connector, attempts: 1, reason: other.to_string() }
            },
        }
    }
}

/// A movie catalog the enrichment batch can query.
///
/// Implementations return at most their configured number of candidates and
/// treat empty or unparseable bodies as "no candidates", not as errors.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn source(&self) -> Source;

    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError>;

    /// Direct fetch by an external id already stored on the movie.
    async fn lookup(&self, _movie: &Movie) -> Result<Option<Candidate>, SourceError> {
        Ok(None)
    }

    /// Fills in detail fields for a selected candidate.
    async fn hydrate(&self, candidate: Candidate) -> Result<Candidate, SourceError> {
        Ok(candidate)
    }
}

/// Sends one GET and returns the body. `Ok(None)` means the upstream has no such resource.
pub(crate) async fn fetch(req: reqwest::RequestBuilder) -> Result<Option<Vec<u8>>, SourceError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(SourceError::Status(status));
    }
    Ok(Some(resp.bytes().await?.to_vec()))
}

/// Builds the connectors that have credentials, in configured priority order.
pub fn from_config(config: &Config, http: &reqwest::Client) -> Vec<Box<dyn SourceConnector>> {
    let retry = config.retry_policy();
    let mut connectors: Vec<Box<dyn SourceConnector>> = Vec::new();

    for source in config.source_priority.order() {
        match source {
            Source::Tmdb => match config.tmdb_auth() {
                Some(auth) => connectors.push(Box::new(TmdbClient::new(
                    http.clone(),
                    auth,
                    config.tmdb_base_url.clone(),
                    config.tmdb_rps,
                    retry.clone(),
                    config.max_candidates,
                ))),
                None => warn!("no TMDB_ACCESS_TOKEN or TMDB_API_KEY, TMDB lookups disabled"),
            },
            Source::Omdb => match config.omdb_api_key.clone() {
                Some(key) => connectors.push(Box::new(OmdbClient::new(
                    http.clone(),
                    key,
                    config.omdb_base_url.clone(),
                    retry.clone(),
                    config.max_candidates,
                ))),
                None => warn!("no OMDB_API_KEY, OMDb lookups disabled"),
            },
        }
    }

    info!(
        sources = ?connectors.iter().map(|c| c.source()).collect::<Vec<_>>(),
        "source connectors ready"
    );
    connectors
}
