use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{RetryPolicy, SourceConnector, SourceError, fetch};
use crate::models::{Candidate, Locale, Movie, Source, non_empty};

pub struct OmdbClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
    max_candidates: usize,
}

impl OmdbClient {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        retry: RetryPolicy,
        max_candidates: usize,
    ) -> Self {
        Self { client, api_key, base_url, retry, max_candidates }
    }

    async fn get(&self, query: &[(&str, String)]) -> Result<Option<Vec<u8>>, SourceError> {
        self.retry
            .run(Source::Omdb, move || async move {
                let req = self
                    .client
                    .get(&self.base_url)
                    .query(&[("apikey", self.api_key.as_str()), ("r", "json")])
                    .query(query);
                fetch(req).await
            })
            .await
    }

    async fn by_imdb_id(&self, imdb_id: &str) -> Result<Option<Candidate>, SourceError> {
        let query = [("i", imdb_id.to_string()), ("plot", "full".to_string())];
        Ok(self.get(&query).await?.and_then(|b| parse_title(&b)))
    }
}

#[async_trait]
impl SourceConnector for OmdbClient {
    fn source(&self) -> Source {
        Source::Omdb
    }

    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError> {
        let mut candidates = self
            .get(&list_query(title, year))
            .await?
            .map(|b| parse_search(&b, self.max_candidates))
            .unwrap_or_default();

        // The list endpoint misses some titles the single-title endpoint resolves.
        if candidates.is_empty() {
            let single = self.get(&single_query(title, year)).await?;
            candidates.extend(single.and_then(|b| parse_title(&b)));
        }

        debug!(title = %title, ?year, count = candidates.len(), "omdb search");
        Ok(candidates)
    }

    async fn lookup(&self, movie: &Movie) -> Result<Option<Candidate>, SourceError> {
        match non_empty(movie.imdb_id.as_deref()) {
            Some(imdb_id) => self.by_imdb_id(imdb_id).await,
            None => Ok(None),
        }
    }

    async fn hydrate(&self, candidate: Candidate) -> Result<Candidate, SourceError> {
        let Some(imdb_id) = candidate.imdb_id.clone() else {
            return Ok(candidate);
        };
        Ok(self.by_imdb_id(&imdb_id).await?.unwrap_or(candidate))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchItem>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Year", default)]
    year: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: String,
    #[serde(rename = "Poster", default)]
    poster: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleResponse {
    #[serde(rename = "Response", default)]
    response: String,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Year", default)]
    year: Option<String>,
    #[serde(rename = "imdbID", default)]
    imdb_id: Option<String>,
    #[serde(rename = "Director", default)]
    director: Option<String>,
    #[serde(rename = "Plot", default)]
    plot: Option<String>,
    #[serde(rename = "Poster", default)]
    poster: Option<String>,
    #[serde(rename = "imdbRating", default)]
    imdb_rating: Option<String>,
}

fn list_query(title: &str, year: Option<i32>) -> Vec<(&'static str, String)> {
    let mut query = vec![("s", title.to_string()), ("type", "movie".to_string())];
    query.extend(year.map(|y| ("y", y.to_string())));
    query
}

fn single_query(title: &str, year: Option<i32>) -> Vec<(&'static str, String)> {
    let mut query = vec![("t", title.to_string()), ("type", "movie".to_string())];
    query.extend(year.map(|y| ("y", y.to_string())));
    query.push(("plot", "full".to_string()));
    query
}

/// OMDb marks missing values with the literal "N/A".
fn present(value: Option<&str>) -> Option<&str> {
    non_empty(value).filter(|v| *v != "N/A")
}

// Years come as "2020", "2019–2021" or "2019–".
fn first_year(value: Option<&str>) -> Option<i32> {
    present(value).and_then(|v| v.get(..4)).and_then(|y| y.parse().ok())
}

pub(crate) fn parse_search(body: &[u8], max: usize) -> Vec<Candidate> {
    let resp: SearchResponse = match serde_json::from_slice(body) {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "unparseable omdb search response");
            return Vec::new();
        },
    };
    if resp.response != "True" {
        debug!(error = ?resp.error, "omdb search returned nothing");
        return Vec::new();
    }
    resp.search
        .into_iter()
        .take(max)
        .map(|item| {
            let mut c = Candidate::new(Source::Omdb, item.title);
            c.imdb_id = present(Some(item.imdb_id.as_str())).map(str::to_string);
            c.year = first_year(item.year.as_deref());
            c.image_url = present(item.poster.as_deref()).map(str::to_string);
            c
        })
        .collect()
}

pub(crate) fn parse_title(body: &[u8]) -> Option<Candidate> {
    let resp: TitleResponse = match serde_json::from_slice(body) {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "unparseable omdb title response");
            return None;
        },
    };
    if resp.response != "True" {
        return None;
    }

    let mut c = Candidate::new(Source::Omdb, present(resp.title.as_deref())?);
    c.imdb_id = present(resp.imdb_id.as_deref()).map(str::to_string);
    c.year = first_year(resp.year.as_deref());
    c.director = present(resp.director.as_deref()).map(str::to_string);
    c.image_url = present(resp.poster.as_deref()).map(str::to_string);
    c.rating = present(resp.imdb_rating.as_deref()).and_then(|r| r.parse().ok());
    if let Some(plot) = present(resp.plot.as_deref()) {
        c.overviews.insert(Locale::En, plot.to_string());
    }
    Some(c)
}
