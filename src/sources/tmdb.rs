use std::{num::NonZeroU32, sync::Arc};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{RetryPolicy, SourceConnector, SourceError, fetch};
use crate::{
    clean::contains_cjk,
    models::{Candidate, Locale, Movie, Source, non_empty},
};

const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";
const YOUTUBE_WATCH: &str = "https://www.youtube.com/watch?v=";

#[derive(Clone, Debug)]
pub enum TmdbAuth {
    /// v4 read access token, sent as a bearer header.
    Bearer(String),
    /// v3 key, sent as the `api_key` query parameter.
    ApiKey(String),
}

pub struct TmdbClient {
    client: reqwest::Client,
    auth: TmdbAuth,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    retry: RetryPolicy,
    max_candidates: usize,
}

impl TmdbClient {
    pub fn new(
        client: reqwest::Client,
        auth: TmdbAuth,
        base_url: String,
        rps: u32,
        retry: RetryPolicy,
        max_candidates: usize,
    ) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN));
        Self {
            client,
            auth,
            base_url,
            limiter: Arc::new(RateLimiter::direct(quota)),
            retry,
            max_candidates,
        }
    }

    fn request(&self, path: &str, query: &[(&str, String)]) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let req = self.client.get(url).query(query);
        match &self.auth {
            TmdbAuth::Bearer(token) => req.bearer_auth(token),
            TmdbAuth::ApiKey(key) => req.query(&[("api_key", key)]),
        }
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Vec<u8>>, SourceError> {
        self.retry
            .run(Source::Tmdb, move || async move {
                self.limiter.until_ready().await;
                fetch(self.request(path, query)).await
            })
            .await
    }

    async fn details(&self, tmdb_id: i64) -> Result<Option<Candidate>, SourceError> {
        let query = [
            ("language", Locale::En.as_tmdb_code().to_string()),
            ("append_to_response", "external_ids,videos,credits,translations".to_string()),
        ];
        let Some(body) = self.get(&format!("/movie/{tmdb_id}"), &query).await? else {
            debug!(tmdb_id, "tmdb movie not found");
            return Ok(None);
        };
        let Some(mut candidate) = parse_details(&body) else {
            return Ok(None);
        };

        // Chinese director credits need a second localized request.
        let zh = [("language", Locale::ZhCn.as_tmdb_code().to_string())];
        match self.get(&format!("/movie/{tmdb_id}/credits"), &zh).await {
            Ok(Some(body)) => candidate.director_cn = parse_directors(&body, true),
            Ok(None) => {},
            Err(e) => debug!(tmdb_id, error = %e, "no chinese credits"),
        }
        Ok(Some(candidate))
    }

    async fn find_by_imdb(&self, imdb_id: &str) -> Result<Option<i64>, SourceError> {
        let query = [("external_source", "imdb_id".to_string())];
        let body = self.get(&format!("/find/{}", urlencoding::encode(imdb_id)), &query).await?;
        Ok(body.and_then(|b| parse_find(&b)))
    }
}

#[async_trait]
impl SourceConnector for TmdbClient {
    fn source(&self) -> Source {
        Source::Tmdb
    }

    async fn search(&self, title: &str, year: Option<i32>) -> Result<Vec<Candidate>, SourceError> {
        let mut query = vec![
            ("query", title.to_string()),
            ("language", Locale::En.as_tmdb_code().to_string()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(year) = year {
            query.push(("year", year.to_string()));
        }
        let body = self.get("/search/movie", &query).await?;
        let candidates = body.map(|b| parse_search(&b, self.max_candidates)).unwrap_or_default();
        debug!(title = %title, ?year, count = candidates.len(), "tmdb search");
        Ok(candidates)
    }

    async fn lookup(&self, movie: &Movie) -> Result<Option<Candidate>, SourceError> {
        let tmdb_id = match (movie.tmdb_id, non_empty(movie.imdb_id.as_deref())) {
            (Some(id), _) => Some(id),
            (None, Some(imdb)) => self.find_by_imdb(imdb).await?,
            (None, None) => None,
        };
        match tmdb_id {
            Some(id) => self.details(id).await,
            None => Ok(None),
        }
    }

    async fn hydrate(&self, candidate: Candidate) -> Result<Candidate, SourceError> {
        let Some(id) = candidate.tmdb_id else {
            return Ok(candidate);
        };
        Ok(self.details(id).await?.unwrap_or(candidate))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<MovieResult>,
}

#[derive(Debug, Deserialize)]
struct MovieResult {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    vote_average: Option<f64>,
    #[serde(default)]
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(flatten)]
    movie: MovieResult,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    external_ids: Option<ExternalIds>,
    #[serde(default)]
    videos: Option<Videos>,
    #[serde(default)]
    credits: Option<Credits>,
    #[serde(default)]
    translations: Option<Translations>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(default)]
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Videos {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    key: String,
    #[serde(default)]
    site: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Credits {
    #[serde(default)]
    crew: Vec<CrewMember>,
}

#[derive(Debug, Deserialize)]
struct CrewMember {
    name: String,
    #[serde(default)]
    job: String,
}

#[derive(Debug, Deserialize)]
struct Translations {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    iso_639_1: String,
    #[serde(default)]
    iso_3166_1: String,
    #[serde(default)]
    data: Option<TranslationData>,
}

#[derive(Debug, Deserialize)]
struct TranslationData {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    overview: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<MovieResult>,
}

fn release_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

impl MovieResult {
    fn into_candidate(self) -> Candidate {
        let title = self.title.clone().or(self.original_title.clone()).unwrap_or_default();
        let mut c = Candidate::new(Source::Tmdb, title);
        c.tmdb_id = Some(self.id);
        c.year = release_year(self.release_date.as_deref());
        c.original_title = self.original_title.filter(|t| !t.trim().is_empty());
        c.rating = self.vote_average.filter(|r| *r > 0.0);
        c.image_url = non_empty(self.poster_path.as_deref()).map(|p| format!("{POSTER_BASE}{p}"));
        if let Some(overview) = non_empty(self.overview.as_deref()) {
            c.overviews.insert(Locale::En, overview.to_string());
        }
        c
    }
}

pub(crate) fn parse_search(body: &[u8], max: usize) -> Vec<Candidate> {
    match serde_json::from_slice::<SearchResponse>(body) {
        Ok(resp) => resp.results.into_iter().take(max).map(MovieResult::into_candidate).collect(),
        Err(e) => {
            warn!(error = %e, "unparseable tmdb search response");
            Vec::new()
        },
    }
}

pub(crate) fn parse_details(body: &[u8]) -> Option<Candidate> {
    let resp: DetailsResponse = match serde_json::from_slice(body) {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "unparseable tmdb details response");
            return None;
        },
    };

    let mut c = resp.movie.into_candidate();
    c.imdb_id = resp
        .imdb_id
        .or(resp.external_ids.and_then(|e| e.imdb_id))
        .filter(|id| !id.trim().is_empty());

    if let Some(credits) = resp.credits {
        c.director = join_directors(&credits.crew);
    }

    c.trailer_url = resp.videos.and_then(|v| {
        v.results
            .into_iter()
            .find(|v| v.site == "YouTube" && v.kind == "Trailer")
            .map(|v| format!("{YOUTUBE_WATCH}{}", v.key))
    });

    for t in resp.translations.map(|t| t.translations).unwrap_or_default() {
        let (Some(locale), Some(data)) = (Locale::from_parts(&t.iso_639_1, &t.iso_3166_1), t.data)
        else {
            continue;
        };
        if let Some(title) = non_empty(data.title.as_deref()) {
            if locale != Locale::En {
                c.titles.entry(locale).or_insert_with(|| title.to_string());
            }
        }
        if let Some(overview) = non_empty(data.overview.as_deref()) {
            c.overviews.entry(locale).or_insert_with(|| overview.to_string());
        }
    }
    Some(c)
}

/// Director names from a credits body. With `cjk_only`, names without any
/// CJK characters are treated as untranslated and dropped.
pub(crate) fn parse_directors(body: &[u8], cjk_only: bool) -> Option<String> {
    let credits: Credits = serde_json::from_slice(body).ok()?;
    let names = join_directors(&credits.crew)?;
    (!cjk_only || contains_cjk(&names)).then_some(names)
}

fn join_directors(crew: &[CrewMember]) -> Option<String> {
    let names: Vec<&str> = crew
        .iter()
        .filter(|m| m.job == "Director")
        .filter_map(|m| non_empty(Some(m.name.as_str())))
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

pub(crate) fn parse_find(body: &[u8]) -> Option<i64> {
    let resp: FindResponse = serde_json::from_slice(body).ok()?;
    resp.movie_results.first().map(|m| m.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = r#"{
        "page": 1,
        "results": [
            {"id": 581734, "title": "Nomadland", "original_title": "Nomadland",
             "release_date": "2020-09-11", "overview": "A woman embarks on a journey.",
             "vote_average": 7.1, "poster_path": "/k8.jpg"},
            {"id": 1, "title": "Nomadland Extra", "release_date": "", "vote_average": 0},
            {"id": 2, "title": "Third", "release_date": null}
        ]
    }"#;

    const DETAILS: &str = r#"{
        "id": 581734,
        "title": "Nomadland",
        "original_title": "Nomadland",
        "release_date": "2020-09-11",
        "overview": "A woman in her sixties embarks on a journey.",
        "vote_average": 7.1,
        "poster_path": "/k8.jpg",
        "imdb_id": "tt9770150",
        "external_ids": {"imdb_id": "tt9770150"},
        "videos": {"results": [
            {"key": "abc", "site": "Vimeo", "type": "Trailer"},
            {"key": "tease", "site": "YouTube", "type": "Teaser"},
            {"key": "6sxCFZ8_d84", "site": "YouTube", "type": "Trailer"}
        ]},
        "credits": {"crew": [
            {"name": "Chloé Zhao", "job": "Director"},
            {"name": "Joshua James Richards", "job": "Director of Photography"}
        ]},
        "translations": {"translations": [
            {"iso_639_1": "en", "iso_3166_1": "US", "data": {"title": "", "overview": "English."}},
            {"iso_639_1": "zh", "iso_3166_1": "TW", "data": {"title": "游牧人生", "overview": "台湾简介"}},
            {"iso_639_1": "zh", "iso_3166_1": "CN", "data": {"title": "无依之地", "overview": "大陆简介"}},
            {"iso_639_1": "zh", "iso_3166_1": "SG", "data": {"title": "无依之地", "overview": ""}},
            {"iso_639_1": "fr", "iso_3166_1": "FR", "data": {"title": "Nomadland", "overview": "Français."}}
        ]}
    }"#;

    #[test]
    fn search_results_become_bounded_candidates() {
        let candidates = parse_search(SEARCH.as_bytes(), 2);
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.tmdb_id, Some(581734));
        assert_eq!(first.year, Some(2020));
        assert_eq!(first.rating, Some(7.1));
        assert_eq!(first.image_url.as_deref(), Some("https://image.tmdb.org/t/p/w500/k8.jpg"));
        assert_eq!(first.overview_in(Locale::En), Some("A woman embarks on a journey."));

        assert_eq!(candidates[1].year, None);
        assert_eq!(candidates[1].rating, None);
    }

    #[test]
    fn malformed_or_empty_bodies_yield_no_candidates() {
        assert!(parse_search(b"<html>busy</html>", 10).is_empty());
        assert!(parse_search(b"{}", 10).is_empty());
        assert!(parse_details(b"not json").is_none());
    }

    #[test]
    fn details_carry_ids_directors_trailer_and_translations() {
        let c = parse_details(DETAILS.as_bytes()).unwrap();
        assert_eq!(c.imdb_id.as_deref(), Some("tt9770150"));
        assert_eq!(c.director.as_deref(), Some("Chloé Zhao"));
        assert_eq!(c.trailer_url.as_deref(), Some("https://www.youtube.com/watch?v=6sxCFZ8_d84"));
        assert_eq!(c.titles.get(&Locale::ZhCn).map(String::as_str), Some("无依之地"));
        assert_eq!(c.titles.get(&Locale::ZhTw).map(String::as_str), Some("游牧人生"));
        assert_eq!(c.titles.get(&Locale::Zh).map(String::as_str), Some("无依之地"));
        assert_eq!(c.overview_in(Locale::ZhCn), Some("大陆简介"));
        assert_eq!(c.overview_in(Locale::Zh), None);
        // The main overview wins over the English translation entry.
        assert_eq!(c.overview_in(Locale::En), Some("A woman in her sixties embarks on a journey."));
    }

    #[test]
    fn chinese_directors_require_cjk_names() {
        let zh = r#"{"crew": [{"name": "赵婷", "job": "Director"}]}"#;
        assert_eq!(parse_directors(zh.as_bytes(), true).as_deref(), Some("赵婷"));

        let echo = r#"{"crew": [{"name": "Chloé Zhao", "job": "Director"}]}"#;
        assert_eq!(parse_directors(echo.as_bytes(), true), None);
        assert_eq!(parse_directors(echo.as_bytes(), false).as_deref(), Some("Chloé Zhao"));
    }

    #[test]
    fn find_returns_first_movie_id() {
        let body = r#"{"movie_results": [{"id": 581734, "title": "Nomadland"}], "tv_results": []}"#;
        assert_eq!(parse_find(body.as_bytes()), Some(581734));
        assert_eq!(parse_find(br#"{"movie_results": []}"#), None);
    }
}
