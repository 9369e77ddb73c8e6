use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{Movie, Screening},
};

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

impl PageQuery {
    fn resolve(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        (page, limit)
    }
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    page: u64,
    limit: u64,
    total: u64,
    total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct Paged<T> {
    data: Vec<T>,
    meta: PageMeta,
}

impl<T> Paged<T> {
    fn new(data: Vec<T>, page: u64, limit: u64, total: u64) -> Self {
        Self { data, meta: PageMeta { page, limit, total, total_pages: total.div_ceil(limit) } }
    }
}

#[derive(Debug, Serialize)]
pub struct Data<T> {
    data: T,
}

#[derive(Debug, Serialize)]
pub struct MovieDetail {
    #[serde(flatten)]
    movie: Movie,
    screenings: Vec<Screening>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/movies", get(list_movies))
        .route("/api/movies/{id}", get(get_movie))
        .route("/api/screenings", get(list_screenings))
        .route("/api/screenings/by-movie/{id}", get(screenings_by_movie))
        .with_state(state)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> AppResult<Json<Paged<Movie>>> {
    let (page, limit) = q.resolve();
    let (movies, total) = state.store.page_movies(page, limit).await?;
    Ok(Json(Paged::new(movies, page, limit, total)))
}

pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<Data<MovieDetail>>> {
    let movie = state.store.get(id).await?.ok_or_else(|| AppError::not_found(format!("movie {id}")))?;
    let screenings = state.store.list_screenings(id).await?;
    Ok(Json(Data { data: MovieDetail { movie, screenings } }))
}

pub async fn list_screenings(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> AppResult<Json<Paged<Screening>>> {
    let (page, limit) = q.resolve();
    let (screenings, total) = state.store.page_screenings(page, limit).await?;
    Ok(Json(Paged::new(screenings, page, limit, total)))
}

pub async fn screenings_by_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<Data<Vec<Screening>>>> {
    if state.store.get(id).await?.is_none() {
        return Err(AppError::not_found(format!("movie {id}")));
    }
    Ok(Json(Data { data: state.store.list_screenings(id).await? }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::store::{
        MovieStore,
        tests::{corrupt, memory_store, new_movie, new_screening},
    };

    async fn app() -> (Router, MovieStore) {
        let store = memory_store().await;
        let state = Arc::new(AppState { store: store.clone() });
        (router(state), store)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app().await;
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn movie_list_is_paginated_with_clamped_limit() {
        let (app, store) = app().await;
        for i in 0..3 {
            store.insert_movie(&new_movie(&format!("Film {i}"))).await.unwrap();
        }

        let (status, body) = get_json(app.clone(), "/api/movies?page=2&limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["meta"], json!({"page": 2, "limit": 2, "total": 3, "total_pages": 2}));

        let (_, body) = get_json(app, "/api/movies?page=0&limit=500").await;
        assert_eq!(body["meta"]["page"], 1);
        assert_eq!(body["meta"]["limit"], MAX_LIMIT);
    }

    #[tokio::test]
    async fn movie_detail_includes_screenings() {
        let (app, store) = app().await;
        let m = store.insert_movie(&new_movie("Nomadland")).await.unwrap();
        store.insert_screening(&new_screening(m.id, "2025-03-01", "19:00")).await.unwrap();

        let (status, body) = get_json(app, &format!("/api/movies/{}", m.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title_en"], "Nomadland");
        assert_eq!(body["data"]["screenings"][0]["time"], "19:00");
    }

    #[tokio::test]
    async fn missing_movie_is_404_json() {
        let (app, _) = app().await;
        let (status, body) = get_json(app.clone(), "/api/movies/404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "movie 404 not found");

        let (status, _) = get_json(app, "/api/screenings/by-movie/404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn screenings_by_movie_lists_only_that_movie() {
        let (app, store) = app().await;
        let a = store.insert_movie(&new_movie("A")).await.unwrap();
        let b = store.insert_movie(&new_movie("B")).await.unwrap();
        store.insert_screening(&new_screening(a.id, "2025-03-01", "19:00")).await.unwrap();
        store.insert_screening(&new_screening(b.id, "2025-03-01", "21:00")).await.unwrap();

        let (_, body) = get_json(app.clone(), &format!("/api/screenings/by-movie/{}", b.id)).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["time"], "21:00");

        let (_, body) = get_json(app, "/api/screenings").await;
        assert_eq!(body["meta"]["total"], 2);
    }

    #[tokio::test]
    async fn malformed_rows_do_not_break_listing() {
        let (app, store) = app().await;
        store.insert_movie(&new_movie("Nomadland")).await.unwrap();
        let bad = store.insert_movie(&new_movie("Stalker")).await.unwrap();
        corrupt(&store, bad.id, "overview_cn").await;

        let (status, body) = get_json(app.clone(), "/api/movies").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 2);
        assert_eq!(body["data"][1]["overview_cn"], "赵\u{FFFD}");

        let (status, _) = get_json(app, &format!("/api/movies/{}", bad.id)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
