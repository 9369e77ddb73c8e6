use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::models::Source;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    inner: anyhow::Error,
}

impl AppError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self { status: StatusCode::NOT_FOUND, inner: anyhow::anyhow!("{what} not found") }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, inner: err }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        anyhow::Error::new(err).into()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        anyhow::Error::new(err).into()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.inner, "request failed");
        }
        (self.status, Json(json!({ "error": self.inner.to_string() }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Per-record enrichment outcomes that are not plain success.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("{connector} unavailable after {attempts} attempt(s): {reason}")]
    SourceUnavailable { connector: Source, attempts: u32, reason: String },
    #[error("no candidate above the match threshold")]
    NoMatch,
    #[error("{field} conflict: keeping {local:?}, ignoring {external:?}")]
    MergeConflict { field: &'static str, local: String, external: String },
    #[error("malformed text in {field}")]
    MalformedText { field: &'static str },
    #[error(transparent)]
    Store(#[from] sea_orm::DbErr),
}

impl EnrichError {
    /// Store errors that mean the connection is gone; the batch stops on these.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EnrichError::Store(err) if crate::store::is_connection_loss(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_renders_json_error() {
        let resp = AppError::not_found("movie 9").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "movie 9 not found");
    }

    #[test]
    fn only_connection_errors_are_fatal() {
        let lost = EnrichError::Store(sea_orm::DbErr::Conn(sea_orm::RuntimeErr::Internal(
            "closed".into(),
        )));
        assert!(lost.is_fatal());
        assert!(!EnrichError::Store(sea_orm::DbErr::RecordNotUpdated).is_fatal());
        assert!(!EnrichError::NoMatch.is_fatal());
    }
}
