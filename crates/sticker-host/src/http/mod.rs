pub mod health;
pub mod packs;
pub mod provider;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sticker_core::{BuildError, QueryError, ShareError};

/// Error body shared by every endpoint: `{"error": ..., "kind": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Build(BuildError),
    Share(ShareError),
    Query(QueryError),
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        Self::Build(err)
    }
}

impl From<ShareError> for ApiError {
    fn from(err: ShareError) -> Self {
        Self::Share(err)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self::Query(err)
    }
}

fn build_status(err: &BuildError) -> (StatusCode, &'static str) {
    match err {
        BuildError::InvalidDescription(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_description"),
        BuildError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        BuildError::Network(_) => (StatusCode::BAD_GATEWAY, "network"),
        BuildError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        BuildError::Aborted(_) => (StatusCode::INTERNAL_SERVER_ERROR, "aborted"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, extra) = match &self {
            Self::Build(err) => {
                let (status, kind) = build_status(err);
                (status, kind, None)
            }
            Self::Share(ShareError::Build(err)) => {
                let (status, kind) = build_status(err);
                (status, kind, None)
            }
            Self::Share(ShareError::HostRejected(reason)) => {
                (StatusCode::CONFLICT, "host_rejected", reason.clone())
            }
            Self::Share(ShareError::Handoff(_)) => (StatusCode::BAD_GATEWAY, "handoff", None),
            Self::Share(ShareError::Aborted(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "aborted", None)
            }
            Self::Query(QueryError::NotFound) => (StatusCode::NOT_FOUND, "not_found", None),
            Self::Query(QueryError::UnknownRoute(_)) => {
                (StatusCode::BAD_REQUEST, "unknown_route", None)
            }
            Self::Query(QueryError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", None)
            }
        };
        let message = match &self {
            Self::Build(err) => err.to_string(),
            Self::Share(err) => err.to_string(),
            Self::Query(err) => err.to_string(),
        };
        let mut body = json!({ "error": message, "kind": kind });
        if let Some(reason) = extra {
            body["validation_error"] = reason.into();
        }
        (status, Json(body)).into_response()
    }
}
