use axum::Json;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use sticker_core::{QueryBody, QueryError};

use crate::http::ApiError;
use crate::server::ServerState;

/// Provider content type of row responses; the body itself is JSON.
pub const PROVIDER_TYPE_HEADER: HeaderName = HeaderName::from_static("x-provider-content-type");

/// `GET /provider/{*path}`: the read-only addressing scheme over committed packs.
pub async fn resolve(
    State(state): State<ServerState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let query = state.query.clone();
    let lookup = path.clone();
    let response = tokio::task::spawn_blocking(move || query.resolve(&lookup))
        .await
        .map_err(|err| QueryError::Unavailable(err.to_string()))?
        .map_err(|err| {
            tracing::debug!(path = %path, error = %err, "provider query failed");
            err
        })?;

    let provider_type = HeaderValue::from_str(&response.content_type)
        .map_err(|err| QueryError::Unavailable(err.to_string()))?;
    let mut http = match response.body {
        QueryBody::Packs(rows) => Json(rows).into_response(),
        QueryBody::Pack(row) => Json(row).into_response(),
        QueryBody::Stickers(rows) => Json(rows).into_response(),
        QueryBody::Asset(asset) => {
            return Ok(([(CONTENT_TYPE, asset.content_type)], asset.bytes).into_response());
        }
    };
    http.headers_mut().insert(PROVIDER_TYPE_HEADER, provider_type);
    Ok(http)
}
