use axum::Json;
use axum::extract::State;
use serde::Serialize;
use sticker_core::{MetadataRow, PackDescription, ShareOutcome};

use crate::http::ApiError;
use crate::server::ServerState;

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub outcome: ShareOutcome,
    pub pack: MetadataRow,
}

/// `POST /packs`: build and commit a pack, or return the one already committed.
pub async fn build(
    State(state): State<ServerState>,
    Json(description): Json<PackDescription>,
) -> Result<Json<MetadataRow>, ApiError> {
    match state.builder.build_outcome(description).await {
        Ok(outcome) => {
            if outcome.committed {
                state.health.record_commit();
            }
            Ok(Json(MetadataRow::from(outcome.pack.as_ref())))
        }
        Err(err) => {
            state.health.record_error(&err);
            Err(err.into())
        }
    }
}

/// `POST /share`: build, then hand the pack to the host application.
pub async fn share(
    State(state): State<ServerState>,
    Json(description): Json<PackDescription>,
) -> Result<Json<ShareResponse>, ApiError> {
    let receipt = state.share.share(description).await.map_err(|err| {
        state.health.record_error(&err);
        err
    })?;
    if receipt.committed {
        state.health.record_commit();
    }
    Ok(Json(ShareResponse {
        outcome: receipt.outcome,
        pack: MetadataRow::from(receipt.pack.as_ref()),
    }))
}
