use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::server::ServerState;

#[derive(Default)]
pub struct HealthState {
    meta: parking_lot::Mutex<HealthMeta>,
}

#[derive(Default, Clone)]
struct HealthMeta {
    last_commit: Option<OffsetDateTime>,
    last_error: Option<String>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&self) {
        let mut meta = self.meta.lock();
        meta.last_commit = Some(OffsetDateTime::now_utc());
        meta.last_error = None;
    }

    pub fn record_error(&self, err: &dyn std::fmt::Display) {
        let mut meta = self.meta.lock();
        meta.last_error = Some(err.to_string());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let meta = self.meta.lock().clone();
        HealthSnapshot {
            last_commit: meta.last_commit,
            last_error: meta.last_error,
        }
    }
}

pub struct HealthSnapshot {
    pub last_commit: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

pub async fn handler(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    let status = if snapshot.last_error.is_none() {
        "ok"
    } else {
        "degraded"
    };
    let last_commit = snapshot.last_commit.and_then(|ts| ts.format(&Rfc3339).ok());
    Json(serde_json::json!({
        "status": status,
        "packs": state.builder.registry().len(),
        "last_commit": last_commit,
        "last_error": snapshot.last_error,
    }))
}
