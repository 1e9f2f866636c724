use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Router, serve};
use sticker_core::{PackBuilder, QueryService, ShareService};
use tokio::net::TcpListener;

use crate::http::{self, health::HealthState};

#[derive(Clone)]
pub struct ServerState {
    pub builder: PackBuilder,
    pub query: QueryService,
    pub share: ShareService,
    pub health: Arc<HealthState>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/provider/{*path}", get(http::provider::resolve))
        .route("/packs", post(http::packs::build))
        .route("/share", post(http::packs::share))
        .route("/healthz", get(http::health::handler))
        .with_state(state)
}

pub struct HostServer {
    listener: TcpListener,
    router: Router,
}

impl HostServer {
    pub async fn bind(addr: SocketAddr, state: ServerState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            listener,
            router: router(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "starting sticker host server");
        serve(self.listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("sticker host server stopped");
        Ok(())
    }
}
