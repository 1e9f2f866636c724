use std::sync::Arc;

use anyhow::{Context, Result};
use sticker_core::{
    HostHandoff, PackBuilder, PackRegistry, PackStore, QueryService, RasterCodec, ShareService,
};

use crate::config::HostConfig;
use crate::handoff;
use crate::http::health::HealthState;
use crate::server::ServerState;

/// Open the store, load the registry and wire every service.
pub fn start(config: &HostConfig) -> Result<ServerState> {
    start_with_handoff(config, handoff::from_config(&config.handoff)?)
}

pub fn start_with_handoff(
    config: &HostConfig,
    handoff: Arc<dyn HostHandoff>,
) -> Result<ServerState> {
    let sticker = &config.sticker;
    let store = PackStore::open(&sticker.store_dir)
        .with_context(|| format!("failed to open store {}", sticker.store_dir.display()))?;
    let registry = Arc::new(PackRegistry::load(&store).context("failed to load committed packs")?);
    let store = Arc::new(store);
    let fetchers = sticker
        .fetchers()
        .context("failed to initialise asset fetchers")?;
    if sticker.allow_local_files {
        tracing::warn!("local file sources enabled; descriptions may read server paths");
    }

    let builder = PackBuilder::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        Arc::new(fetchers),
        Arc::new(RasterCodec::new()),
        sticker.build_settings(),
    );
    let authority = config.http.authority.clone();
    let query = QueryService::new(registry, store, authority.clone());
    let share = ShareService::new(builder.clone(), handoff, authority);

    tracing::info!(
        config = ?config.config_path,
        store = %sticker.store_dir.display(),
        authority = %config.http.authority,
        packs = builder.registry().len(),
        "sticker host ready"
    );
    Ok(ServerState {
        builder,
        query,
        share,
        health: Arc::new(HealthState::new()),
    })
}
