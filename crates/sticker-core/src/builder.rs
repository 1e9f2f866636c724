//! Fetch, validate and commit every asset of one pack description.
//!
//! A build is all-or-nothing. Assets are fetched concurrently (bounded by
//! [`BuildSettings::concurrency`]) and held in memory until every one has passed
//! validation; only then is the pack handed to the [`PackStore`]. The first failure
//! drops the remaining fetches and nothing reaches disk.
//!
//! Builds are de-duplicated per identifier: a second request for an identifier that is
//! still building joins the running attempt and receives the same outcome.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::error::BuildError;
use crate::fetch::FetcherRegistry;
use crate::imaging::{self, ImageCodec};
use crate::inflight::InFlight;
use crate::model::{AssetDescriptor, AssetRole, PackDescription, Sticker, StickerPack};
use crate::registry::PackRegistry;
use crate::store::{PackStore, StagedAssets};

pub const TRAY_FILENAME: &str = "tray.png";

/// Stored filename of the sticker at `index` in request order.
pub fn sticker_filename(index: usize) -> String {
    format!("sticker_{index:03}.webp")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    /// Upper bound on sticker fetches running at once for one build.
    pub concurrency: usize,
    pub image_data_version: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            image_data_version: "1".to_string(),
        }
    }
}

/// A pack returned by [`PackBuilder::build_outcome`].
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub pack: Arc<StickerPack>,
    /// `false` when the identifier was already committed and nothing was built.
    pub committed: bool,
}

#[derive(Clone)]
pub struct PackBuilder {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<PackRegistry>,
    store: Arc<PackStore>,
    fetchers: Arc<FetcherRegistry>,
    codec: Arc<dyn ImageCodec>,
    settings: BuildSettings,
    in_flight: Arc<InFlight<BuildOutcome, BuildError>>,
}

impl PackBuilder {
    pub fn new(
        registry: Arc<PackRegistry>,
        store: Arc<PackStore>,
        fetchers: Arc<FetcherRegistry>,
        codec: Arc<dyn ImageCodec>,
        settings: BuildSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                store,
                fetchers,
                codec,
                settings,
                in_flight: Arc::new(InFlight::new()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<PackRegistry> {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<PackStore> {
        &self.inner.store
    }

    pub fn is_building(&self, identifier: &str) -> bool {
        self.inner.in_flight.is_pending(identifier)
    }

    /// Build and commit the pack, or return the committed pack for its identifier.
    pub async fn build(&self, description: PackDescription) -> Result<Arc<StickerPack>, BuildError> {
        self.build_outcome(description)
            .await
            .map(|outcome| outcome.pack)
    }

    /// Like [`PackBuilder::build`], also reporting whether this call (or the in-flight
    /// build it joined) committed the pack.
    pub async fn build_outcome(
        &self,
        description: PackDescription,
    ) -> Result<BuildOutcome, BuildError> {
        description
            .check()
            .map_err(BuildError::InvalidDescription)?;

        let identifier = description.identifier.clone();
        if let Some(existing) = self.inner.registry.get(&identifier) {
            tracing::debug!(identifier = %identifier, "pack already committed");
            return Ok(BuildOutcome {
                pack: existing,
                committed: false,
            });
        }

        let inner = Arc::clone(&self.inner);
        let pending = self
            .inner
            .in_flight
            .run(&identifier, move || inner.run(description));
        if pending.joined {
            tracing::info!(identifier = %identifier, "joining in-flight build");
        }
        pending.outcome.await
    }
}

impl Inner {
    async fn run(self: Arc<Self>, description: PackDescription) -> Result<BuildOutcome, BuildError> {
        // A build that finished between the caller's lookup and this task starting.
        if let Some(existing) = self.registry.get(&description.identifier) {
            return Ok(BuildOutcome {
                pack: existing,
                committed: false,
            });
        }

        let started = Instant::now();
        tracing::info!(
            identifier = %description.identifier,
            stickers = description.stickers.len(),
            "building pack"
        );

        let result = self.assemble_and_commit(&description).await;
        match &result {
            Ok(pack) => tracing::info!(
                identifier = %pack.identifier,
                total_size = pack.total_size(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "pack committed"
            ),
            Err(err) => tracing::warn!(
                identifier = %description.identifier,
                error = %err,
                "pack build failed"
            ),
        }
        result.map(|pack| BuildOutcome {
            pack,
            committed: true,
        })
    }

    async fn assemble_and_commit(
        &self,
        description: &PackDescription,
    ) -> Result<Arc<StickerPack>, BuildError> {
        let tray = self.prepare(&description.tray_image_source, AssetRole::Tray);
        let pending: Vec<_> = description
            .stickers
            .iter()
            .map(|sticker| self.prepare(&sticker.url, AssetRole::Sticker))
            .collect();
        let stickers = stream::iter(pending)
            .buffered(self.settings.concurrency.max(1))
            .try_collect::<Vec<_>>();
        let (tray, stickers) = tokio::try_join!(tray, stickers)?;

        let mut assets = StagedAssets::new();
        let tray_descriptor = AssetDescriptor {
            filename: TRAY_FILENAME.to_string(),
            role: AssetRole::Tray,
            size: tray.len() as u64,
        };
        assets.insert(TRAY_FILENAME.to_string(), tray);

        let mut entries = Vec::with_capacity(stickers.len());
        for (index, (source, bytes)) in description.stickers.iter().zip(stickers).enumerate() {
            let filename = sticker_filename(index);
            entries.push(Sticker {
                image_file_name: filename.clone(),
                emojis: source.emojis.clone(),
                size: bytes.len() as u64,
            });
            assets.insert(filename, bytes);
        }

        let pack = StickerPack::new(
            description.info(&self.settings.image_data_version),
            tray_descriptor,
            entries,
        );
        let store = Arc::clone(&self.store);
        let pack = tokio::task::spawn_blocking(move || {
            store.commit(&pack, &assets).map(|_| pack)
        })
        .await??;
        Ok(self.registry.insert(pack))
    }

    /// Fetch one asset and turn it into the bytes stored for its role.
    async fn prepare(&self, locator: &str, role: AssetRole) -> Result<Bytes, BuildError> {
        let raw = self.fetchers.fetch(locator).await?;
        let codec = Arc::clone(&self.codec);
        let outcome = tokio::task::spawn_blocking(move || {
            let image = imaging::validate(codec.as_ref(), raw, role)?;
            imaging::normalize(codec.as_ref(), image)
        })
        .await?;
        outcome.map_err(|source| {
            tracing::warn!(locator, role = %role, error = %source, "image rejected");
            BuildError::Validation {
                role,
                locator: locator.to_string(),
                source,
            }
        })
    }
}
