use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::builder::BuildSettings;
use crate::error::FetchError;
use crate::fetch::{FetchPolicy, FetcherRegistry};

pub const DEFAULT_STORE_DIR: &str = ".stickers";

/// Environment-driven configuration for the build pipeline and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerConfig {
    pub store_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub fetch_concurrency: usize,
    pub fetch_attempts: u32,
    pub image_data_version: String,
    /// Register the `fs`/`file` fetchers so descriptions may name server-local paths.
    pub allow_local_files: bool,
}

impl Default for StickerConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            fetch_timeout: Duration::from_millis(30_000),
            fetch_concurrency: 8,
            fetch_attempts: 3,
            image_data_version: "1".to_string(),
            allow_local_files: false,
        }
    }
}

impl StickerConfig {
    /// Build a [`StickerConfig`] by reading the documented STICKER_* variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`StickerConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let store_dir = lookup("STICKER_STORE_DIR")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.store_dir);

        let fetch_timeout = parse_var::<u64>(&lookup, "STICKER_FETCH_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.fetch_timeout);
        if fetch_timeout.is_zero() {
            bail!("STICKER_FETCH_TIMEOUT_MS must be greater than zero");
        }

        let fetch_concurrency = parse_var::<usize>(&lookup, "STICKER_FETCH_CONCURRENCY")?
            .unwrap_or(defaults.fetch_concurrency);
        if fetch_concurrency == 0 {
            bail!("STICKER_FETCH_CONCURRENCY must be at least 1");
        }

        let fetch_attempts = parse_var::<u32>(&lookup, "STICKER_FETCH_ATTEMPTS")?
            .unwrap_or(defaults.fetch_attempts)
            .max(1);

        let image_data_version =
            lookup("STICKER_IMAGE_DATA_VERSION").unwrap_or(defaults.image_data_version);

        let allow_local_files = parse_var::<bool>(&lookup, "STICKER_ALLOW_LOCAL_FILES")?
            .unwrap_or(defaults.allow_local_files);

        Ok(Self {
            store_dir,
            fetch_timeout,
            fetch_concurrency,
            fetch_attempts,
            image_data_version,
            allow_local_files,
        })
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: self.fetch_timeout,
            attempts: self.fetch_attempts,
            ..FetchPolicy::default()
        }
    }

    /// Remote fetchers, plus the local-file ones when `allow_local_files` is set.
    pub fn fetchers(&self) -> Result<FetcherRegistry, FetchError> {
        let registry = FetcherRegistry::with_builtin(self.fetch_policy())?;
        Ok(if self.allow_local_files {
            registry.with_local_files()
        } else {
            registry
        })
    }

    pub fn build_settings(&self) -> BuildSettings {
        BuildSettings {
            concurrency: self.fetch_concurrency,
            image_data_version: self.image_data_version.clone(),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value `{raw}`"))
        })
        .transpose()
}
