use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_yaml_bw as serde_yaml;
use sticker_core::StickerConfig;

pub const DEFAULT_AUTHORITY: &str = "local.stickercontentprovider";

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub config_path: Option<PathBuf>,
    pub sticker: StickerConfig,
    pub http: HttpConfig,
    pub handoff: HandoffConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    store: StoreSection,
    #[serde(default)]
    fetch: FetchSection,
    #[serde(default)]
    http: HttpConfig,
    #[serde(default)]
    handoff: HandoffConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoreSection {
    dir: Option<PathBuf>,
    image_data_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FetchSection {
    timeout_ms: Option<u64>,
    concurrency: Option<usize>,
    attempts: Option<u32>,
    allow_local_files: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Authority the host app uses to reach the provider surface.
    #[serde(default = "default_authority")]
    pub authority: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandoffConfig {
    #[default]
    Disabled,
    Webhook {
        url: String,
        #[serde(default = "default_handoff_timeout_ms")]
        timeout_ms: u64,
    },
}

impl HostConfig {
    /// Configuration from `path` when given, otherwise from the STICKER_* environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self {
                config_path: None,
                sticker: StickerConfig::from_env()?,
                http: HttpConfig::default(),
                handoff: HandoffConfig::default(),
            }),
        }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {:?}", path))?;

        let mut sticker = StickerConfig::default();
        if let Some(dir) = file.store.dir {
            sticker.store_dir = match path.parent() {
                Some(base) if dir.is_relative() => base.join(dir),
                _ => dir,
            };
        }
        if let Some(version) = file.store.image_data_version {
            sticker.image_data_version = version;
        }
        if let Some(timeout_ms) = file.fetch.timeout_ms {
            if timeout_ms == 0 {
                bail!("fetch.timeout_ms must be greater than zero");
            }
            sticker.fetch_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(concurrency) = file.fetch.concurrency {
            if concurrency == 0 {
                bail!("fetch.concurrency must be at least 1");
            }
            sticker.fetch_concurrency = concurrency;
        }
        if let Some(attempts) = file.fetch.attempts {
            sticker.fetch_attempts = attempts.max(1);
        }
        if let Some(allow) = file.fetch.allow_local_files {
            sticker.allow_local_files = allow;
        }
        if let HandoffConfig::Webhook { url, .. } = &file.handoff {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("handoff.url must be an http(s) URL, got `{url}`");
            }
        }

        Ok(Self {
            config_path: Some(path.to_path_buf()),
            sticker,
            http: file.http,
            handoff: file.handoff,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.bind, self.http.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            authority: default_authority(),
        }
    }
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_handoff_timeout_ms() -> u64 {
    10_000
}
