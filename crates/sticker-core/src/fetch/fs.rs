use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use super::AssetFetcher;
use crate::error::FetchError;

/// Reads assets from the local filesystem (`fs://` and `file://`).
#[derive(Debug)]
pub struct FsFetcher {
    scheme: &'static str,
    max_bytes: u64,
}

impl FsFetcher {
    pub fn new(scheme: &'static str, max_bytes: u64) -> Self {
        Self { scheme, max_bytes }
    }

    fn parse_path(&self, locator: &str) -> Result<PathBuf, FetchError> {
        let invalid = || FetchError::InvalidLocator(locator.to_string());
        if let Some(stripped) = locator.strip_prefix("fs://") {
            if stripped.starts_with('/')
                || stripped.starts_with("./")
                || stripped.starts_with("../")
            {
                return Ok(PathBuf::from(stripped));
            }
            if cfg!(windows) && stripped.chars().nth(1) == Some(':') {
                return Ok(PathBuf::from(stripped));
            }
            let url = Url::parse(&format!("file://{stripped}")).map_err(|_| invalid())?;
            return url.to_file_path().map_err(|_| invalid());
        }
        let url = Url::parse(locator).map_err(|_| invalid())?;
        url.to_file_path().map_err(|_| invalid())
    }
}

#[async_trait]
impl AssetFetcher for FsFetcher {
    fn scheme(&self) -> &'static str {
        self.scheme
    }

    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        let path = self.parse_path(locator)?;
        let io_error = |err: std::io::Error| match err.kind() {
            ErrorKind::NotFound => FetchError::Missing {
                locator: locator.to_string(),
            },
            _ => FetchError::Transport {
                locator: locator.to_string(),
                reason: err.to_string(),
            },
        };
        let metadata = tokio::fs::metadata(&path).await.map_err(io_error)?;
        if metadata.len() > self.max_bytes {
            return Err(FetchError::TooLarge {
                locator: locator.to_string(),
                limit: self.max_bytes,
            });
        }
        let bytes = tokio::fs::read(&path).await.map_err(io_error)?;
        Ok(Bytes::from(bytes))
    }
}
