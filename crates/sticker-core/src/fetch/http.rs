use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Client;

use super::AssetFetcher;
use crate::error::FetchError;

pub struct HttpFetcher {
    scheme: &'static str,
    client: Client,
    timeout: Duration,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(scheme: &'static str, timeout: Duration, max_bytes: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Transport {
                locator: format!("{scheme}://"),
                reason: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self {
            scheme,
            client,
            timeout,
            max_bytes,
        })
    }

    fn too_large(&self, locator: &str) -> FetchError {
        FetchError::TooLarge {
            locator: locator.to_string(),
            limit: self.max_bytes,
        }
    }

    fn map_error(&self, locator: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            return FetchError::Timeout {
                locator: locator.to_string(),
                after_ms: self.timeout.as_millis() as u64,
            };
        }
        FetchError::Transport {
            locator: locator.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    fn scheme(&self) -> &'static str {
        self.scheme
    }

    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        let mut response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|err| self.map_error(locator, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                locator: locator.to_string(),
                status: status.as_u16(),
            });
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(self.too_large(locator));
        }
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| self.map_error(locator, err))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large(locator));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}
