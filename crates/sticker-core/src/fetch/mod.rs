use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::{Rng, rng};

use crate::error::FetchError;
use crate::imaging::MAX_STICKER_BYTES;

mod fs;
mod http;

pub use fs::FsFetcher;
pub use http::HttpFetcher;

/// Retrieves raw bytes for one locator. Implementations perform no validation.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    fn scheme(&self) -> &'static str;
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError>;
}

/// Timeout, retry and size settings applied to every fetch, whatever the scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff_base_ms: u64,
    /// Largest body accepted from any source; nothing past it is read.
    pub max_bytes: u64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            attempts: 3,
            backoff_base_ms: 200,
            max_bytes: MAX_STICKER_BYTES,
        }
    }
}

/// Scheme-keyed set of fetchers.
pub struct FetcherRegistry {
    fetchers: HashMap<String, Arc<dyn AssetFetcher>>,
    policy: FetchPolicy,
}

impl FetcherRegistry {
    pub fn new(policy: FetchPolicy) -> Self {
        Self {
            fetchers: HashMap::new(),
            policy,
        }
    }

    /// Registry with the remote `http` and `https` fetchers only.
    pub fn with_builtin(policy: FetchPolicy) -> Result<Self, FetchError> {
        let mut registry = Self::new(policy);
        registry.register(HttpFetcher::new("http", policy.timeout, policy.max_bytes)?);
        registry.register(HttpFetcher::new("https", policy.timeout, policy.max_bytes)?);
        Ok(registry)
    }

    /// Add the `fs` and `file` fetchers, which read any path the process can open.
    pub fn with_local_files(mut self) -> Self {
        let max_bytes = self.policy.max_bytes;
        self.register(FsFetcher::new("fs", max_bytes));
        self.register(FsFetcher::new("file", max_bytes));
        self
    }

    pub fn register(&mut self, fetcher: impl AssetFetcher + 'static) {
        self.fetchers
            .insert(fetcher.scheme().to_string(), Arc::new(fetcher));
    }

    pub async fn fetch(&self, reference: &str) -> Result<Bytes, FetchError> {
        let parsed = ParsedReference::parse(reference)?;
        let fetcher = self
            .fetchers
            .get(&parsed.scheme)
            .ok_or_else(|| FetchError::UnsupportedScheme(parsed.scheme.clone()))?;

        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(
                self.policy.timeout,
                fetcher.fetch(&parsed.locator),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    locator: reference.to_string(),
                    after_ms: self.policy.timeout.as_millis() as u64,
                }),
            };
            match result {
                Ok(bytes) if bytes.len() as u64 > self.policy.max_bytes => {
                    return Err(FetchError::TooLarge {
                        locator: reference.to_string(),
                        limit: self.policy.max_bytes,
                    });
                }
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = backoff_delay_ms(self.policy.backoff_base_ms, attempt - 1);
                    tracing::warn!(
                        locator = reference,
                        attempt,
                        delay_ms = delay,
                        error = %err,
                        "asset fetch failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

pub fn backoff_delay_ms(base: u64, attempt: u32) -> u64 {
    let multiplier = 1_u64 << attempt.min(10);
    let exp = base.saturating_mul(multiplier);
    let mut rng = rng();
    let jitter = rng.random_range(0..=exp.min(1000));
    exp + jitter
}

struct ParsedReference {
    scheme: String,
    locator: String,
}

impl ParsedReference {
    fn parse(input: &str) -> Result<Self, FetchError> {
        let (scheme_part, rest) = input
            .split_once("://")
            .ok_or_else(|| FetchError::InvalidLocator(input.to_string()))?;
        if rest.is_empty() || scheme_part.is_empty() {
            return Err(FetchError::InvalidLocator(input.to_string()));
        }
        if let Some((logical, actual)) = scheme_part.split_once('+') {
            return Ok(Self {
                scheme: logical.to_ascii_lowercase(),
                locator: format!("{actual}://{rest}"),
            });
        }
        Ok(Self {
            scheme: scheme_part.to_ascii_lowercase(),
            locator: input.to_string(),
        })
    }
}
