use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sticker_core::{HandoffReply, HandoffRequest, HostHandoff, ShareError};

use crate::config::HandoffConfig;

pub fn from_config(config: &HandoffConfig) -> Result<Arc<dyn HostHandoff>> {
    match config {
        HandoffConfig::Disabled => Ok(Arc::new(DisabledHandoff)),
        HandoffConfig::Webhook { url, timeout_ms } => Ok(Arc::new(WebhookHandoff::new(
            url.clone(),
            Duration::from_millis(*timeout_ms),
        )?)),
    }
}

/// No host application is attached; every share ends as `HostUnavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledHandoff;

#[async_trait]
impl HostHandoff for DisabledHandoff {
    async fn hand_off(&self, request: &HandoffRequest) -> Result<HandoffReply, ShareError> {
        tracing::debug!(identifier = %request.sticker_pack_id, "handoff disabled");
        Ok(HandoffReply::Unavailable)
    }
}

/// Posts the handoff request as JSON and reads the host's verdict from the response.
#[derive(Debug, Clone)]
pub struct WebhookHandoff {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct WebhookVerdict {
    accepted: bool,
    #[serde(default)]
    validation_error: Option<String>,
}

impl WebhookHandoff {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build handoff client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl HostHandoff for WebhookHandoff {
    async fn hand_off(&self, request: &HandoffRequest) -> Result<HandoffReply, ShareError> {
        let response = match self.client.post(&self.url).json(request).send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() => {
                tracing::warn!(url = %self.url, error = %err, "host application unreachable");
                return Ok(HandoffReply::Unavailable);
            }
            Err(err) => return Err(ShareError::Handoff(err.to_string())),
        };
        let status = response.status();
        if !status.is_success() {
            return Err(ShareError::Handoff(format!(
                "host webhook returned status {status}"
            )));
        }
        let verdict: WebhookVerdict = response
            .json()
            .await
            .map_err(|err| ShareError::Handoff(format!("invalid host verdict: {err}")))?;
        if verdict.accepted {
            Ok(HandoffReply::Accepted)
        } else {
            Ok(HandoffReply::Rejected {
                validation_error: verdict.validation_error,
            })
        }
    }
}
