//! Build a pack and hand it to the host application.
//!
//! The host answers asynchronously with acceptance or rejection. Each identifier has at
//! most one share in flight; concurrent callers receive the same outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::builder::{BuildOutcome, PackBuilder};
use crate::error::ShareError;
use crate::inflight::InFlight;
use crate::model::{PackDescription, StickerPack};

/// What the host needs to locate a committed pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub sticker_pack_id: String,
    pub sticker_pack_authority: String,
    pub sticker_pack_name: String,
}

/// The host's answer to one handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffReply {
    Accepted,
    Rejected { validation_error: Option<String> },
    /// No host application is reachable.
    Unavailable,
}

#[async_trait]
pub trait HostHandoff: Send + Sync {
    async fn hand_off(&self, request: &HandoffRequest) -> Result<HandoffReply, ShareError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareOutcome {
    Accepted,
    HostUnavailable,
}

#[derive(Debug, Clone)]
pub struct ShareReceipt {
    pub pack: Arc<StickerPack>,
    pub outcome: ShareOutcome,
    /// Whether the pack was built by this share rather than found committed.
    pub committed: bool,
}

#[derive(Clone)]
pub struct ShareService {
    builder: PackBuilder,
    handoff: Arc<dyn HostHandoff>,
    authority: String,
    in_flight: Arc<InFlight<ShareReceipt, ShareError>>,
}

impl ShareService {
    pub fn new(builder: PackBuilder, handoff: Arc<dyn HostHandoff>, authority: impl Into<String>) -> Self {
        Self {
            builder,
            handoff,
            authority: authority.into(),
            in_flight: Arc::new(InFlight::new()),
        }
    }

    pub fn builder(&self) -> &PackBuilder {
        &self.builder
    }

    pub async fn share(&self, description: PackDescription) -> Result<ShareReceipt, ShareError> {
        let identifier = description.identifier.clone();
        let builder = self.builder.clone();
        let handoff = Arc::clone(&self.handoff);
        let authority = self.authority.clone();
        let pending = self.in_flight.run(&identifier, move || async move {
            let BuildOutcome { pack, committed } = builder.build_outcome(description).await?;
            let request = HandoffRequest {
                sticker_pack_id: pack.identifier.clone(),
                sticker_pack_authority: authority,
                sticker_pack_name: pack.name.clone(),
            };
            let reply = handoff.hand_off(&request).await?;
            tracing::info!(identifier = %pack.identifier, reply = ?reply, "host handoff finished");
            match reply {
                HandoffReply::Accepted => Ok(ShareReceipt {
                    pack,
                    outcome: ShareOutcome::Accepted,
                    committed,
                }),
                HandoffReply::Unavailable => Ok(ShareReceipt {
                    pack,
                    outcome: ShareOutcome::HostUnavailable,
                    committed,
                }),
                HandoffReply::Rejected { validation_error } => {
                    Err(ShareError::HostRejected(validation_error))
                }
            }
        });
        if pending.joined {
            tracing::info!(identifier = %identifier, "joining in-flight share");
        }
        pending.outcome.await
    }
}
