use thiserror::Error;
use tokio::task::JoinError;

use crate::model::{AssetRole, Dimensions};

/// Reasons an image is refused for a tray or sticker slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported image format")]
    UnsupportedImageFormat,

    #[error("image could not be decoded: {0}")]
    CorruptImage(String),

    #[error("animated images are not supported")]
    AnimatedImagesNotSupported,

    #[error("image is too big ({0} bytes)")]
    ImageTooBig(u64),

    #[error("incorrect image size {0}")]
    IncorrectImageSize(Dimensions),
}

/// Failure raised by an [`crate::imaging::ImageCodec`] implementation.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct CodecError {
    pub reason: String,
}

impl CodecError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Network-side failures while retrieving an asset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("locator `{0}` is not a valid URI")]
    InvalidLocator(String),

    #[error("no fetcher registered for scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("request to {locator} failed: {reason}")]
    Transport { locator: String, reason: String },

    #[error("request to {locator} returned status {status}")]
    Status { locator: String, status: u16 },

    #[error("request to {locator} timed out after {after_ms}ms")]
    Timeout { locator: String, after_ms: u64 },

    #[error("{locator} does not exist")]
    Missing { locator: String },

    #[error("{locator} is larger than {limit} bytes")]
    TooLarge { locator: String, limit: u64 },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("{action} {path}: {reason}")]
    Io {
        action: &'static str,
        path: String,
        reason: String,
    },

    #[error("pack `{0}` is already committed")]
    AlreadyCommitted(String),

    #[error("corrupt pack at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("metadata serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    pub(crate) fn io(action: &'static str, path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Outcome of a failed build. `Clone` so one result can be handed to every joined caller.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("invalid pack description: {0}")]
    InvalidDescription(String),

    #[error("{role} image {locator} rejected: {source}")]
    Validation {
        role: AssetRole,
        locator: String,
        #[source]
        source: ValidationError,
    },

    #[error(transparent)]
    Network(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("build task aborted: {0}")]
    Aborted(String),
}

impl From<JoinError> for BuildError {
    fn from(err: JoinError) -> Self {
        Self::Aborted(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("not found")]
    NotFound,

    #[error("unknown path `{0}`")]
    UnknownRoute(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum ShareError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("host rejected the pack{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    HostRejected(Option<String>),

    #[error("handoff failed: {0}")]
    Handoff(String),

    #[error("share task aborted: {0}")]
    Aborted(String),
}

impl From<JoinError> for ShareError {
    fn from(err: JoinError) -> Self {
        Self::Aborted(err.to_string())
    }
}
