//! Sticker pack build pipeline and read-only pack queries.
//!
//! A [`PackDescription`] references remote images. [`PackBuilder`] fetches them through
//! the [`FetcherRegistry`], validates each one against its role in [`imaging`], commits the
//! pack atomically to a [`PackStore`] and publishes it in the [`PackRegistry`].
//! [`QueryService`] answers metadata, sticker and asset lookups over committed packs.

#![forbid(unsafe_code)]

pub mod builder;
pub mod codec;
pub mod env;
pub mod error;
pub mod fetch;
pub mod imaging;
pub mod inflight;
pub mod model;
pub mod query;
pub mod registry;
pub mod share;
pub mod store;

pub use builder::{BuildOutcome, BuildSettings, PackBuilder};
pub use env::StickerConfig;
pub use error::{
    BuildError, CodecError, FetchError, QueryError, ShareError, StorageError, ValidationError,
};
pub use fetch::{AssetFetcher, FetchPolicy, FetcherRegistry};
pub use imaging::{DecodedImage, ImageCodec, ImageHeader, ImageKind, RasterCodec};
pub use model::{
    AssetDescriptor, AssetRole, Dimensions, PackDescription, Sticker, StickerPack, StickerSource,
};
pub use query::{MetadataRow, QueryBody, QueryResponse, QueryService, StickerRow};
pub use registry::PackRegistry;
pub use share::{HandoffReply, HandoffRequest, HostHandoff, ShareOutcome, ShareReceipt, ShareService};
pub use store::PackStore;
