//! Image classification and role constraints.
//!
//! Everything here is synchronous and free of I/O. Decoding goes through the
//! [`ImageCodec`] trait so the rules can be exercised without real pixel data;
//! [`RasterCodec`] is the production implementation.

use bytes::Bytes;

use crate::error::{CodecError, ValidationError};
use crate::model::{AssetRole, Dimensions};

mod raster;

pub use raster::RasterCodec;

pub const TRAY_DIMENSIONS: Dimensions = Dimensions::square(96);
pub const STICKER_DIMENSIONS: Dimensions = Dimensions::square(512);
pub const MAX_TRAY_BYTES: u64 = 50 * 1024;
pub const MAX_STICKER_BYTES: u64 = 100 * 1024;

const SIGNATURE_WINDOW: usize = 12;
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Png,
    Webp,
    Jpeg,
}

impl ImageKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Size and format rules for one asset role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleConstraints {
    pub dimensions: Dimensions,
    pub max_bytes: u64,
    /// Format assets of this role are stored and served in.
    pub storage_kind: ImageKind,
    accepted: &'static [ImageKind],
}

impl RoleConstraints {
    pub fn for_role(role: AssetRole) -> Self {
        match role {
            AssetRole::Tray => Self {
                dimensions: TRAY_DIMENSIONS,
                max_bytes: MAX_TRAY_BYTES,
                storage_kind: ImageKind::Png,
                accepted: &[ImageKind::Png, ImageKind::Webp],
            },
            AssetRole::Sticker => Self {
                dimensions: STICKER_DIMENSIONS,
                max_bytes: MAX_STICKER_BYTES,
                storage_kind: ImageKind::Webp,
                accepted: &[ImageKind::Webp, ImageKind::Png, ImageKind::Jpeg],
            },
        }
    }

    pub fn accepts(&self, kind: ImageKind) -> bool {
        self.accepted.contains(&kind)
    }
}

/// What a codec reads from the image headers, before any pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub dimensions: Dimensions,
    pub animated: bool,
}

/// Fully decoded still image as RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub dimensions: Dimensions,
    pub rgba: Vec<u8>,
}

/// Opaque pixel codec.
///
/// `probe` must not allocate pixel buffers; `decode` is only called once the header
/// has passed the dimension check for the asset's role.
pub trait ImageCodec: Send + Sync {
    fn probe(&self, kind: ImageKind, bytes: &[u8]) -> Result<ImageHeader, CodecError>;
    fn decode(&self, kind: ImageKind, bytes: &[u8]) -> Result<DecodedImage, CodecError>;
    fn encode(&self, image: &DecodedImage, target: ImageKind) -> Result<Vec<u8>, CodecError>;
}

/// An image that passed every rule for its role.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub role: AssetRole,
    pub kind: ImageKind,
    pub decoded: DecodedImage,
    pub bytes: Bytes,
}

/// Classify by leading signature only.
pub fn classify(bytes: &[u8]) -> Result<ImageKind, ValidationError> {
    let window = &bytes[..bytes.len().min(SIGNATURE_WINDOW)];
    if window.starts_with(&PNG_SIGNATURE) {
        return Ok(ImageKind::Png);
    }
    if window.len() == SIGNATURE_WINDOW && &window[..4] == b"RIFF" && &window[8..12] == b"WEBP" {
        return Ok(ImageKind::Webp);
    }
    if window.starts_with(&JPEG_SIGNATURE) {
        return Ok(ImageKind::Jpeg);
    }
    Err(ValidationError::UnsupportedImageFormat)
}

/// Check `bytes` against the rules for `role`.
///
/// Order matters: format, header decode, animation, byte ceiling, then exact
/// dimensions. Pixel data is decoded last, once its size is known to be bounded.
pub fn validate(
    codec: &dyn ImageCodec,
    bytes: Bytes,
    role: AssetRole,
) -> Result<ValidatedImage, ValidationError> {
    let constraints = RoleConstraints::for_role(role);
    let kind = classify(&bytes)?;
    if !constraints.accepts(kind) {
        return Err(ValidationError::UnsupportedImageFormat);
    }
    let header = codec
        .probe(kind, &bytes)
        .map_err(|err| ValidationError::CorruptImage(err.reason))?;
    if header.animated {
        return Err(ValidationError::AnimatedImagesNotSupported);
    }
    let len = bytes.len() as u64;
    if len > constraints.max_bytes {
        return Err(ValidationError::ImageTooBig(len));
    }
    if header.dimensions != constraints.dimensions {
        return Err(ValidationError::IncorrectImageSize(header.dimensions));
    }
    let decoded = codec
        .decode(kind, &bytes)
        .map_err(|err| ValidationError::CorruptImage(err.reason))?;
    Ok(ValidatedImage {
        role,
        kind,
        decoded,
        bytes,
    })
}

/// Convert a validated image into the bytes stored for its role.
///
/// Images already in the storage format pass through untouched; others are re-encoded
/// and the byte ceiling is applied again to the output.
pub fn normalize(codec: &dyn ImageCodec, image: ValidatedImage) -> Result<Bytes, ValidationError> {
    let constraints = RoleConstraints::for_role(image.role);
    if image.kind == constraints.storage_kind {
        return Ok(image.bytes);
    }
    let encoded = codec
        .encode(&image.decoded, constraints.storage_kind)
        .map_err(|err| ValidationError::CorruptImage(err.reason))?;
    let len = encoded.len() as u64;
    if len > constraints.max_bytes {
        return Err(ValidationError::ImageTooBig(len));
    }
    Ok(Bytes::from(encoded))
}
