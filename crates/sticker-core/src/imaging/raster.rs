use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{DynamicImage, ImageDecoder, ImageError, ImageFormat, Limits, RgbaImage};

use super::{DecodedImage, ImageCodec, ImageHeader, ImageKind, STICKER_DIMENSIONS};
use crate::error::CodecError;
use crate::model::Dimensions;

/// [`ImageCodec`] backed by the pure-Rust `image` decoders.
///
/// Pixel decoding is capped at the largest role's dimensions, so a small file that
/// declares a huge canvas fails before any buffer is allocated.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterCodec;

impl RasterCodec {
    pub fn new() -> Self {
        Self
    }
}

fn decode_limits() -> Limits {
    let Dimensions { width, height } = STICKER_DIMENSIONS;
    let mut limits = Limits::default();
    limits.max_image_width = Some(width);
    limits.max_image_height = Some(height);
    limits.max_alloc = Some(u64::from(width) * u64::from(height) * 4 * 2);
    limits
}

impl ImageCodec for RasterCodec {
    fn probe(&self, kind: ImageKind, bytes: &[u8]) -> Result<ImageHeader, CodecError> {
        let cursor = Cursor::new(bytes);
        let (dimensions, animated) = match kind {
            ImageKind::Png => {
                let mut decoder = PngDecoder::new(cursor).map_err(codec_error)?;
                let animated = decoder.is_apng().map_err(codec_error)?;
                (decoder.dimensions(), animated)
            }
            ImageKind::Webp => {
                let decoder = WebPDecoder::new(cursor).map_err(codec_error)?;
                (decoder.dimensions(), decoder.has_animation())
            }
            ImageKind::Jpeg => {
                let decoder = JpegDecoder::new(cursor).map_err(codec_error)?;
                (decoder.dimensions(), false)
            }
        };
        let (width, height) = dimensions;
        Ok(ImageHeader {
            dimensions: Dimensions { width, height },
            animated,
        })
    }

    fn decode(&self, kind: ImageKind, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        let cursor = Cursor::new(bytes);
        let image = match kind {
            ImageKind::Png => limited(PngDecoder::new(cursor).map_err(codec_error)?)?,
            ImageKind::Webp => limited(WebPDecoder::new(cursor).map_err(codec_error)?)?,
            ImageKind::Jpeg => limited(JpegDecoder::new(cursor).map_err(codec_error)?)?,
        };
        let rgba = image.to_rgba8();
        Ok(DecodedImage {
            dimensions: Dimensions {
                width: rgba.width(),
                height: rgba.height(),
            },
            rgba: rgba.into_raw(),
        })
    }

    fn encode(&self, image: &DecodedImage, target: ImageKind) -> Result<Vec<u8>, CodecError> {
        let Dimensions { width, height } = image.dimensions;
        let buffer = RgbaImage::from_raw(width, height, image.rgba.clone())
            .ok_or_else(|| CodecError::new("pixel buffer does not match image dimensions"))?;
        let (dynamic, format) = match target {
            ImageKind::Png => (DynamicImage::ImageRgba8(buffer), ImageFormat::Png),
            ImageKind::Webp => (DynamicImage::ImageRgba8(buffer), ImageFormat::WebP),
            // jpeg has no alpha channel
            ImageKind::Jpeg => (
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(buffer).to_rgb8()),
                ImageFormat::Jpeg,
            ),
        };
        let mut out = Cursor::new(Vec::new());
        dynamic.write_to(&mut out, format).map_err(codec_error)?;
        Ok(out.into_inner())
    }
}

fn limited(mut decoder: impl ImageDecoder) -> Result<DynamicImage, CodecError> {
    decoder.set_limits(decode_limits()).map_err(codec_error)?;
    DynamicImage::from_decoder(decoder).map_err(codec_error)
}

fn codec_error(err: ImageError) -> CodecError {
    CodecError::new(err.to_string())
}
