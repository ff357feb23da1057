//! Pure Rust codec backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `ImageDecoder::dimensions` + EXIF orientation (header only) |
//! | Decode (JPEG, PNG, WebP, GIF) | `DynamicImage::from_decoder` |
//! | Orient | `DynamicImage::apply_orientation` |
//! | Resample | `DynamicImage::resize_exact` with `Lanczos3` filter |
//!
//! Camera output often stores pixels sideways plus an EXIF orientation tag.
//! Both operations work in display orientation: `identify` reports the
//! upright size and `encode` rotates before resampling, so the encoded
//! payload carries no orientation tag and displays upright everywhere.
//! | Encode → WebP (lossy) | `webp::Encoder` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless, quality ignored) |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{EncodeParams, OutputFormat};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageReader};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_err(e: image::ImageError) -> BackendError {
    BackendError::Decode(e.to_string())
}

/// Open a decoder over `source`, sniffing the container from its magic bytes.
fn open_decoder(source: &[u8]) -> Result<impl ImageDecoder + '_, BackendError> {
    ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| BackendError::Decode(e.to_string()))?
        .into_decoder()
        .map_err(decode_err)
}

/// EXIF orientation of the stream. Unreadable metadata counts as upright.
fn read_orientation(decoder: &mut impl ImageDecoder) -> Orientation {
    decoder.orientation().unwrap_or(Orientation::NoTransforms)
}

/// Whether `orientation` swaps width and height.
fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

/// Decode `source` and rotate it into display orientation.
fn load_image(source: &[u8]) -> Result<DynamicImage, BackendError> {
    let mut decoder = open_decoder(source)?;
    let orientation = read_orientation(&mut decoder);
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Encode as lossy WebP. The encoder takes quality on a 0–100 float scale.
fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, BackendError> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
    let data = encoder.encode(quality * 100.0);
    if data.is_empty() {
        return Err(BackendError::Encoding("WebP encoder returned no data".into()));
    }
    Ok(data.to_vec())
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut out), quality)
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| BackendError::Encoding(format!("JPEG encode failed: {e}")))?;
    Ok(out)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(Cursor::new(&mut out))
        .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
        .map_err(|e| BackendError::Encoding(format!("PNG encode failed: {e}")))?;
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
        let mut decoder = open_decoder(source)?;
        let orientation = read_orientation(&mut decoder);
        let (width, height) = decoder.dimensions();
        if swaps_axes(orientation) {
            Ok(Dimensions {
                width: height,
                height: width,
            })
        } else {
            Ok(Dimensions { width, height })
        }
    }

    fn encode(&self, source: &[u8], params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
        if params.width == 0 || params.height == 0 {
            return Err(BackendError::Encoding(format!(
                "cannot encode a {}x{} surface",
                params.width, params.height
            )));
        }

        let img = load_image(source)?;
        let resized = if img.width() == params.width && img.height() == params.height {
            img
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };

        match params.format {
            OutputFormat::Webp => encode_webp(&resized, params.quality.value()),
            OutputFormat::Jpeg => encode_jpeg(&resized, params.quality.percent()),
            OutputFormat::Png => encode_png(&resized),
        }
    }
}
