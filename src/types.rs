//! Shared types passed between pipeline stages.
//!
//! A [`RawImageInput`] enters the [`validate`](crate::validate) stage, the
//! [`compress`](crate::compress) stage turns it into a [`CompressedImage`], and
//! [`upload`](crate::upload) sends that payload to storage. [`CompressionOptions`]
//! is the per-call configuration value object; the `[compression]` table of
//! `config.toml` deserializes straight into it.

use crate::imaging::{OutputFormat, Quality};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Media types the pipeline accepts as input.
pub const SUPPORTED_MEDIA_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

/// File extensions (lowercase, no dot) of accepted inputs.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Declared media type for a file extension, as a browser would report it.
///
/// Unknown extensions map to `application/octet-stream`, which the validator
/// then rejects as "not an image".
pub fn media_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// An unprocessed image as selected by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImageInput {
    pub bytes: Bytes,
    /// Declared media type (e.g. `image/jpeg`). Not sniffed from content.
    pub media_type: String,
    /// Display name, usually the original filename.
    pub name: String,
}

impl RawImageInput {
    pub fn new(
        bytes: impl Into<Bytes>,
        media_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
            name: name.into(),
        }
    }

    /// Read a file, declaring its media type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(bytes, media_type_for_extension(ext), name))
    }

    /// Byte length of the payload.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Bounding box, quality and format for one compression call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: Quality,
    pub output_format: OutputFormat,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: Quality::default(),
            output_format: OutputFormat::Webp,
        }
    }
}

/// Output of the compression stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedImage {
    pub bytes: Bytes,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
    /// Byte length of the input this was produced from.
    pub source_len: usize,
}

impl CompressedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Size saved relative to the source, in percent. Negative when the
    /// re-encode grew the file.
    pub fn reduction_percent(&self) -> f64 {
        if self.source_len == 0 {
            return 0.0;
        }
        (1.0 - self.len() as f64 / self.source_len as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressed(len: usize, source_len: usize) -> CompressedImage {
        CompressedImage {
            bytes: Bytes::from(vec![0u8; len]),
            format: OutputFormat::Webp,
            width: 10,
            height: 10,
            source_width: 20,
            source_height: 20,
            source_len,
        }
    }

    #[test]
    fn media_type_table() {
        assert_eq!(media_type_for_extension("JPG"), "image/jpeg");
        assert_eq!(media_type_for_extension("jpeg"), "image/jpeg");
        assert_eq!(media_type_for_extension("webp"), "image/webp");
        assert_eq!(media_type_for_extension("tiff"), "image/tiff");
        assert_eq!(media_type_for_extension("pdf"), "application/octet-stream");
    }

    #[test]
    fn every_supported_extension_has_supported_media_type() {
        for ext in SUPPORTED_EXTENSIONS {
            assert!(SUPPORTED_MEDIA_TYPES.contains(&media_type_for_extension(ext)));
        }
    }

    #[test]
    fn from_path_reads_bytes_and_declares_type() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("Sofa Front.PNG");
        std::fs::write(&path, b"pixels").unwrap();

        let input = RawImageInput::from_path(&path).unwrap();
        assert_eq!(input.name, "Sofa Front.PNG");
        assert_eq!(input.media_type, "image/png");
        assert_eq!(input.len(), 6);
    }

    #[test]
    fn from_path_missing_file_is_io_error() {
        assert!(RawImageInput::from_path(Path::new("/nonexistent/x.jpg")).is_err());
    }

    #[test]
    fn compression_options_defaults() {
        let opts = CompressionOptions::default();
        assert_eq!((opts.max_width, opts.max_height), (1200, 1200));
        assert_eq!(opts.quality.value(), 0.8);
        assert_eq!(opts.output_format, OutputFormat::Webp);
    }

    #[test]
    fn compression_options_partial_toml() {
        let opts: CompressionOptions =
            toml::from_str("max_width = 800\noutput_format = \"png\"").unwrap();
        assert_eq!(opts.max_width, 800);
        assert_eq!(opts.max_height, 1200);
        assert_eq!(opts.output_format, OutputFormat::Png);
    }

    #[test]
    fn compression_options_reject_unknown_keys() {
        let result: Result<CompressionOptions, _> = toml::from_str("max_widht = 800");
        assert!(result.is_err());
    }

    #[test]
    fn reduction_percent() {
        assert_eq!(compressed(250, 1000).reduction_percent(), 75.0);
        assert_eq!(compressed(10, 0).reduction_percent(), 0.0);
        assert!(compressed(2000, 1000).reduction_percent() < 0.0);
    }
}
