//! Parameter types for image operations.
//!
//! These structs describe *what* to encode, not *how*. They are the interface
//! between [`operations`](super::operations) (which decides the target size)
//! and the [`backend`](super::backend) (which does the pixel work), so a mock
//! backend can stand in during tests without changing the planning logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality as a fraction in `(0, 1]`. Clamped on construction.
//! - [`OutputFormat`]: Target encoding (`webp`, `jpeg`, `png`).
//! - [`EncodeParams`]: Target dimensions, format and quality for one re-encode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest quality we hand to an encoder. Zero would mean "no data".
const MIN_QUALITY: f32 = 0.01;

/// Quality setting for lossy image encoding, as a fraction in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(f32);

impl Quality {
    /// Clamp `value` into `(0, 1]`. Non-finite input falls back to the default.
    pub fn new(value: f32) -> Self {
        if !value.is_finite() {
            return Self::default();
        }
        Self(value.clamp(MIN_QUALITY, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Quality on the 1–100 scale most encoders expect.
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(0.8)
    }
}

/// Encoding used for the compressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// MIME type sent alongside the payload.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    /// File extension (without dot) for names derived from this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webp" => Ok(OutputFormat::Webp),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Parameters for a single resize + re-encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}
