//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every codec must
//! support: identify (read dimensions from the header) and encode (decode,
//! resample to the target size, re-encode).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Both operations are
//! synchronous and CPU-bound; the [`compress`](crate::compress) orchestrator
//! moves them onto the blocking thread pool.

use super::params::EncodeParams;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Source bytes are not a decodable raster image.
    #[error("Failed to decode image: {0}")]
    Decode(String),
    /// The encoder could not produce a payload.
    #[error("Failed to encode image: {0}")]
    Encoding(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image codec backends.
///
/// `Send + Sync` so one backend can be shared (behind an `Arc`) by every
/// blocking task the orchestrator spawns.
pub trait ImageBackend: Send + Sync {
    /// Read image dimensions from the encoded bytes.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode `source`, resample to exactly `params.width` × `params.height`
    /// with a smooth filter, and encode to `params.format`.
    fn encode(&self, source: &[u8], params: &EncodeParams) -> Result<Vec<u8>, BackendError>;
}
