//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take the compression options, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::calculations::fit_within_bounds;
use super::params::EncodeParams;
use crate::types::CompressionOptions;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, source: &[u8]) -> Result<(u32, u32)> {
    let dims = backend.identify(source)?;
    Ok((dims.width, dims.height))
}

/// Decide target size, format and quality for an image of `dims`.
pub fn plan_encode(dims: (u32, u32), options: &CompressionOptions) -> EncodeParams {
    let (width, height) = fit_within_bounds(dims, (options.max_width, options.max_height));
    EncodeParams {
        width,
        height,
        format: options.output_format,
        quality: options.quality,
    }
}

/// Bytes and final geometry of one re-encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub params: EncodeParams,
    /// Dimensions of the decoded source.
    pub source_dims: (u32, u32),
}

/// Identify `source`, fit it inside the option bounds, and re-encode it.
///
/// Images smaller than the bounds keep their size but are still re-encoded
/// into the requested format and quality.
pub fn resize_and_encode(
    backend: &(impl ImageBackend + ?Sized),
    source: &[u8],
    options: &CompressionOptions,
) -> Result<EncodedImage> {
    let dims = backend.identify(source)?;
    let source_dims = (dims.width, dims.height);
    if source_dims.0 == 0 || source_dims.1 == 0 {
        return Err(BackendError::Decode(format!(
            "image has no pixels ({}x{})",
            source_dims.0, source_dims.1
        )));
    }

    let params = plan_encode(source_dims, options);
    let bytes = backend.encode(source, &params)?;
    Ok(EncodedImage {
        bytes,
        params,
        source_dims,
    })
}
