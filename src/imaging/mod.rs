//! Image processing: identify, resample and re-encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Resample** | Lanczos3 via `DynamicImage::resize_exact` |
//! | **Encode → WebP** | `webp` (libwebp, lossy) |
//! | **Encode → JPEG / PNG** | `image` codecs |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing one encode
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::fit_within_bounds;
pub use operations::{EncodedImage, get_dimensions, plan_encode, resize_and_encode};
pub use params::{EncodeParams, OutputFormat, Quality};
pub use rust_backend::RustBackend;
