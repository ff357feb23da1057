//! End-to-end flows: prepare an image for upload, or prepare and upload it.
//!
//! ```text
//! RawImageInput ─▶ validate ─▶ fit + re-encode ─▶ name ─▶ preview ─▶ upload ─▶ public URL
//!                 └────────── Compressor ─────────┘       └─ guard ─┘
//! ```
//!
//! [`ImagePipeline::prepare_and_upload`] reports staged progress: 0–50 while
//! compressing, 50–100 while uploading, and 100 with [`Stage::Done`]. The
//! preview created for the upload is held by a [`PreviewGuard`], so it is
//! revoked whether the call succeeds, fails or is cancelled.

use crate::compress::{CompressError, Compressor};
use crate::config::PipelineConfig;
use crate::imaging::{ImageBackend, OutputFormat, Quality};
use crate::naming::Namer;
use crate::preview::{PreviewGuard, PreviewRegistry};
use crate::types::{CompressedImage, CompressionOptions, RawImageInput};
use crate::upload::{ProgressFn, UploadClient, UploadError, UploadResult};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default edge of a square thumbnail bound, in pixels.
pub const THUMBNAIL_SIZE: u32 = 150;
const THUMBNAIL_QUALITY: f32 = 0.7;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Compress(#[from] CompressError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Stage reported alongside staged progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compressing,
    Uploading,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Compressing => "Compressing image...",
            Stage::Uploading => "Uploading image...",
            Stage::Done => "Done",
        })
    }
}

/// Staged progress callback: `(percent, stage)`.
pub type StageProgressFn = Arc<dyn Fn(f64, Stage) + Send + Sync>;

/// Batch staged progress: `(current_item, total, item_percent, stage)`.
pub type BatchStageProgressFn = Arc<dyn Fn(usize, usize, f64, Stage) + Send + Sync>;

/// A compressed, named image with a live preview, ready to upload.
#[derive(Debug)]
pub struct PreparedImage {
    pub image: CompressedImage,
    pub filename: String,
    pub original_name: String,
    pub preview: PreviewGuard,
}

/// Result of a successful prepare-and-upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub url: String,
    pub filename: String,
    pub original_size: usize,
    pub compressed_size: usize,
}

/// Per-item outcome of [`ImagePipeline::prepare_and_upload_multiple`].
#[derive(Debug)]
pub struct PipelineItem {
    pub index: usize,
    pub original_name: String,
    pub result: Result<UploadedImage, PipelineError>,
}

pub struct ImagePipeline<B> {
    compressor: Compressor<B>,
    namer: Namer,
    previews: PreviewRegistry,
}

impl<B: ImageBackend + 'static> ImagePipeline<B> {
    /// Pipeline using the defaults, size ceiling and naming of `config`.
    pub fn new(backend: B, config: &PipelineConfig, previews: PreviewRegistry) -> Self {
        let compressor = Compressor::new(backend)
            .with_defaults(config.compression)
            .with_max_size_mb(config.validation.max_size_mb);
        Self {
            compressor,
            namer: config.namer(),
            previews,
        }
    }

    pub fn compressor(&self) -> &Compressor<B> {
        &self.compressor
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Validate, compress, name and preview one image.
    ///
    /// The filename extension follows the output format, not the source file.
    pub async fn prepare_image_for_upload(
        &self,
        input: &RawImageInput,
        options: Option<&CompressionOptions>,
        cancel: Option<&CancellationToken>,
    ) -> Result<PreparedImage, CompressError> {
        let image = self.compressor.compress_image(input, options, cancel).await?;
        let filename = self
            .namer
            .name_with_extension(&input.name, image.format.extension())
            .filename();
        let preview = self.previews.create_guarded(image.bytes.clone());
        Ok(PreparedImage {
            image,
            filename,
            original_name: input.name.clone(),
            preview,
        })
    }

    /// Prepare `input`, upload it, and release its preview.
    pub async fn prepare_and_upload(
        &self,
        input: &RawImageInput,
        client: &UploadClient,
        on_progress: Option<StageProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadedImage, PipelineError> {
        let report = |pct: f64, stage: Stage| {
            if let Some(cb) = &on_progress {
                cb(pct, stage);
            }
        };

        report(0.0, Stage::Compressing);
        let prepared = self.prepare_image_for_upload(input, None, cancel).await?;

        report(50.0, Stage::Uploading);
        let upload_progress = on_progress.clone().map(|cb| -> ProgressFn {
            Arc::new(move |pct: f64| cb(50.0 + pct / 2.0, Stage::Uploading))
        });
        let result = client
            .upload_image(&prepared.image, &prepared.filename, upload_progress, cancel)
            .await?;

        let (url, filename) = match result {
            UploadResult::Stored { url, filename } => (url, filename),
            UploadResult::Rejected { error } => return Err(UploadError::Rejected(error).into()),
        };

        report(100.0, Stage::Done);
        let uploaded = UploadedImage {
            url,
            filename,
            original_size: input.len(),
            compressed_size: prepared.image.len(),
        };
        prepared.preview.revoke();
        Ok(uploaded)
    }

    /// [`prepare_and_upload`](Self::prepare_and_upload) for each input in turn.
    ///
    /// One item failing does not stop the rest.
    pub async fn prepare_and_upload_multiple(
        &self,
        inputs: &[RawImageInput],
        client: &UploadClient,
        on_progress: Option<BatchStageProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> Vec<PipelineItem> {
        let total = inputs.len();
        let mut results = Vec::with_capacity(total);

        for (index, input) in inputs.iter().enumerate() {
            let item_progress = on_progress.clone().map(|cb| -> StageProgressFn {
                Arc::new(move |pct: f64, stage: Stage| cb(index + 1, total, pct, stage))
            });
            let result = self
                .prepare_and_upload(input, client, item_progress, cancel)
                .await;
            if let Err(e) = &result {
                warn!(index, name = %input.name, error = %e, "prepare and upload failed");
            }
            results.push(PipelineItem {
                index,
                original_name: input.name.clone(),
                result,
            });
        }

        results
    }

    /// Small JPEG thumbnail bounded by a `size`×`size` box.
    pub async fn create_thumbnail(
        &self,
        input: &RawImageInput,
        size: Option<u32>,
        cancel: Option<&CancellationToken>,
    ) -> Result<CompressedImage, CompressError> {
        let size = size.unwrap_or(THUMBNAIL_SIZE);
        let options = CompressionOptions {
            max_width: size,
            max_height: size,
            quality: Quality::new(THUMBNAIL_QUALITY),
            output_format: OutputFormat::Jpeg,
        };
        self.compressor
            .compress_image(input, Some(&options), cancel)
            .await
    }
}
