//! Compression orchestrator: validate → fit → re-encode, for one image or a batch.
//!
//! Decoding and encoding are CPU-bound, so each image runs on tokio's
//! blocking pool while the calling task only awaits the result. That keeps
//! the async side free to drive progress reporting and observe cancellation.
//!
//! ## Batches
//!
//! [`Compressor::compress_multiple`] processes inputs strictly in order, one at
//! a time. A failing item is recorded in its own [`BatchItem`] and the batch
//! moves on; the progress callback fires after every item with
//! `(completed, total)`, so the first argument counts 1..=total.

use crate::imaging::{BackendError, ImageBackend, operations};
use crate::types::{CompressedImage, CompressionOptions, RawImageInput};
use crate::validate::{DEFAULT_MAX_SIZE_MB, ValidationReport, validate};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Invalid image: {0}")]
    Validation(ValidationReport),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode image: {0}")]
    Encoding(String),
    #[error("Compression task failed: {0}")]
    TaskFailed(String),
    #[error("Compression cancelled")]
    Cancelled,
}

impl From<BackendError> for CompressError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Decode(msg) => CompressError::Decode(msg),
            BackendError::Encoding(msg) => CompressError::Encoding(msg),
        }
    }
}

/// Per-item outcome of a batch.
#[derive(Debug)]
pub struct BatchItem {
    /// Position in the input slice.
    pub index: usize,
    pub original_name: String,
    pub result: Result<CompressedImage, CompressError>,
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs compression through a shared codec backend.
pub struct Compressor<B> {
    backend: Arc<B>,
    defaults: CompressionOptions,
    max_size_mb: f64,
}

impl<B> Clone for Compressor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            defaults: self.defaults,
            max_size_mb: self.max_size_mb,
        }
    }
}

impl<B: ImageBackend + 'static> Compressor<B> {
    pub fn new(backend: B) -> Self {
        Self::with_shared(Arc::new(backend))
    }

    pub fn with_shared(backend: Arc<B>) -> Self {
        Self {
            backend,
            defaults: CompressionOptions::default(),
            max_size_mb: DEFAULT_MAX_SIZE_MB,
        }
    }

    /// Options used when a call passes none.
    pub fn with_defaults(mut self, defaults: CompressionOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Size ceiling for the validation step.
    pub fn with_max_size_mb(mut self, max_size_mb: f64) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    pub fn defaults(&self) -> &CompressionOptions {
        &self.defaults
    }

    pub fn max_size_mb(&self) -> f64 {
        self.max_size_mb
    }

    /// Validate and compress one image.
    pub async fn compress_image(
        &self,
        input: &RawImageInput,
        options: Option<&CompressionOptions>,
        cancel: Option<&CancellationToken>,
    ) -> Result<CompressedImage, CompressError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(CompressError::Cancelled);
        }

        let report = validate(input, self.max_size_mb);
        if !report.is_valid() {
            return Err(CompressError::Validation(report));
        }

        let options = *options.unwrap_or(&self.defaults);
        let backend = Arc::clone(&self.backend);
        let source = input.bytes.clone();
        let task = tokio::task::spawn_blocking(move || {
            operations::resize_and_encode(backend.as_ref(), &source, &options)
        });

        let joined = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(CompressError::Cancelled),
                joined = task => joined,
            },
            None => task.await,
        };
        let encoded = joined.map_err(|e| CompressError::TaskFailed(e.to_string()))??;

        let target = (encoded.params.width, encoded.params.height);
        debug!(
            name = %input.name,
            from = ?encoded.source_dims,
            to = ?target,
            format = %encoded.params.format,
            bytes_in = input.len(),
            bytes_out = encoded.bytes.len(),
            "compressed"
        );

        Ok(CompressedImage {
            bytes: Bytes::from(encoded.bytes),
            format: encoded.params.format,
            width: encoded.params.width,
            height: encoded.params.height,
            source_width: encoded.source_dims.0,
            source_height: encoded.source_dims.1,
            source_len: input.len(),
        })
    }

    /// Compress `inputs` one after another, isolating failures per item.
    ///
    /// `on_progress(completed, total)` fires after each item in input order.
    /// Once `cancel` fires, every remaining item resolves to
    /// [`CompressError::Cancelled`] without touching the codec.
    pub async fn compress_multiple(
        &self,
        inputs: &[RawImageInput],
        options: Option<&CompressionOptions>,
        mut on_progress: impl FnMut(usize, usize),
        cancel: Option<&CancellationToken>,
    ) -> Vec<BatchItem> {
        let total = inputs.len();
        let mut results = Vec::with_capacity(total);

        for (index, input) in inputs.iter().enumerate() {
            let result = self.compress_image(input, options, cancel).await;
            if let Err(e) = &result {
                warn!(index, name = %input.name, error = %e, "batch item failed");
            }
            results.push(BatchItem {
                index,
                original_name: input.name.clone(),
                result,
            });
            on_progress(index + 1, total);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{CORRUPT, MockBackend, RecordedOp, mock_source};
    use crate::imaging::{OutputFormat, Quality};

    fn raw(source: Vec<u8>, name: &str) -> RawImageInput {
        RawImageInput::new(source, "image/jpeg", name)
    }

    fn compressor() -> Compressor<MockBackend> {
        Compressor::new(MockBackend::new())
    }

    #[tokio::test]
    async fn compress_image_uses_defaults() {
        let c = compressor();
        let out = c
            .compress_image(&raw(mock_source(2000, 3000), "sofa.jpg"), None, None)
            .await
            .unwrap();

        assert_eq!((out.width, out.height), (800, 1200));
        assert_eq!((out.source_width, out.source_height), (2000, 3000));
        assert_eq!(out.format, OutputFormat::Webp);
        assert_eq!(out.bytes.as_ref(), b"webp:800x1200");
        assert_eq!(out.source_len, "2000x3000".len());
    }

    #[tokio::test]
    async fn explicit_options_override_defaults() {
        let c = compressor();
        let opts = CompressionOptions {
            max_width: 400,
            max_height: 400,
            quality: Quality::new(0.5),
            output_format: OutputFormat::Png,
        };
        let out = c
            .compress_image(&raw(mock_source(800, 800), "a.jpg"), Some(&opts), None)
            .await
            .unwrap();
        assert_eq!((out.width, out.height), (400, 400));
        assert_eq!(out.format, OutputFormat::Png);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_backend() {
        let backend = Arc::new(MockBackend::new());
        let c = Compressor::with_shared(Arc::clone(&backend));
        let input = RawImageInput::new(mock_source(10, 10), "application/pdf", "doc.pdf");

        let err = c.compress_image(&input, None, None).await.unwrap_err();
        match err {
            CompressError::Validation(report) => assert_eq!(report.issues.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(backend.get_operations().is_empty());
    }

    #[tokio::test]
    async fn size_ceiling_comes_from_builder() {
        let c = compressor().with_max_size_mb(0.000001);
        let err = c
            .compress_image(&raw(mock_source(10, 10), "a.jpg"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompressError::Validation(_)));
    }

    #[tokio::test]
    async fn corrupt_bytes_are_decode_errors() {
        let c = compressor();
        let err = c
            .compress_image(&raw(CORRUPT.to_vec(), "bad.jpg"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompressError::Decode(_)));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let backend = Arc::new(MockBackend::new());
        let c = Compressor::with_shared(Arc::clone(&backend));
        let token = CancellationToken::new();
        token.cancel();

        let err = c
            .compress_image(&raw(mock_source(10, 10), "a.jpg"), None, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, CompressError::Cancelled));
        assert!(backend.get_operations().is_empty());
    }

    #[tokio::test]
    async fn batch_isolates_failure_and_reports_progress_in_order() {
        let c = compressor();
        let inputs: Vec<RawImageInput> = (0..5)
            .map(|i| {
                if i == 2 {
                    raw(CORRUPT.to_vec(), "broken.jpg")
                } else {
                    raw(mock_source(100 * (i + 1), 100), &format!("img{i}.jpg"))
                }
            })
            .collect();

        let mut calls = Vec::new();
        let results = c
            .compress_multiple(&inputs, None, |done, total| calls.push((done, total)), None)
            .await;

        assert_eq!(results.len(), 5);
        assert_eq!(results.iter().filter(|r| !r.is_success()).count(), 1);
        assert!(!results[2].is_success());
        assert_eq!(results[2].original_name, "broken.jpg");
        assert_eq!(results[2].index, 2);
        assert_eq!(calls, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn batch_runs_sequentially_in_input_order() {
        let backend = Arc::new(MockBackend::new());
        let c = Compressor::with_shared(Arc::clone(&backend));
        let inputs = vec![
            raw(mock_source(10, 10), "a.jpg"),
            raw(mock_source(20, 20), "b.jpg"),
            raw(mock_source(30, 30), "c.jpg"),
        ];
        c.compress_multiple(&inputs, None, |_, _| {}, None).await;

        let sources: Vec<String> = backend
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Encode { source, .. } => Some(source),
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec!["10x10", "20x20", "30x30"]);
    }

    #[tokio::test]
    async fn cancelled_batch_marks_remaining_items() {
        let c = compressor();
        let token = CancellationToken::new();
        let inputs = vec![
            raw(mock_source(10, 10), "a.jpg"),
            raw(mock_source(20, 20), "b.jpg"),
            raw(mock_source(30, 30), "c.jpg"),
        ];

        let mut seen = 0;
        let results = c
            .compress_multiple(
                &inputs,
                None,
                |done, _| {
                    seen = done;
                    if done == 1 {
                        token.cancel();
                    }
                },
                Some(&token),
            )
            .await;

        assert!(results[0].is_success());
        assert!(matches!(results[1].result, Err(CompressError::Cancelled)));
        assert!(matches!(results[2].result, Err(CompressError::Cancelled)));
        assert_eq!(seen, 3);
    }

    #[tokio::test]
    async fn empty_batch() {
        let c = compressor();
        let mut called = false;
        let results = c.compress_multiple(&[], None, |_, _| called = true, None).await;
        assert!(results.is_empty());
        assert!(!called);
    }

    #[tokio::test]
    async fn sideways_camera_jpeg_is_fitted_upright() {
        use crate::imaging::RustBackend;
        use crate::imaging::rust_backend::tests::{jpeg_bytes, with_exif_orientation};

        let c = Compressor::new(RustBackend::new());
        let opts = CompressionOptions {
            max_width: 300,
            max_height: 300,
            quality: Quality::new(0.8),
            output_format: OutputFormat::Jpeg,
        };
        let source = with_exif_orientation(&jpeg_bytes(400, 200), 6);
        let out = c
            .compress_image(&raw(source, "retrato.jpg"), Some(&opts), None)
            .await
            .unwrap();

        assert_eq!((out.source_width, out.source_height), (200, 400));
        assert_eq!((out.width, out.height), (150, 300));
    }
}
