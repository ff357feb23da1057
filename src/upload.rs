//! Upload transport for the object-storage gateway.
//!
//! ## Wire contract
//!
//! | Call | Request | Success |
//! |---|---|---|
//! | upload | `POST {endpoint}`, multipart field `file` | `2xx {success:true, url, filename}` |
//! | delete | `DELETE {endpoint}`, JSON `{url}` | `2xx {success:true}` |
//! | exists | `HEAD {url}` | `2xx` |
//!
//! Upload failures answer `{success:false, error}` with a 2xx or 4xx/5xx
//! status. Delete answers `404` when the object is gone and `400` when the
//! body has no url. Any non-2xx HEAD means the image does not exist.
//!
//! ## Failure kinds
//!
//! A `2xx` answer with `success:false` is an application-level rejection and
//! comes back as [`UploadResult::Rejected`], not as an error. Everything else
//! that goes wrong is an [`UploadError`], which separates requests that never
//! completed ([`Network`](UploadError::Network), [`Timeout`](UploadError::Timeout))
//! from requests the gateway answered and refused ([`Http`](UploadError::Http),
//! [`MalformedResponse`](UploadError::MalformedResponse)). Only the first group,
//! plus 5xx, is worth a bare retry; see [`UploadError::is_retryable`].
//!
//! ## Progress
//!
//! The payload is streamed to the socket in 64 KiB chunks and the progress
//! callback receives the percentage handed to the transport after each chunk.

use crate::config::StorageConfig;
use crate::types::CompressedImage;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Multipart field the gateway reads the file from.
pub const FILE_FIELD: &str = "file";

const CHUNK_SIZE: usize = 64 * 1024;

/// Per-upload progress callback, called with a percentage in `[0, 100]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Batch progress callback: `(global_percent, current_item, total)`, with
/// `current_item` counting from 1.
pub type BatchProgressFn = Arc<dyn Fn(f64, usize, usize) + Send + Sync>;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid storage configuration: {0}")]
    Config(String),
    #[error("Network error, the request did not complete: {0}")]
    Network(String),
    #[error("Request timed out after {0:?}, the request did not complete")]
    Timeout(Duration),
    #[error("Storage answered HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Storage answered HTTP {status} with an unreadable body: {detail}")]
    MalformedResponse { status: u16, detail: String },
    #[error("Storage rejected the request: {0}")]
    Rejected(String),
    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// The gateway received the request and answered.
    pub fn reached_server(&self) -> bool {
        matches!(
            self,
            UploadError::Http { .. }
                | UploadError::MalformedResponse { .. }
                | UploadError::Rejected(_)
        )
    }

    /// Re-sending the same bytes may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network(_) | UploadError::Timeout(_) => true,
            UploadError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Outcome of a completed upload exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    /// Stored; `url` is the public address of the object.
    Stored { url: String, filename: String },
    /// The gateway's own validation refused the file.
    Rejected { error: String },
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Stored { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            UploadResult::Stored { url, .. } => Some(url),
            UploadResult::Rejected { .. } => None,
        }
    }

    /// Public URL of a stored object, or the rejection as an error.
    pub fn into_url(self) -> Result<String, UploadError> {
        match self {
            UploadResult::Stored { url, .. } => Ok(url),
            UploadResult::Rejected { error } => Err(UploadError::Rejected(error)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing stored under that URL. Deleting again is harmless.
    NotFound,
}

/// One entry of [`UploadClient::upload_multiple`].
#[derive(Debug)]
pub struct UploadItem {
    pub index: usize,
    pub filename: String,
    pub result: Result<UploadResult, UploadError>,
}

impl UploadItem {
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(r) if r.is_success())
    }
}

/// One entry of [`UploadClient::delete_multiple`].
#[derive(Debug)]
pub struct DeleteItem {
    pub url: String,
    pub result: Result<DeleteOutcome, UploadError>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    success: bool,
    url: Option<String>,
    filename: Option<String>,
    error: Option<String>,
}

/// HTTP client bound to one storage gateway.
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: Client,
    endpoint: String,
    public_base_url: String,
    timeout: Duration,
}

impl UploadClient {
    /// Client for the gateway described by `config`.
    pub fn new(config: &StorageConfig) -> Result<Self, UploadError> {
        Self::with_endpoint(
            &config.endpoint,
            &config.public_base_url,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_endpoint(
        endpoint: &str,
        public_base_url: &str,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(UploadError::Config("storage endpoint is not set".into()));
        }
        Url::parse(endpoint)
            .map_err(|e| UploadError::Config(format!("bad endpoint {endpoint:?}: {e}")))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Config(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            public_base_url: public_base_url.trim().to_string(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    fn classify(&self, e: reqwest::Error) -> UploadError {
        if e.is_timeout() {
            UploadError::Timeout(self.timeout)
        } else {
            UploadError::Network(e.to_string())
        }
    }

    /// Send `request`, read the full body, and give up early on cancellation.
    async fn exchange(
        &self,
        request: RequestBuilder,
        cancel: Option<&CancellationToken>,
    ) -> Result<(StatusCode, String), UploadError> {
        let fut = async {
            let response = request.send().await.map_err(|e| self.classify(e))?;
            let status = response.status();
            let body = response.text().await.map_err(|e| self.classify(e))?;
            Ok((status, body))
        };
        cancellable(fut, cancel).await
    }

    /// POST `image` to the gateway as `filename`.
    pub async fn upload_image(
        &self,
        image: &CompressedImage,
        filename: &str,
        on_progress: Option<ProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadResult, UploadError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(UploadError::Cancelled);
        }

        let len = image.len() as u64;
        let part = Part::stream_with_length(progress_body(image.bytes.clone(), on_progress), len)
            .file_name(filename.to_string())
            .mime_str(image.mime_type())
            .map_err(|e| UploadError::Config(e.to_string()))?;
        let form = Form::new().part(FILE_FIELD, part);

        debug!(filename, bytes = len, endpoint = %self.endpoint, "uploading");
        let request = self.http.post(&self.endpoint).multipart(form);
        let (status, body) = self.exchange(request, cancel).await?;

        let result = interpret_upload(status, &body, filename)?;
        match &result {
            UploadResult::Stored { url, .. } => info!(filename, url = %url, "uploaded"),
            UploadResult::Rejected { error } => warn!(filename, error = %error, "upload rejected"),
        }
        Ok(result)
    }

    /// Upload images one after another with global progress.
    ///
    /// Global progress is `((i + pct/100) / total) * 100` for item `i`.
    pub async fn upload_multiple(
        &self,
        items: &[(CompressedImage, String)],
        on_progress: Option<BatchProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> Vec<UploadItem> {
        let total = items.len();
        let mut results = Vec::with_capacity(total);

        for (index, (image, filename)) in items.iter().enumerate() {
            let item_progress = on_progress.clone().map(|cb| -> ProgressFn {
                Arc::new(move |pct: f64| {
                    cb(batch_percent(index, pct, total), index + 1, total)
                })
            });
            let result = self.upload_image(image, filename, item_progress, cancel).await;
            if let Err(e) = &result {
                warn!(index, filename = %filename, error = %e, "batch upload failed");
            }
            results.push(UploadItem {
                index,
                filename: filename.clone(),
                result,
            });
        }

        let stored = results.iter().filter(|r| r.is_success()).count();
        info!(stored, total, "batch upload finished");
        results
    }

    /// Ask the gateway to remove the object behind `url`.
    pub async fn delete_image(
        &self,
        url: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<DeleteOutcome, UploadError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(UploadError::Cancelled);
        }

        let request = self
            .http
            .delete(&self.endpoint)
            .json(&serde_json::json!({ "url": url }));
        let (status, body) = self.exchange(request, cancel).await?;

        let outcome = interpret_delete(status, &body)?;
        match outcome {
            DeleteOutcome::Deleted => info!(url, "deleted"),
            DeleteOutcome::NotFound => debug!(url, "delete: not found"),
        }
        Ok(outcome)
    }

    /// Delete each URL in turn. Failures are recorded per URL.
    pub async fn delete_multiple(
        &self,
        urls: &[String],
        cancel: Option<&CancellationToken>,
    ) -> Vec<DeleteItem> {
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let result = self.delete_image(url, cancel).await;
            if let Err(e) = &result {
                warn!(url = %url, error = %e, "delete failed");
            }
            results.push(DeleteItem {
                url: url.clone(),
                result,
            });
        }
        results
    }

    /// Whether `url` answers a HEAD request with 2xx. Any failure is `false`.
    pub async fn image_exists(&self, url: &str) -> bool {
        match self.http.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url, error = %e, "existence check failed");
                false
            }
        }
    }

    /// [`resolve_image_url`] against this client's public base URL.
    pub fn image_url(&self, name: &str) -> String {
        resolve_image_url(&self.public_base_url, name)
    }
}

/// Race `fut` against `cancel`, if given.
async fn cancellable<T>(
    fut: impl Future<Output = Result<T, UploadError>>,
    cancel: Option<&CancellationToken>,
) -> Result<T, UploadError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(UploadError::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}

/// Stream `payload` in chunks, reporting the sent percentage after each one.
fn progress_body(payload: Bytes, on_progress: Option<ProgressFn>) -> Body {
    let total = payload.len();
    let chunks = (0..total).step_by(CHUNK_SIZE).map(move |start| {
        let end = (start + CHUNK_SIZE).min(total);
        if let Some(cb) = &on_progress {
            cb(end as f64 / total as f64 * 100.0);
        }
        Ok::<Bytes, std::io::Error>(payload.slice(start..end))
    });
    Body::wrap_stream(futures::stream::iter(chunks))
}

fn batch_percent(index: usize, item_percent: f64, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((index as f64 + item_percent / 100.0) / total as f64) * 100.0
}

fn parse_body(status: StatusCode, body: &str) -> Result<GatewayResponse, UploadError> {
    serde_json::from_str(body).map_err(|e| UploadError::MalformedResponse {
        status: status.as_u16(),
        detail: e.to_string(),
    })
}

/// Error text for a non-2xx answer: the gateway's `error`, else the reason phrase.
fn http_error(status: StatusCode, body: &str) -> UploadError {
    let message = serde_json::from_str::<GatewayResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "unknown error".to_string());
    UploadError::Http {
        status: status.as_u16(),
        message,
    }
}

fn interpret_upload(
    status: StatusCode,
    body: &str,
    sent_filename: &str,
) -> Result<UploadResult, UploadError> {
    if !status.is_success() {
        return Err(http_error(status, body));
    }
    let parsed = parse_body(status, body)?;
    if !parsed.success {
        return Ok(UploadResult::Rejected {
            error: parsed
                .error
                .unwrap_or_else(|| "unknown upload error".to_string()),
        });
    }
    match parsed.url {
        Some(url) if !url.is_empty() => Ok(UploadResult::Stored {
            url,
            filename: parsed.filename.unwrap_or_else(|| sent_filename.to_string()),
        }),
        _ => Err(UploadError::MalformedResponse {
            status: status.as_u16(),
            detail: "success without url".to_string(),
        }),
    }
}

fn interpret_delete(status: StatusCode, body: &str) -> Result<DeleteOutcome, UploadError> {
    if status == StatusCode::NOT_FOUND {
        return Ok(DeleteOutcome::NotFound);
    }
    if !status.is_success() {
        return Err(http_error(status, body));
    }
    let parsed = parse_body(status, body)?;
    if parsed.success {
        Ok(DeleteOutcome::Deleted)
    } else {
        Err(UploadError::Rejected(
            parsed
                .error
                .unwrap_or_else(|| "unknown delete error".to_string()),
        ))
    }
}

/// Public URL for a stored object name. Absolute URLs pass through.
pub fn resolve_image_url(public_base_url: &str, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    if name.starts_with("http://") || name.starts_with("https://") {
        return name.to_string();
    }
    format!(
        "{}/{}",
        public_base_url.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

/// Last path segment of `url`. Strings that are not URLs come back unchanged.
pub fn filename_from_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("")
            .to_string(),
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_success_body() {
        let result = interpret_upload(
            StatusCode::OK,
            concat!(
                r#"{"success":true,"url":"https://cdn.example/productos/x.webp","#,
                r#""filename":"productos/x.webp"}"#,
            ),
            "x.webp",
        )
        .unwrap();
        assert_eq!(
            result,
            UploadResult::Stored {
                url: "https://cdn.example/productos/x.webp".into(),
                filename: "productos/x.webp".into(),
            }
        );
    }

    #[test]
    fn upload_success_without_filename_keeps_sent_name() {
        let body = r#"{"success":true,"url":"https://a/b.webp"}"#;
        let result = interpret_upload(StatusCode::OK, body, "b.webp").unwrap();
        assert!(matches!(result, UploadResult::Stored { filename, .. } if filename == "b.webp"));
    }

    #[test]
    fn success_false_on_2xx_is_rejection_not_error() {
        let body = r#"{"success":false,"error":"too big"}"#;
        let result = interpret_upload(StatusCode::OK, body, "a").unwrap();
        assert_eq!(result, UploadResult::Rejected { error: "too big".into() });
        assert!(!result.is_success());
        assert!(matches!(result.into_url(), Err(UploadError::Rejected(m)) if m == "too big"));
    }

    #[test]
    fn success_without_url_is_malformed() {
        let err = interpret_upload(StatusCode::OK, r#"{"success":true}"#, "a").unwrap_err();
        assert!(matches!(err, UploadError::MalformedResponse { status: 200, .. }));
    }

    #[test]
    fn unparseable_2xx_is_malformed() {
        let err = interpret_upload(StatusCode::OK, "<html>oops</html>", "a").unwrap_err();
        assert!(matches!(err, UploadError::MalformedResponse { .. }));
        assert!(err.reached_server());
        assert!(!err.is_retryable());
    }

    #[test]
    fn non_2xx_uses_gateway_error_message() {
        let err = interpret_upload(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"error":"Tipo de archivo no permitido"}"#,
            "a",
        )
        .unwrap_err();
        match err {
            UploadError::Http { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Tipo de archivo no permitido");
            }
            other => panic!("expected Http, got {other:?}"),
        }
    }

    #[test]
    fn non_2xx_without_json_uses_reason_phrase() {
        let err = interpret_upload(StatusCode::INTERNAL_SERVER_ERROR, "", "a").unwrap_err();
        assert!(matches!(
            &err,
            UploadError::Http { status: 500, message } if message == "Internal Server Error"
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn delete_outcomes() {
        assert_eq!(
            interpret_delete(StatusCode::OK, r#"{"success":true}"#).unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            interpret_delete(StatusCode::NOT_FOUND, r#"{"success":false,"error":"not found"}"#)
                .unwrap(),
            DeleteOutcome::NotFound
        );
        assert!(matches!(
            interpret_delete(StatusCode::BAD_REQUEST, r#"{"success":false,"error":"no url"}"#),
            Err(UploadError::Http { status: 400, message }) if message == "no url"
        ));
        assert!(matches!(
            interpret_delete(StatusCode::OK, r#"{"success":false,"error":"locked"}"#),
            Err(UploadError::Rejected(_))
        ));
    }

    #[test]
    fn error_classification() {
        assert!(!UploadError::Network("refused".into()).reached_server());
        assert!(UploadError::Network("refused".into()).is_retryable());
        assert!(UploadError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!UploadError::Cancelled.is_retryable());
        let rejected = UploadError::Http {
            status: 413,
            message: "too large".into(),
        };
        assert!(rejected.reached_server());
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn batch_percent_formula() {
        assert_eq!(batch_percent(0, 0.0, 4), 0.0);
        assert_eq!(batch_percent(0, 100.0, 4), 25.0);
        assert_eq!(batch_percent(2, 50.0, 4), 62.5);
        assert_eq!(batch_percent(3, 100.0, 4), 100.0);
    }

    #[test]
    fn resolve_image_url_cases() {
        let base = "https://pub.example.dev";
        assert_eq!(resolve_image_url(base, ""), "");
        assert_eq!(
            resolve_image_url(base, "productos/a.webp"),
            "https://pub.example.dev/productos/a.webp"
        );
        assert_eq!(
            resolve_image_url("https://pub.example.dev/", "/a.webp"),
            "https://pub.example.dev/a.webp"
        );
        assert_eq!(
            resolve_image_url(base, "http://other.example/x.jpg"),
            "http://other.example/x.jpg"
        );
    }

    #[test]
    fn filename_from_url_cases() {
        assert_eq!(
            filename_from_url("https://pub.example.dev/productos/123-abc-sofa.webp"),
            "123-abc-sofa.webp"
        );
        assert_eq!(filename_from_url("https://pub.example.dev/a.webp?v=2"), "a.webp");
        assert_eq!(filename_from_url("https://pub.example.dev"), "");
        assert_eq!(filename_from_url("plain-name.webp"), "plain-name.webp");
        assert_eq!(filename_from_url(""), "");
    }

    #[test]
    fn client_requires_endpoint() {
        let err = UploadClient::with_endpoint("  ", "", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
        let err = UploadClient::with_endpoint("not a url", "", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[test]
    fn client_image_url_uses_base() {
        let client = UploadClient::with_endpoint(
            "https://worker.example.dev",
            "https://pub.example.dev",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.image_url("a.webp"), "https://pub.example.dev/a.webp");
    }
}
