//! CLI output formatting for every command.
//!
//! # Display Contract
//!
//! Each input file gets a header line (positional index + original name)
//! followed by indented detail lines. A summary line closes the listing.
//!
//! ## Check
//!
//! ```text
//! 001 sofa.jpg
//!     ok (2.31 MB)
//! 002 brochure.pdf
//!     The file is not an image
//!     Unsupported format. Use JPG, PNG, WebP or GIF
//! Checked 2 files, 1 invalid
//! ```
//!
//! ## Compress
//!
//! ```text
//! 001 sofa.jpg
//!     4032x3024 → 1200x900 webp
//!     2.31 MB → 148.2 KB (93.7% smaller)
//!     Output: out/sofa-1718000000000-k3j9x0.webp
//! Compressed 1 of 1 files
//! ```
//!
//! ## Upload / Delete
//!
//! ```text
//! 001 sofa.jpg → https://pub.example.dev/productos/1718000000000-k3j9x0-sofa.webp
//! 002 mesa.jpg
//!     Error: Storage answered HTTP 500: Internal Server Error (retryable)
//! Uploaded 1 of 2 files
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::compress::BatchItem;
use crate::pipeline::PipelineItem;
use crate::upload::{DeleteItem, DeleteOutcome};
use crate::validate::ValidationReport;
use serde::Serialize;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

const INDENT: &str = "    ";

/// Format a 0-based index as a 1-based 3-digit positional number.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos + 1)
}

fn header(index: usize, name: &str) -> String {
    format!("{} {}", format_index(index), name)
}

fn detail(text: impl AsRef<str>) -> String {
    format!("{INDENT}{}", text.as_ref())
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Human-readable byte size: `Bytes`, `KB`, `MB` or `GB`, at most two decimals.
///
/// ```
/// # use catalog_images::output::format_file_size;
/// assert_eq!(format_file_size(0), "0 Bytes");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[unit])
}

// ============================================================================
// Check
// ============================================================================

/// One checked input: display name, byte length and validation outcome.
pub struct CheckedInput<'a> {
    pub name: &'a str,
    pub len: usize,
    pub report: &'a ValidationReport,
}

pub fn format_check_output(inputs: &[CheckedInput<'_>]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut invalid = 0;
    for (i, input) in inputs.iter().enumerate() {
        lines.push(header(i, input.name));
        if input.report.is_valid() {
            lines.push(detail(format!("ok ({})", format_file_size(input.len as u64))));
        } else {
            invalid += 1;
            lines.extend(input.report.messages().iter().map(|m| detail(m)));
        }
    }
    lines.push(format!(
        "Checked {} file{}, {} invalid",
        inputs.len(),
        plural(inputs.len()),
        invalid
    ));
    lines
}

pub fn print_check_output(inputs: &[CheckedInput<'_>]) {
    print_lines(&format_check_output(inputs));
}

// ============================================================================
// Compress
// ============================================================================

/// Lines for one batch item. `written` is where the payload was saved, if anywhere.
pub fn format_compress_item(item: &BatchItem, written: Option<&Path>) -> Vec<String> {
    let mut lines = vec![header(item.index, &item.original_name)];
    match &item.result {
        Ok(image) => {
            lines.push(detail(format!(
                "{}x{} → {}x{} {}",
                image.source_width, image.source_height, image.width, image.height, image.format
            )));
            let reduction = image.reduction_percent();
            let change = if reduction >= 0.0 {
                format!("{reduction:.1}% smaller")
            } else {
                format!("{:.1}% larger", -reduction)
            };
            lines.push(detail(format!(
                "{} → {} ({change})",
                format_file_size(image.source_len as u64),
                format_file_size(image.len() as u64),
            )));
            if let Some(path) = written {
                lines.push(detail(format!("Output: {}", path.display())));
            }
        }
        Err(e) => lines.push(detail(format!("Error: {e}"))),
    }
    lines
}

pub fn format_compress_summary(succeeded: usize, total: usize) -> String {
    format!("Compressed {succeeded} of {total} file{}", plural(total))
}

pub fn print_compress_item(item: &BatchItem, written: Option<&Path>) {
    print_lines(&format_compress_item(item, written));
}

/// Error line for a batch command with failed items, `None` if all succeeded.
///
/// The CLI returns it as an error so the process exits non-zero.
pub fn failure_summary(failed: usize, total: usize, action: &str) -> Option<String> {
    (failed > 0).then(|| format!("{failed} of {total} item{} failed {action}", plural(total)))
}

// ============================================================================
// Upload
// ============================================================================

pub fn format_upload_output(items: &[PipelineItem]) -> Vec<String> {
    let mut lines = Vec::new();
    for item in items {
        match &item.result {
            Ok(uploaded) => lines.push(format!(
                "{} → {}",
                header(item.index, &item.original_name),
                uploaded.url
            )),
            Err(e) => {
                lines.push(header(item.index, &item.original_name));
                let retry = match e {
                    crate::pipeline::PipelineError::Upload(u) if u.is_retryable() => " (retryable)",
                    _ => "",
                };
                lines.push(detail(format!("Error: {e}{retry}")));
            }
        }
    }
    let ok = items.iter().filter(|i| i.result.is_ok()).count();
    lines.push(format!(
        "Uploaded {ok} of {} file{}",
        items.len(),
        plural(items.len())
    ));
    lines
}

/// Machine-readable record of one upload, for `--json`.
#[derive(Debug, Serialize)]
pub struct UploadRecord<'a> {
    pub index: usize,
    pub original_name: &'a str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn upload_records(items: &[PipelineItem]) -> Vec<UploadRecord<'_>> {
    items
        .iter()
        .map(|item| match &item.result {
            Ok(u) => UploadRecord {
                index: item.index,
                original_name: &item.original_name,
                success: true,
                url: Some(&u.url),
                filename: Some(&u.filename),
                original_size: Some(u.original_size),
                compressed_size: Some(u.compressed_size),
                error: None,
            },
            Err(e) => UploadRecord {
                index: item.index,
                original_name: &item.original_name,
                success: false,
                url: None,
                filename: None,
                original_size: None,
                compressed_size: None,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

pub fn format_upload_json(items: &[PipelineItem]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&upload_records(items))
}

pub fn print_upload_output(items: &[PipelineItem]) {
    print_lines(&format_upload_output(items));
}

// ============================================================================
// Delete
// ============================================================================

pub fn format_delete_output(items: &[DeleteItem]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let status = match &item.result {
            Ok(DeleteOutcome::Deleted) => "deleted".to_string(),
            Ok(DeleteOutcome::NotFound) => "not found".to_string(),
            Err(e) => format!("Error: {e}"),
        };
        lines.push(header(i, &item.url));
        lines.push(detail(status));
    }
    let deleted = items
        .iter()
        .filter(|i| matches!(i.result, Ok(DeleteOutcome::Deleted)))
        .count();
    lines.push(format!(
        "Deleted {deleted} of {} image{}",
        items.len(),
        plural(items.len())
    ));
    lines
}

pub fn print_delete_output(items: &[DeleteItem]) {
    print_lines(&format_delete_output(items));
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

// ============================================================================
// Tests
// ============================================================================
