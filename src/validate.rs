//! Pre-flight validation of raw image inputs.
//!
//! Checks run independently and accumulate: a PDF that is also too large
//! produces one issue per violated rule. The storage gateway re-validates
//! type and size on its side, so this is an early rejection, not a trust
//! boundary.

use crate::types::{RawImageInput, SUPPORTED_MEDIA_TYPES};
use std::fmt;

/// Default ceiling applied when no configuration overrides it.
pub const DEFAULT_MAX_SIZE_MB: f64 = 10.0;

/// One violated validation rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// Declared media type does not start with `image/`.
    NotAnImage { media_type: String },
    /// Payload is larger than the configured ceiling.
    TooLarge { len: usize, max_size_mb: f64 },
    /// An image type outside JPEG, PNG, WebP and GIF.
    UnsupportedFormat { media_type: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NotAnImage { .. } => write!(f, "The file is not an image"),
            ValidationIssue::TooLarge { max_size_mb, .. } => {
                write!(f, "Image exceeds the maximum size of {max_size_mb}MB")
            }
            ValidationIssue::UnsupportedFormat { .. } => {
                write!(f, "Unsupported format. Use JPG, PNG, WebP or GIF")
            }
        }
    }
}

/// Outcome of [`validate`]. Valid iff there are no issues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Human-readable message per issue, in check order.
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

/// Check `input` against the type allow-list and a `max_size_mb` ceiling.
pub fn validate(input: &RawImageInput, max_size_mb: f64) -> ValidationReport {
    let mut issues = Vec::new();
    let media_type = input.media_type.trim().to_ascii_lowercase();

    if !media_type.starts_with("image/") {
        issues.push(ValidationIssue::NotAnImage {
            media_type: input.media_type.clone(),
        });
    }

    let max_bytes = max_size_mb * 1024.0 * 1024.0;
    if input.len() as f64 > max_bytes {
        issues.push(ValidationIssue::TooLarge {
            len: input.len(),
            max_size_mb,
        });
    }

    if !SUPPORTED_MEDIA_TYPES.contains(&media_type.as_str()) {
        issues.push(ValidationIssue::UnsupportedFormat {
            media_type: input.media_type.clone(),
        });
    }

    ValidationReport { issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    fn input(media_type: &str, len: usize) -> RawImageInput {
        RawImageInput::new(vec![0u8; len], media_type, "photo")
    }

    #[test]
    fn accepts_every_supported_type() {
        for ty in SUPPORTED_MEDIA_TYPES {
            let report = validate(&input(ty, 1024), DEFAULT_MAX_SIZE_MB);
            assert!(report.is_valid(), "{ty}: {report}");
        }
    }

    #[test]
    fn media_type_check_is_case_insensitive() {
        assert!(validate(&input("IMAGE/PNG", 10), 10.0).is_valid());
    }

    #[test]
    fn oversize_png_has_single_size_issue() {
        let report = validate(&input("image/png", 15 * MB), 10.0);
        assert!(!report.is_valid());
        assert_eq!(report.messages(), vec!["Image exceeds the maximum size of 10MB"]);
    }

    #[test]
    fn exactly_at_ceiling_is_valid() {
        assert!(validate(&input("image/jpeg", 10 * MB), 10.0).is_valid());
        assert!(!validate(&input("image/jpeg", 10 * MB + 1), 10.0).is_valid());
    }

    #[test]
    fn fractional_ceiling() {
        let report = validate(&input("image/jpeg", MB), 0.5);
        assert!(matches!(
            report.issues.as_slice(),
            [ValidationIssue::TooLarge { len, .. }] if *len == MB
        ));
        assert_eq!(report.messages(), vec!["Image exceeds the maximum size of 0.5MB"]);
    }

    #[test]
    fn non_image_is_also_unsupported() {
        let report = validate(&input("application/pdf", 100), 10.0);
        assert_eq!(report.issues.len(), 2);
        assert!(matches!(report.issues[0], ValidationIssue::NotAnImage { .. }));
        assert!(matches!(report.issues[1], ValidationIssue::UnsupportedFormat { .. }));
    }

    #[test]
    fn wrong_type_and_oversize_accumulate() {
        let report = validate(&input("application/zip", 11 * MB), 10.0);
        assert!(report.issues.len() >= 2);
        assert!(
            report
                .issues
                .iter()
                .any(|i| matches!(i, ValidationIssue::TooLarge { .. }))
        );
    }

    #[test]
    fn unsupported_image_type() {
        let report = validate(&input("image/tiff", 100), 10.0);
        assert_eq!(
            report.issues,
            vec![ValidationIssue::UnsupportedFormat {
                media_type: "image/tiff".into()
            }]
        );
    }

    #[test]
    fn report_display_joins_messages() {
        let report = validate(&input("text/plain", 100), 10.0);
        assert_eq!(
            report.to_string(),
            "The file is not an image; Unsupported format. Use JPG, PNG, WebP or GIF"
        );
    }
}
