//! Pipeline configuration.
//!
//! Handles loading, validating, and merging `config.toml`. User values are
//! merged over stock defaults, so a config file only needs the keys it wants
//! to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [compression]
//! max_width = 1200          # Bounding box for resized images
//! max_height = 1200
//! quality = 0.8             # Lossy quality, (0, 1]
//! output_format = "webp"    # webp | jpeg | png
//!
//! [validation]
//! max_size_mb = 10.0        # Inputs above this are rejected before decoding
//!
//! [storage]
//! endpoint = ""             # Upload gateway URL (POST / DELETE)
//! public_base_url = ""      # Base for turning stored names into public URLs
//! timeout_secs = 60         # Whole-request timeout for uploads and deletes
//!
//! [naming]
//! path_prefix = "productos/"    # Object key prefix used by the gateway
//! fallback_extension = "webp"   # For filenames without an extension
//! ```
//!
//! Unknown keys are rejected to catch typos early. The configuration is
//! read once at startup and never mutated afterwards.

use crate::naming::{DEFAULT_FALLBACK_EXTENSION, DEFAULT_PATH_PREFIX, Namer};
use crate::types::CompressionOptions;
use crate::validate::DEFAULT_MAX_SIZE_MB;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Default bounding box, quality and output format.
    pub compression: CompressionOptions,
    /// Pre-flight input checks.
    pub validation: ValidationConfig,
    /// Storage gateway location and timeout.
    pub storage: StorageConfig,
    /// Generated filename settings.
    pub naming: NamingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub max_size_mb: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_SIZE_MB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub endpoint: String,
    pub public_base_url: String,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            public_base_url: String::new(),
            timeout_secs: 60,
        }
    }
}

/// Hosts that start like this are template values nobody replaced.
const PLACEHOLDER_HOSTS: &[&str] = &["://tu-", "://your-"];

fn is_unset(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || PLACEHOLDER_HOSTS.iter().any(|p| url.contains(p))
}

impl StorageConfig {
    /// Check that the gateway is actually configured.
    ///
    /// Only commands that talk to storage call this; compressing locally
    /// works with an empty `[storage]` table.
    pub fn check(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if is_unset(&self.endpoint) {
            problems.push("storage.endpoint is not set");
        }
        if is_unset(&self.public_base_url) {
            problems.push("storage.public_base_url is not set");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems.join("; ")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    pub path_prefix: String,
    pub fallback_extension: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            fallback_extension: DEFAULT_FALLBACK_EXTENSION.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.compression;
        if c.max_width == 0 || c.max_height == 0 {
            return Err(ConfigError::Validation(
                "compression.max_width and max_height must be non-zero".into(),
            ));
        }
        let q = c.quality.value();
        if !(q > 0.0 && q <= 1.0) {
            return Err(ConfigError::Validation(
                "compression.quality must be in (0, 1]".into(),
            ));
        }
        let max = self.validation.max_size_mb;
        if !(max.is_finite() && max > 0.0) {
            return Err(ConfigError::Validation(
                "validation.max_size_mb must be positive".into(),
            ));
        }
        if self.storage.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "storage.timeout_secs must be non-zero".into(),
            ));
        }
        let ext = &self.naming.fallback_extension;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Validation(
                "naming.fallback_extension must be alphanumeric, without a dot".into(),
            ));
        }
        Ok(())
    }

    /// Namer carrying the configured prefix and fallback extension.
    pub fn namer(&self) -> Namer {
        Namer::new(
            self.naming.path_prefix.clone(),
            self.naming.fallback_extension.clone(),
        )
    }
}

/// Stock defaults as a TOML value, the base layer for merging.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PipelineConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults if it is absent.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Catalog Images Configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Compression
# ---------------------------------------------------------------------------
[compression]
# Images larger than this box are scaled down, keeping their aspect ratio.
# Smaller images keep their size and are only re-encoded.
max_width = 1200
max_height = 1200

# Lossy quality as a fraction in (0, 1]. Ignored for PNG.
quality = 0.8

# Output encoding: "webp", "jpeg" or "png".
output_format = "webp"

# ---------------------------------------------------------------------------
# Validation
# ---------------------------------------------------------------------------
[validation]
# Inputs larger than this (in MB) are rejected before decoding.
# The storage gateway enforces its own 10MB ceiling regardless.
max_size_mb = 10.0

# ---------------------------------------------------------------------------
# Storage gateway
# ---------------------------------------------------------------------------
[storage]
# URL of the upload gateway. Receives POST (multipart, field "file")
# and DELETE (JSON body {"url": ...}).
endpoint = ""

# Public base URL of the bucket, used to turn stored names into URLs.
public_base_url = ""

# Whole-request timeout for uploads and deletes, in seconds.
timeout_secs = 60

# ---------------------------------------------------------------------------
# Naming
# ---------------------------------------------------------------------------
[naming]
# Object key prefix used by the storage gateway.
path_prefix = "productos/"

# Extension used when an original filename has none.
fallback_extension = "webp"
"##
}
