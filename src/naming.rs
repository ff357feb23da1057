//! Unique, storage-safe names for uploaded images.
//!
//! Every asset gets a [`NamedAsset`] built from the original filename, the
//! current Unix time in milliseconds and a 6-character base36 random suffix.
//! Two renderings exist:
//!
//! - [`NamedAsset::filename`]: `{base}-{millis}-{suffix}.{ext}`, the name the
//!   client sends with the upload.
//! - [`NamedAsset::storage_key`]: `{prefix}{millis}-{suffix}-{base}.{ext}`, the
//!   object key scheme the storage gateway uses (`productos/…`).
//!
//! ## Sanitizing
//!
//! The base name is lowercased, every character outside `[a-z0-9]` becomes a
//! hyphen, hyphen runs collapse to one, leading and trailing hyphens are
//! dropped, and the result is cut to 30 characters:
//! - `My Photo!!.JPG` → `my-photo` + `jpg`
//! - `Sofá  Cama.png` → `sof-cama` + `png`
//! - `!!!.webp` → `image` + `webp` (empty bases get a placeholder)
//!
//! A name without an extension takes the configured fallback extension and
//! logs a warning.
//!
//! ## Collisions
//!
//! Uniqueness rests only on timestamp + random suffix (36⁶ ≈ 2.2 billion
//! values per millisecond). Nothing checks storage for an existing key and
//! nothing retries, so two uploads in the same millisecond with the same base
//! name *can* collide. That is a known non-guarantee, acceptable at catalog
//! upload rates.

use rand::Rng;
use tracing::warn;

/// Longest sanitized base name kept.
pub const MAX_BASE_LEN: usize = 30;
/// Length of the random suffix.
pub const SUFFIX_LEN: usize = 6;
/// Object key prefix used by the storage gateway.
pub const DEFAULT_PATH_PREFIX: &str = "productos/";
/// Extension used when the original name has none.
pub const DEFAULT_FALLBACK_EXTENSION: &str = "webp";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const EMPTY_BASE: &str = "image";

/// The parts of a generated name. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedAsset {
    pub path_prefix: String,
    pub timestamp: i64,
    pub random_suffix: String,
    pub base_name: String,
    pub extension: String,
}

impl NamedAsset {
    /// Client-side filename: `{base}-{millis}-{suffix}.{ext}`.
    pub fn filename(&self) -> String {
        format!(
            "{}-{}-{}.{}",
            self.base_name, self.timestamp, self.random_suffix, self.extension
        )
    }

    /// Storage object key: `{prefix}{millis}-{suffix}-{base}.{ext}`.
    pub fn storage_key(&self) -> String {
        format!(
            "{}{}-{}-{}.{}",
            self.path_prefix, self.timestamp, self.random_suffix, self.base_name, self.extension
        )
    }
}

/// Name generator carrying the configured prefix and fallback extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namer {
    path_prefix: String,
    fallback_extension: String,
}

impl Default for Namer {
    fn default() -> Self {
        Self::new(DEFAULT_PATH_PREFIX, DEFAULT_FALLBACK_EXTENSION)
    }
}

impl Namer {
    pub fn new(path_prefix: impl Into<String>, fallback_extension: impl Into<String>) -> Self {
        let fallback: String = fallback_extension.into();
        let fallback = sanitize_extension(&fallback)
            .unwrap_or_else(|| DEFAULT_FALLBACK_EXTENSION.to_string());
        Self {
            path_prefix: path_prefix.into(),
            fallback_extension: fallback,
        }
    }

    /// Name an asset after `original`, keeping its extension.
    pub fn name(&self, original: &str) -> NamedAsset {
        self.compose(original, None, now_millis(), random_suffix())
    }

    /// Name an asset after `original` but with `extension`, used when the
    /// payload was re-encoded into a different format.
    pub fn name_with_extension(&self, original: &str, extension: &str) -> NamedAsset {
        self.compose(original, Some(extension), now_millis(), random_suffix())
    }

    /// Assemble a name from explicit parts.
    pub fn compose(
        &self,
        original: &str,
        extension: Option<&str>,
        timestamp: i64,
        random_suffix: String,
    ) -> NamedAsset {
        let (stem, original_ext) = split_extension(original);
        let extension = extension
            .and_then(sanitize_extension)
            .or_else(|| original_ext.as_deref().and_then(sanitize_extension))
            .unwrap_or_else(|| {
                warn!(
                    name = original,
                    fallback = %self.fallback_extension,
                    "filename has no extension, using fallback"
                );
                self.fallback_extension.clone()
            });

        NamedAsset {
            path_prefix: self.path_prefix.clone(),
            timestamp,
            random_suffix,
            base_name: sanitize_base_name(stem),
            extension,
        }
    }
}

/// `{base}-{millis}-{suffix}.{ext}` for `original`, with default settings.
///
/// ```
/// # use catalog_images::naming::generate_unique_filename;
/// let name = generate_unique_filename("My Photo!!.JPG");
/// assert!(name.starts_with("my-photo-"));
/// assert!(name.ends_with(".jpg"));
/// ```
pub fn generate_unique_filename(original: &str) -> String {
    Namer::default().name(original).filename()
}

/// `productos/{millis}-{suffix}-{base}.{ext}` for `original`, with default settings.
pub fn generate_storage_key(original: &str) -> String {
    Namer::default().name(original).storage_key()
}

/// Split at the last `.` into stem and lowercased extension.
///
/// A name with no dot, or ending in a dot, has no extension.
pub fn split_extension(name: &str) -> (&str, Option<String>) {
    match name.rfind('.') {
        Some(pos) if pos + 1 < name.len() => {
            (&name[..pos], Some(name[pos + 1..].to_lowercase()))
        }
        Some(pos) => (&name[..pos], None),
        None => (name, None),
    }
}

/// Lowercase, hyphenate, collapse, trim and truncate a base name.
pub fn sanitize_base_name(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    for c in stem.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }

    // Only ASCII remains, so byte truncation is char-safe
    let trimmed = out.trim_matches('-');
    let cut = &trimmed[..trimmed.len().min(MAX_BASE_LEN)];
    let cut = cut.trim_end_matches('-');

    if cut.is_empty() {
        EMPTY_BASE.to_string()
    } else {
        cut.to_string()
    }
}

fn sanitize_extension(ext: &str) -> Option<String> {
    let clean: String = ext
        .trim_start_matches('.')
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    (!clean.is_empty()).then_some(clean)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Six random base36 characters.
pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_base36(s: &str) -> bool {
        s.len() == SUFFIX_LEN && s.bytes().all(|b| BASE36.contains(&b))
    }

    // =========================================================================
    // Rendered names
    // =========================================================================

    #[test]
    fn unique_filename_shape() {
        let name = generate_unique_filename("My Photo!!.JPG");
        let rest = name.strip_prefix("my-photo-").unwrap();
        let (stamp_and_suffix, ext) = rest.rsplit_once('.').unwrap();
        assert_eq!(ext, "jpg");
        let (stamp, suffix) = stamp_and_suffix.split_once('-').unwrap();
        assert!(!stamp.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()));
        assert!(is_base36(suffix), "suffix {suffix}");
    }

    #[test]
    fn storage_key_shape() {
        let key = generate_storage_key("Mesa Roble.png");
        let rest = key.strip_prefix("productos/").unwrap();
        assert!(rest.ends_with("-mesa-roble.png"), "{key}");
        let stamp = rest.split('-').next().unwrap();
        assert!(stamp.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn compose_is_deterministic_given_parts() {
        let namer = Namer::new("productos/", "webp");
        let asset = namer.compose("Silla Nórdica.JPEG", None, 1_700_000_000_000, "a1b2c3".into());
        assert_eq!(asset.base_name, "silla-n-rdica");
        assert_eq!(asset.extension, "jpeg");
        assert_eq!(asset.filename(), "silla-n-rdica-1700000000000-a1b2c3.jpeg");
        assert_eq!(
            asset.storage_key(),
            "productos/1700000000000-a1b2c3-silla-n-rdica.jpeg"
        );
    }

    #[test]
    fn explicit_extension_overrides_original() {
        let asset = Namer::default().name_with_extension("sofa.JPG", "webp");
        assert_eq!(asset.extension, "webp");
        assert_eq!(asset.base_name, "sofa");
    }

    #[test]
    fn missing_extension_uses_fallback() {
        let asset = Namer::default().name("photo");
        assert_eq!(asset.extension, "webp");
        assert!(asset.filename().ends_with(".webp"));
        assert!(!asset.filename().ends_with('.'));
    }

    #[test]
    fn trailing_dot_uses_fallback() {
        let asset = Namer::new("", "png").name("photo.");
        assert_eq!(asset.base_name, "photo");
        assert_eq!(asset.extension, "png");
    }

    #[test]
    fn invalid_fallback_reverts_to_default() {
        let asset = Namer::new("", "...").name("photo");
        assert_eq!(asset.extension, DEFAULT_FALLBACK_EXTENSION);
    }

    #[test]
    fn names_differ_between_calls() {
        let a = generate_unique_filename("a.jpg");
        let b = generate_unique_filename("a.jpg");
        assert_ne!(a, b);
    }

    // =========================================================================
    // Parsing helpers
    // =========================================================================

    #[test]
    fn split_extension_last_dot() {
        assert_eq!(split_extension("a.b.PNG"), ("a.b", Some("png".into())));
        assert_eq!(split_extension("noext"), ("noext", None));
        assert_eq!(split_extension("trailing."), ("trailing", None));
        assert_eq!(split_extension(".hidden"), ("", Some("hidden".into())));
    }

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(sanitize_base_name("My   Photo!!"), "my-photo");
        assert_eq!(sanitize_base_name("a__b--c"), "a-b-c");
    }

    #[test]
    fn sanitize_trims_edges() {
        assert_eq!(sanitize_base_name("--Hello--"), "hello");
        assert_eq!(sanitize_base_name("  (1) sofa "), "1-sofa");
    }

    #[test]
    fn sanitize_truncates_to_30() {
        let long = "a".repeat(50);
        assert_eq!(sanitize_base_name(&long).len(), MAX_BASE_LEN);
    }

    #[test]
    fn sanitize_truncation_never_ends_in_hyphen() {
        // 29 letters, then a separator at position 30
        let stem = format!("{} tail", "b".repeat(29));
        let out = sanitize_base_name(&stem);
        assert_eq!(out, "b".repeat(29));
    }

    #[test]
    fn sanitize_empty_becomes_placeholder() {
        assert_eq!(sanitize_base_name(""), "image");
        assert_eq!(sanitize_base_name("!!!"), "image");
    }

    #[test]
    fn sanitize_output_alphabet() {
        for stem in ["Über Möbel", "日本語", "a/b\\c", "Tab\tName", "MiXeD_123"] {
            let out = sanitize_base_name(stem);
            assert!(out.len() <= MAX_BASE_LEN);
            assert!(
                out.bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'),
                "{stem} → {out}"
            );
            assert!(!out.contains("--"));
        }
    }

    #[test]
    fn random_suffix_alphabet() {
        for _ in 0..50 {
            assert!(is_base36(&random_suffix()));
        }
    }
}
