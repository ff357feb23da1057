//! Collect image files from command-line paths.
//!
//! Files are taken as given, whatever their extension, so the validator can
//! report on them. Directories are walked recursively and contribute only
//! files with a supported image extension, in sorted order.

use crate::types::{RawImageInput, SUPPORTED_EXTENSIONS};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Expand `paths` into a list of files.
pub fn collect_image_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file() && has_supported_extension(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            out.extend(found);
        } else {
            out.push(path.clone());
        }
    }
    out
}

/// Read every path into a [`RawImageInput`], keeping read errors per file.
pub fn load_inputs(paths: &[PathBuf]) -> Vec<(PathBuf, std::io::Result<RawImageInput>)> {
    paths
        .iter()
        .map(|p| (p.clone(), RawImageInput::from_path(p)))
        .collect()
}
