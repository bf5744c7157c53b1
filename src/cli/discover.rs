//! Locating descriptor files on disk

use std::path::{Path, PathBuf};

use querybench_core::{BenchError, BenchResult};
use walkdir::WalkDir;

/// File extensions recognised as descriptors
pub const DESCRIPTOR_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

fn is_descriptor(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DESCRIPTOR_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Expand inputs into descriptor files
///
/// Files are taken as given and must carry a descriptor extension.
/// Directories are scanned for descriptor files, descending into
/// subdirectories only when `recursive` is set. No inputs means the current
/// directory. Paths in `exclude` (e.g. the profiles file) are skipped.
pub fn collect_descriptors(
    inputs: &[PathBuf],
    recursive: bool,
    exclude: &[PathBuf],
) -> BenchResult<Vec<PathBuf>> {
    let default_input = [PathBuf::from(".")];
    let inputs = if inputs.is_empty() {
        &default_input[..]
    } else {
        inputs
    };

    let excluded: Vec<PathBuf> = exclude
        .iter()
        .filter_map(|p| p.canonicalize().ok())
        .collect();
    let is_excluded = |path: &Path| {
        path.canonicalize()
            .map(|canonical| excluded.contains(&canonical))
            .unwrap_or(false)
    };

    let mut found = Vec::new();
    for input in inputs {
        if !input.exists() {
            return Err(BenchError::MissingFile(input.clone()));
        }

        if input.is_dir() {
            let mut in_dir = Vec::new();
            let walker = WalkDir::new(input)
                .min_depth(1)
                .max_depth(if recursive { usize::MAX } else { 1 });
            for entry in walker {
                let entry = entry.map_err(std::io::Error::from)?;
                let path = entry.path();
                if entry.file_type().is_file() && is_descriptor(path) && !is_excluded(path) {
                    in_dir.push(path.to_path_buf());
                }
            }
            in_dir.sort();
            tracing::debug!(dir = %input.display(), count = in_dir.len(), "Scanned directory");
            found.extend(in_dir);
        } else if is_descriptor(input) {
            found.push(input.clone());
        } else {
            return Err(BenchError::config(format!(
                "'{}' is not a test descriptor (expected .yaml or .yml)",
                input.display()
            )));
        }
    }

    Ok(found)
}
