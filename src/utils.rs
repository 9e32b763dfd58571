use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Result, TransportError};

pub fn get_filename_from_url(url_str: &str) -> Result<String> {
    let url = Url::parse(url_str).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url_str, e)))?;

    if let Some(segments) = url.path_segments() {
        if let Some(filename) = segments.last() {
            if !filename.is_empty() {
                return Ok(filename.to_string());
            }
        }
    }

    // Fallback if no filename found in path
    Ok(format!("download_{}", uuid::Uuid::new_v4()))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

pub fn get_unique_filepath(dir: &Path, filename: &str) -> PathBuf {
    let mut path = dir.join(filename);
    let mut counter = 1;

    let base = Path::new(filename);
    let file_stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let extension = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    while path.exists() {
        let new_filename = if extension.is_empty() {
            format!("{}_{}", file_stem, counter)
        } else {
            format!("{}_{}.{}", file_stem, counter, extension)
        };

        path = dir.join(new_filename);
        counter += 1;
    }
    path
}

/// `<file>.part` for the bytes in flight and `<file>.part.json` for the
/// checkpoint next to it.
pub fn part_paths(filepath: &Path) -> (PathBuf, PathBuf) {
    let mut part_filepath = filepath.to_path_buf();
    if let Some(extension) = filepath.extension() {
        let mut ext = extension.to_os_string();
        ext.push(".part");
        part_filepath.set_extension(ext);
    } else {
        part_filepath.set_extension("part");
    }
    let state_filepath = part_filepath.with_extension("part.json");
    (part_filepath, state_filepath)
}

/// Checkpoint location for a resumable upload of `filepath`.
pub fn upload_checkpoint_path(filepath: &Path) -> PathBuf {
    let mut name = filepath
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".upload.json");
    filepath.with_file_name(name)
}
