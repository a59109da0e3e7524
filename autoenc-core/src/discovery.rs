//! File discovery module for finding video files to process.
//!
//! Searches the top level of a directory (no recursion) for files with a known
//! video container extension, compared case-insensitively.

use crate::error::{CoreError, CoreResult};

use std::path::{Path, PathBuf};

/// Container extensions accepted for batch input.
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "m2ts", "ts", "avi", "mov", "webm"];

/// Whether `path` has one of the `VIDEO_EXTENSIONS`.
#[must_use]
pub fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)))
}

/// Finds video files eligible for processing in the specified directory.
///
/// Results are sorted by path so batch order is stable between runs.
///
/// # Errors
///
/// * `CoreError::Io` - If the directory cannot be read
/// * `CoreError::NoFilesFound` - If no video files are found
///
/// # Examples
///
/// ```rust,no_run
/// use autoenc_core::find_processable_files;
/// use std::path::Path;
///
/// let files = find_processable_files(Path::new("/path/to/videos")).unwrap();
/// println!("Found {} video files", files.len());
/// ```
pub fn find_processable_files(input_dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let read_dir = std::fs::read_dir(input_dir)?;
    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            (path.is_file() && has_video_extension(&path)).then_some(path)
        })
        .collect();

    if files.is_empty() {
        return Err(CoreError::NoFilesFound);
    }

    files.sort();
    Ok(files)
}
