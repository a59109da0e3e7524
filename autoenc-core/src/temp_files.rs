//! Temporary file management utilities.
//!
//! This module provides helper functions for creating and managing the
//! per-run scratch area. It leverages the tempfile crate to handle automatic
//! cleanup via the Drop trait, ensuring proper cleanup even in error cases.

use crate::config::CoreConfig;
use crate::error::CoreResult;
use std::path::{Path, PathBuf};
use tempfile::{Builder as TempFileBuilder, TempDir};

/// Creates a uniquely named scratch directory for one pipeline run. Auto-cleaned when dropped.
///
/// Concurrent runs never share a directory, so stale tracks or probe outputs
/// from another run cannot leak into this one.
pub fn create_temp_dir(config: &CoreConfig, prefix: &str) -> CoreResult<TempDir> {
    let temp_base_dir = config.temp_dir.as_ref().unwrap_or(&config.output_dir);
    std::fs::create_dir_all(temp_base_dir)?;

    Ok(TempFileBuilder::new()
        .prefix(prefix)
        .tempdir_in(temp_base_dir)?)
}

/// Creates (if needed) and returns a named subdirectory of the scratch area.
pub fn scratch_subdir(scratch: &Path, name: &str) -> CoreResult<PathBuf> {
    let dir = scratch.join(name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns a temporary file path with random suffix. Does not create the file.
pub fn create_temp_file_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    use rand::Rng;
    use rand::distr::Alphanumeric;

    let random_suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    let filename = format!("{prefix}_{random_suffix}.{extension}");
    dir.join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_temp_dir_is_unique_per_call() {
        let base = tempfile::tempdir().unwrap();
        let mut config = CoreConfig::default();
        config.temp_dir = Some(base.path().to_path_buf());

        let first = create_temp_dir(&config, "autoenc_").unwrap();
        let second = create_temp_dir(&config, "autoenc_").unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(base.path()));
    }

    #[test]
    fn test_temp_file_path_shape() {
        let path = create_temp_file_path(Path::new("/tmp/x"), "frame", "png");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("frame_"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "frame_".len() + 6 + ".png".len());
    }
}
