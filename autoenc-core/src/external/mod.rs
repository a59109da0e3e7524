// ============================================================================
// autoenc-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with External CLI Tools
//
// Every tool the pipeline drives sits behind a trait so the core can be tested
// with mocks:
// - FfmpegSpawner / FfmpegProcess (ffmpeg-sidecar): crop detection, frame
//   extraction, PSNR scoring, screenshots
// - FfprobeExecutor (ffprobe crate): source probing
// - MediaInfoExecutor (mediainfo JSON): track inspection, bitrate read-back
// - ProcessRunner (std::process): mkvextract, mkvmerge, vspipe | x264

use crate::error::{CoreError, CoreResult};

use std::io;
use std::process::{Command, Stdio};

pub mod ffmpeg_builder;
pub mod ffmpeg_executor;
pub mod ffprobe_executor;
pub mod mediainfo_executor;
pub mod process;

#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks;

pub use ffmpeg_builder::{FfmpegCommandBuilder, VideoFilterChain};
pub use ffmpeg_executor::{FfmpegProcess, FfmpegSpawner, SidecarProcess, SidecarSpawner, run_ffmpeg};
pub use ffprobe_executor::{CrateFfprobeExecutor, FfprobeExecutor};
pub use mediainfo_executor::{CommandMediaInfoExecutor, MediaInfoExecutor};
pub use process::{ProcessRunner, StdProcessRunner, ToolCommand, ToolOutput};

/// Executables the pipeline needs, with the argument each accepts for a
/// harmless version query.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("ffmpeg", "-version"),
    ("ffprobe", "-version"),
    ("mediainfo", "--version"),
    ("mkvextract", "--version"),
    ("mkvmerge", "--version"),
    ("vspipe", "--version"),
    ("x264", "--version"),
];

/// Checks if a required external command is available and executable.
///
/// Only the ability to start the command matters; its exit status is ignored.
///
/// # Errors
///
/// * `CoreError::DependencyNotFound` - If the command is not on `PATH`
/// * `CoreError::CommandStart` - If the command exists but fails to start
pub fn check_dependency(cmd_name: &str, version_arg: &str) -> CoreResult<()> {
    let result = Command::new(cmd_name)
        .arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {cmd_name}");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{cmd_name}' not found.");
            Err(CoreError::DependencyNotFound(cmd_name.to_string()))
        }
        Err(e) => {
            log::error!("Failed to start dependency check command '{cmd_name}': {e}");
            Err(CoreError::CommandStart(cmd_name.to_string(), e))
        }
    }
}

/// Checks every tool in `REQUIRED_TOOLS`, failing on the first missing one.
pub fn check_required_tools() -> CoreResult<()> {
    REQUIRED_TOOLS
        .iter()
        .try_for_each(|(tool, arg)| check_dependency(tool, arg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dependency_reported_by_name() {
        let err = check_dependency("autoenc-no-such-tool", "--version").unwrap_err();
        match err {
            CoreError::DependencyNotFound(name) => assert_eq!(name, "autoenc-no-such-tool"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_present_dependency_accepted() {
        // `sh` exits non-zero for an unknown flag, which still counts as present
        assert!(check_dependency("sh", "--autoenc-probe").is_ok());
    }
}
