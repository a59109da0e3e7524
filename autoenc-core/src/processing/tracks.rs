// ============================================================================
// autoenc-core/src/processing/tracks.rs
// ============================================================================
//
// TRACK HANDLING: mkvextract / mkvmerge command construction and execution
//
// Audio and subtitle tracks are pulled out of the source before encoding and
// stitched back around the encoded video afterwards. Track metadata is never
// mutated; it is projected into argument vectors. Language and title flags are
// emitted only for tracks that carry them.

use crate::cancel::CancellationToken;
use crate::error::CoreResult;
use crate::external::{ProcessRunner, ToolCommand};
use crate::media::{FrameRate, Track, TrackSet};
use crate::temp_files::scratch_subdir;
use std::path::{Path, PathBuf};

/// A track paired with the scratch file it was extracted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTrack {
    pub track: Track,
    pub path: PathBuf,
}

/// mkvtoolnix exit code for "finished, but printed warnings".
pub const MKVTOOLNIX_WARNING_EXIT: i32 = 1;

/// mkvtoolnix tools report on stdout and exit 1 on warnings, 2 on errors.
fn mkvtoolnix(program: &str) -> ToolCommand {
    ToolCommand::new(program)
        .accept_warning_exit(MKVTOOLNIX_WARNING_EXIT)
        .with_stdout_diagnostics()
}

/// `mkvextract -q <input> tracks <stream_order>:<dest>`
pub fn build_extract_command(input: &Path, track: &Track, dest: &Path) -> ToolCommand {
    let mut target = std::ffi::OsString::from(format!("{}:", track.stream_order));
    target.push(dest.as_os_str());

    mkvtoolnix("mkvextract")
        .arg("-q")
        .arg(input.as_os_str())
        .arg("tracks")
        .arg(target)
}

/// Builds the final remux command.
///
/// The encoded stream carries no timing of its own, so the source frame rate
/// is stamped on it with `--default-duration`. Every extracted track follows
/// with its optional `--track-name` and `--language`.
pub fn build_mux_command(
    encoded: &Path,
    frame_rate: FrameRate,
    tracks: &[ExtractedTrack],
    output: &Path,
) -> ToolCommand {
    let mut cmd = mkvtoolnix("mkvmerge")
        .arg("-q")
        .arg("-o")
        .arg(output.as_os_str())
        .arg("--default-duration")
        .arg(frame_rate.mkvmerge_default_duration())
        .arg(encoded.as_os_str());

    for extracted in tracks {
        if let Some(title) = &extracted.track.title {
            cmd = cmd.arg("--track-name").arg(format!("0:{title}"));
        }
        if let Some(language) = &extracted.track.language {
            cmd = cmd.arg("--language").arg(format!("0:{language}"));
        }
        cmd = cmd.arg(extracted.path.as_os_str());
    }

    cmd
}

/// Extracts every audio and subtitle track into `scratch/Audio` and
/// `scratch/Subtitles`, audio first, each in container order.
pub fn extract_tracks<R: ProcessRunner>(
    runner: &R,
    input: &Path,
    tracks: &TrackSet,
    scratch: &Path,
    token: &CancellationToken,
) -> CoreResult<Vec<ExtractedTrack>> {
    let mut extracted = Vec::with_capacity(tracks.len());

    for (subdir, group) in [("Audio", &tracks.audio), ("Subtitles", &tracks.subtitles)] {
        if group.is_empty() {
            continue;
        }
        let dir = scratch_subdir(scratch, subdir)?;

        for track in group {
            token.check()?;
            let dest = dir.join(format!(
                "{}.{}",
                track.stream_order,
                track.extract_extension()
            ));
            runner.run(&build_extract_command(input, track, &dest), token)?;
            log::debug!("Extracted {} track {} to {}", track.kind, track.stream_order, dest.display());

            extracted.push(ExtractedTrack {
                track: track.clone(),
                path: dest,
            });
        }
    }

    Ok(extracted)
}

/// Remuxes the encoded stream with the extracted tracks into `output`.
pub fn mux_tracks<R: ProcessRunner>(
    runner: &R,
    encoded: &Path,
    frame_rate: FrameRate,
    tracks: &[ExtractedTrack],
    output: &Path,
    token: &CancellationToken,
) -> CoreResult<()> {
    let cmd = build_mux_command(encoded, frame_rate, tracks, output);
    runner.run(&cmd, token)?;
    Ok(())
}
