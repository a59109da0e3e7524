// ============================================================================
// autoenc-core/src/external/ffmpeg_executor.rs
// ============================================================================
//
// FFMPEG EXECUTOR: FFmpeg Process Management and Abstraction
//
// Traits for spawning and interacting with ffmpeg processes, the
// ffmpeg-sidecar implementation, and `run_ffmpeg`, which every ffmpeg-backed
// stage (crop detection, frame extraction, PSNR scoring, screenshots) goes
// through.

use crate::cancel::CancellationToken;
use crate::error::{
    CoreError, CoreResult, command_failed_error, command_start_error, command_wait_error,
};
use ffmpeg_sidecar::child::FfmpegChild as SidecarChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use std::process::ExitStatus;

// --- Spawning seam ---

/// A running ffmpeg.
pub trait FfmpegProcess {
    /// Feeds every parsed event to `handler` until the process closes its output.
    fn handle_events<F>(&mut self, handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>;

    /// Blocks until exit.
    fn wait(&mut self) -> CoreResult<ExitStatus>;

    /// Terminates the process.
    fn kill(&mut self) -> CoreResult<()>;
}

/// Starts ffmpeg commands. Swapped for a scripted double in tests.
pub trait FfmpegSpawner {
    type Process: FfmpegProcess;
    /// Starts `cmd`.
    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process>;
}

// --- ffmpeg-sidecar backend ---

/// Wrapper around `ffmpeg_sidecar::child::FfmpegChild` implementing `FfmpegProcess`.
pub struct SidecarProcess(SidecarChild);

impl FfmpegProcess for SidecarProcess {
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        let iterator = self.0.iter().map_err(|e| {
            log::error!("Failed to get ffmpeg event iterator: {e}");
            CoreError::OperationFailed(format!("ffmpeg event stream unavailable: {e}"))
        })?;
        for event in iterator {
            handler(event)?;
        }
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        self.0.wait().map_err(|e| command_wait_error("ffmpeg", e))
    }

    fn kill(&mut self) -> CoreResult<()> {
        self.0.kill().map_err(|e| command_wait_error("ffmpeg", e))
    }
}

/// Spawns real ffmpeg processes through `ffmpeg-sidecar`.
#[derive(Debug, Clone, Default)]
pub struct SidecarSpawner;

impl FfmpegSpawner for SidecarSpawner {
    type Process = SidecarProcess;

    fn spawn(&self, mut cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        cmd.spawn()
            .map(SidecarProcess)
            .map_err(|e| command_start_error("ffmpeg", e))
    }
}

/// Runs an ffmpeg command to completion and returns its log lines.
///
/// Log and error lines are collected in order so callers can scrape filter
/// output (`cropdetect`, `psnr`). A non-zero exit becomes `CommandFailed`
/// carrying the collected lines as stderr. The token is polled for every
/// event; cancellation kills the child.
pub fn run_ffmpeg<S: FfmpegSpawner>(
    spawner: &S,
    cmd: FfmpegCommand,
    token: &CancellationToken,
) -> CoreResult<Vec<String>> {
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    log::debug!("Running: ffmpeg {}", args.join(" "));

    let mut process = spawner.spawn(cmd)?;
    let mut lines = Vec::new();

    let events = process.handle_events(|event| {
        token.check()?;
        match event {
            FfmpegEvent::Log(_, line) => lines.push(line),
            FfmpegEvent::Error(line) => lines.push(line),
            _ => {}
        }
        Ok(())
    });

    if let Err(e) = events {
        if matches!(e, CoreError::Cancelled) {
            log::debug!("Cancellation requested, stopping ffmpeg");
            process.kill()?;
            let _ = process.wait();
        }
        return Err(e);
    }

    let status = process.wait()?;
    token.check()?;
    if !status.success() {
        return Err(command_failed_error("ffmpeg", status, lines.join("\n")));
    }

    Ok(lines)
}
