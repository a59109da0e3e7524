// ============================================================================
// autoenc-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Error Types for the autoenc Core Library
//
// This module defines the error taxonomy used throughout the core library.
// Required pipeline stages wrap their failures in `StageFailed` so the
// operator sees which stage aborted the run; collaborator diagnostics (stderr)
// are carried verbatim and never reinterpreted.

use std::io;
use std::process::ExitStatus;
use thiserror::Error;

use crate::processing::pipeline::PipelineStage;

/// Errors raised by the desync detector.
///
/// These never abort a run: the pipeline downgrades them to a warning and
/// continues with a zero offset.
#[derive(Error, Debug)]
pub enum DesyncError {
    #[error("insufficient samples: {produced} candidate frame(s) produced around frame {anchor}")]
    InsufficientSamples { anchor: u64, produced: usize },

    #[error("could not read similarity score for {candidate}: {reason}")]
    Score { candidate: String, reason: String },
}

/// Custom error type for the core library.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Required tool not found: {0}")]
    DependencyNotFound(String),

    #[error("Failed to start {0}: {1}")]
    CommandStart(String, #[source] io::Error),

    #[error("Failed waiting for {0}: {1}")]
    CommandWait(String, #[source] io::Error),

    #[error("{tool} exited with {status}:\n{stderr}")]
    CommandFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("ffprobe parse error: {0}")]
    FfprobeParse(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Video info error: {0}")]
    VideoInfoError(String),

    #[error("Crop detection failed: {0}")]
    CropDetection(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("No processable video files found")]
    NoFilesFound,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: PipelineStage,
        #[source]
        source: Box<CoreError>,
    },

    #[error(transparent)]
    Desync(#[from] DesyncError),

    #[error("{0}")]
    OperationFailed(String),
}

impl CoreError {
    /// Wraps this error as a failure of the given pipeline stage.
    ///
    /// Cancellation is passed through untouched so callers can still match on it.
    pub fn in_stage(self, stage: PipelineStage) -> CoreError {
        match self {
            CoreError::Cancelled | CoreError::StageFailed { .. } => self,
            other => CoreError::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Returns the stage that failed, if this error was raised by a pipeline stage.
    pub fn failed_stage(&self) -> Option<PipelineStage> {
        match self {
            CoreError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Builds a `CommandStart` error for a tool that could not be spawned.
pub fn command_start_error(tool: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandStart(tool.into(), err)
}

/// Builds a `CommandWait` error for a tool whose exit status could not be read.
pub fn command_wait_error(tool: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandWait(tool.into(), err)
}

/// Builds a `CommandFailed` error carrying the tool's stderr verbatim.
pub fn command_failed_error(
    tool: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed {
        tool: tool.into(),
        status,
        stderr: stderr.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = CoreError::VideoInfoError("no video stream".to_string())
            .in_stage(PipelineStage::Probe)
            .in_stage(PipelineStage::Encode);

        assert_eq!(err.failed_stage(), Some(PipelineStage::Probe));
        assert!(err.to_string().contains("no video stream"));
    }

    #[test]
    fn test_cancelled_is_not_wrapped() {
        let err = CoreError::Cancelled.in_stage(PipelineStage::Mux);
        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(err.failed_stage(), None);
    }
}
