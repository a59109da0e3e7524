// ============================================================================
// autoenc-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: Console and Run-Log Dispatch
//
// Library code logs through the `log` facade. This module installs a `fern`
// dispatcher with two outputs:
// - the console, message only, at info level (debug with --verbose)
// - an optional run log file with timestamps, levels and targets at debug
//   level, with terminal styling stripped

use crate::config::LOG_FILE_PREFIX;
use crate::error::{CliErrorContext, CliResult};

use log::LevelFilter;
use std::path::{Path, PathBuf};

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
///
/// # Example
/// ```
/// let log_filename = format!("autoenc_run_{}.log", autoenc::logging::get_timestamp());
/// assert!(log_filename.ends_with(".log"));
/// ```
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Path of the run log for a run starting now.
pub fn run_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!("{LOG_FILE_PREFIX}_{}.log", get_timestamp()))
}

/// Console level for the `--verbose` flag.
pub fn console_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Installs the global logger. Call once per process.
pub fn setup_logging(verbose: bool, log_file: Option<&Path>) -> CliResult<()> {
    let console = fern::Dispatch::new()
        .level(console_level(verbose))
        .format(|out, message, _record| out.finish(format_args!("{message}")))
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new()
        .level(LevelFilter::Debug)
        // ffmpeg-sidecar and other dependencies are noisy at debug level
        .level_for("ffmpeg_sidecar", LevelFilter::Warn)
        .chain(console);

    if let Some(path) = log_file {
        let file = fern::log_file(path)
            .cli_with_context(|| format!("Failed to create log file '{}'", path.display()))?;
        let file_dispatch = fern::Dispatch::new()
            .level(LevelFilter::Debug)
            .format(|out, message, record| {
                let plain = console::strip_ansi_codes(&message.to_string()).into_owned();
                out.finish(format_args!(
                    "[{} {:<5} {}] {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.target(),
                    plain
                ))
            })
            .chain(file);
        dispatch = dispatch.chain(file_dispatch);
    }

    dispatch.apply().map_err(|e| {
        autoenc_core::CoreError::OperationFailed(format!("Failed to initialise logging: {e}"))
    })
}
