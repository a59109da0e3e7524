// autoenc-cli/src/config.rs
//
// Defines default configuration constants for the `autoenc` application that
// the core library does not own.

/// Directory created next to the input when `--output` is omitted.
pub const DEFAULT_OUTPUT_SUBDIR: &str = "encoded";

/// Prefix of the per-run log file name.
pub const LOG_FILE_PREFIX: &str = "autoenc_run";
