//! Implementation of the 'encode' subcommand.
//!
//! This module handles file discovery, output layout and configuration setup,
//! then hands the files to the autoenc-core pipeline and reports the batch.

use crate::cli::EncodeArgs;
use crate::config::DEFAULT_OUTPUT_SUBDIR;
use crate::error::{CliErrorContext, CliResult};
use crate::logging::{run_log_path, setup_logging};

use autoenc_core::config::CoreConfigBuilder;
use autoenc_core::discovery::has_video_extension;
use autoenc_core::external::{
    CommandMediaInfoExecutor, CrateFfprobeExecutor, SidecarSpawner, StdProcessRunner,
    check_required_tools,
};
use autoenc_core::processing::encode::format_quality;
use autoenc_core::terminal;
use autoenc_core::{BatchReport, CoreConfig, CoreError, Pipeline, format_bytes, format_duration};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, warn};

/// Discovers video files from input path (file or directory). Returns (files, effective_input_dir).
pub fn discover_encode_files(args: &EncodeArgs) -> CliResult<(Vec<PathBuf>, PathBuf)> {
    let input_path = args.input_path.canonicalize().map_err(|e| {
        CoreError::PathError(format!(
            "Invalid input path '{}': {}",
            args.input_path.display(),
            e
        ))
    })?;

    let metadata = fs::metadata(&input_path).map_err(|e| {
        CoreError::PathError(format!(
            "Failed to access input path '{}': {}",
            input_path.display(),
            e
        ))
    })?;

    if metadata.is_dir() {
        match autoenc_core::find_processable_files(&input_path) {
            Ok(files) => Ok((files, input_path.clone())),
            Err(CoreError::NoFilesFound) => Ok((Vec::new(), input_path.clone())),
            Err(e) => Err(e),
        }
    } else if metadata.is_file() {
        if !has_video_extension(&input_path) {
            return Err(CoreError::OperationFailed(format!(
                "Input file '{}' is not a supported video container",
                input_path.display()
            )));
        }
        let parent_dir = input_path
            .parent()
            .cli_with_context(|| {
                format!(
                    "Could not determine parent directory for file '{}'",
                    input_path.display()
                )
            })?
            .to_path_buf();
        Ok((vec![input_path], parent_dir))
    } else {
        Err(CoreError::OperationFailed(format!(
            "Input path '{}' is neither a file nor a directory",
            input_path.display()
        )))
    }
}

/// Output layout of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub output_dir: PathBuf,
    /// File name for a single-file run when `--output` names a file
    pub target_filename: Option<PathBuf>,
    pub log_dir: PathBuf,
}

/// Works out where output and logs go. Does not touch the filesystem.
///
/// `--output` with an extension names the output file of a single-file run;
/// otherwise it is the output directory.
pub fn plan_output_layout(
    args: &EncodeArgs,
    effective_input_dir: &Path,
    files_count: usize,
) -> OutputLayout {
    let requested = args
        .output
        .clone()
        .unwrap_or_else(|| effective_input_dir.join(DEFAULT_OUTPUT_SUBDIR));

    let (output_dir, target_filename) = if files_count == 1 && requested.extension().is_some() {
        let parent_dir = requested
            .parent()
            .map(Path::to_path_buf)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));
        (parent_dir, requested.file_name().map(PathBuf::from))
    } else {
        (requested, None)
    };

    let log_dir = args
        .log_dir
        .clone()
        .unwrap_or_else(|| output_dir.join("logs"));

    OutputLayout {
        output_dir,
        target_filename,
        log_dir,
    }
}

/// Creates the output and log directories of a layout.
fn create_output_directories(layout: &OutputLayout, with_log: bool) -> CliResult<()> {
    fs::create_dir_all(&layout.output_dir).map_err(|e| {
        CoreError::PathError(format!(
            "Failed to create output directory '{}': {}",
            layout.output_dir.display(),
            e
        ))
    })?;
    if with_log {
        fs::create_dir_all(&layout.log_dir).map_err(|e| {
            CoreError::PathError(format!(
                "Failed to create log directory '{}': {}",
                layout.log_dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Creates and validates CoreConfig from CLI arguments.
pub fn create_core_config(
    args: &EncodeArgs,
    effective_input_dir: PathBuf,
    layout: &OutputLayout,
) -> CliResult<CoreConfig> {
    let mut builder = CoreConfigBuilder::new()
        .input_dir(effective_input_dir)
        .output_dir(layout.output_dir.clone())
        .log_dir(layout.log_dir.clone())
        .screenshot_count(args.screenshots);

    if args.disable_autocrop {
        builder = builder.crop_mode("none");
    }
    if let Some(preset) = &args.preset {
        builder = builder.encoder_preset(preset);
    }
    if let Some(quality) = args.quality {
        builder = builder.default_quality(quality);
    }
    if let Some(target) = args.target_rate {
        builder = builder.target_bitrate_kbps(target);
    }
    if let Some(frames) = args.probe_frames {
        builder = builder.probe_frames(frames);
    }
    if let Some(probes) = args.max_probes {
        builder = builder.max_probes(probes as usize);
    }
    if let Some(dir) = &args.temp_dir {
        builder = builder.temp_dir(dir.clone());
    }
    if let Some(dir) = &args.screenshot_dir {
        builder = builder.screenshot_dir(dir.clone());
    }

    builder.build()
}

fn display_initialization_info(
    args: &EncodeArgs,
    config: &CoreConfig,
    layout: &OutputLayout,
    log_path: Option<&Path>,
    files_count: usize,
) {
    let output_display = match &layout.target_filename {
        Some(name) => layout.output_dir.join(name).display().to_string(),
        None => layout.output_dir.display().to_string(),
    };

    terminal::print_section("INITIALIZATION");
    terminal::print_status("Input", &args.input_path.display().to_string(), false);
    terminal::print_status("Output", &output_display, false);
    terminal::print_status("Files", &files_count.to_string(), false);
    terminal::print_status("Preset", &config.encoder_preset, false);
    match config.target_bitrate_kbps {
        Some(target) => terminal::print_status("Target rate", &format!("{target} kbps"), true),
        None => terminal::print_status("Quality", &format_quality(config.default_quality), false),
    }
    terminal::print_status(
        "Autocrop",
        if config.autocrop_enabled() { "enabled" } else { "disabled" },
        false,
    );
    if let Some(path) = log_path {
        terminal::print_status("Log file", &path.display().to_string(), false);
    }
}

/// Prints the per-file summary and the totals of a batch.
fn handle_encoding_results(report: &BatchReport, total_start_time: Instant) {
    terminal::print_section("Summary");

    if report.completed.is_empty() {
        warn!("No files were successfully encoded");
    } else {
        terminal::print_success(&format!(
            "Successfully encoded {} file(s)",
            report.completed.len()
        ));
    }

    for result in &report.completed {
        let name = result
            .input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        terminal::print_processing(&name);
        terminal::print_status("Time", &format_duration(result.elapsed.as_secs_f64()), false);
        terminal::print_status("Input", &format_bytes(result.input_size), false);
        terminal::print_status("Output", &format_bytes(result.output_size), true);
        terminal::print_status("Reduction", &format!("{}%", result.size_reduction()), true);
        terminal::print_status("Quality", &format_quality(result.quality), false);
        terminal::print_status("Desync", &result.desync.to_string(), false);
    }

    for (path, error) in &report.failed {
        terminal::print_warning(&format!("Failed: {} ({error})", path.display()));
    }
    for path in &report.skipped {
        terminal::print_warning(&format!("Skipped (output exists): {}", path.display()));
    }

    terminal::print_status(
        "Total time",
        &format_duration(total_start_time.elapsed().as_secs_f64()),
        true,
    );
}

/// Runs the encode command end to end with the production tools.
///
/// Returns an error when setup fails, the batch is cancelled, or any file failed.
pub fn run_encode(args: EncodeArgs, verbose: bool) -> CliResult<()> {
    let total_start_time = Instant::now();

    let (files_to_process, effective_input_dir) = discover_encode_files(&args)?;
    let layout = plan_output_layout(&args, &effective_input_dir, files_to_process.len());
    create_output_directories(&layout, !args.no_log)?;

    let log_path = (!args.no_log).then(|| run_log_path(&layout.log_dir));
    setup_logging(verbose, log_path.as_deref())?;

    let config = create_core_config(&args, effective_input_dir, &layout)?;
    display_initialization_info(&args, &config, &layout, log_path.as_deref(), files_to_process.len());
    debug!("Run started: {}", chrono::Local::now());

    if files_to_process.is_empty() {
        warn!("No processable video files found in the specified input path.");
        return Ok(());
    }

    check_required_tools()?;

    let spawner = SidecarSpawner;
    let ffprobe = CrateFfprobeExecutor::new();
    let mediainfo = CommandMediaInfoExecutor;
    let runner = StdProcessRunner;
    let pipeline = Pipeline::new(&spawner, &ffprobe, &mediainfo, &runner, &config);

    terminal::print_section("ENCODING");
    let report = autoenc_core::process_videos(
        &pipeline,
        &files_to_process,
        layout.target_filename.as_deref(),
    )?;

    handle_encoding_results(&report, total_start_time);
    debug!("Finished at: {}", chrono::Local::now());

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(CoreError::OperationFailed(format!(
            "{} of {} file(s) failed",
            report.failed.len(),
            report.total()
        )))
    }
}
