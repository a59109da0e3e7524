// ============================================================================
// autoenc-core/src/processing/pipeline.rs
// ============================================================================
//
// PIPELINE: Per-File Orchestration
//
// A run moves through a fixed sequence of states. Each stage receives the
// current `PipelineContext` and returns a new one. Required stages abort the
// run with `CoreError::StageFailed`; the desync check and the screenshots are
// diagnostic and only warn.
//
// KEY COMPONENTS:
// - PipelineStage / PipelineState: stage names and run progress
// - PipelineContext: immutable value threaded through the stages
// - Pipeline: owns the collaborators and runs one file
// - process_videos: sequential batch over many files

use crate::cancel::CancellationToken;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegSpawner, FfprobeExecutor, MediaInfoExecutor, ProcessRunner};
use crate::media::{MediaDescriptor, TrackSet};
use crate::processing::crop_detection::{CropBox, CropDetectionSettings, detect_crop};
use crate::processing::desync::{DesyncDetector, DesyncOutcome};
use crate::processing::encode::{
    FrameServerScript, ProbeWindow, X264Settings, encode, format_quality, ref_frames_for_width,
};
use crate::processing::rate_match::{RateMatch, RateMatcher};
use crate::processing::screenshots::{ScreenshotRequest, ScreenshotSet, take_screenshots};
use crate::processing::tracks::{ExtractedTrack, extract_tracks, mux_tracks};
use crate::temp_files::{create_temp_dir, create_temp_file_path, scratch_subdir};
use crate::terminal::{print_processing, print_status, print_success, print_warning};
use crate::utils::{
    calculate_size_reduction, format_bytes, format_elapsed, get_file_size, get_file_stem_safe,
    get_filename_safe,
};

use console::style;
use log::{debug, error, info};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A step of the pipeline, named in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Probe,
    Crop,
    InspectTracks,
    ExtractTracks,
    RateMatch,
    Encode,
    Mux,
    DesyncCheck,
    Screenshots,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Probe => "probe",
            PipelineStage::Crop => "crop detection",
            PipelineStage::InspectTracks => "track inspection",
            PipelineStage::ExtractTracks => "track extraction",
            PipelineStage::RateMatch => "rate match",
            PipelineStage::Encode => "encode",
            PipelineStage::Mux => "mux",
            PipelineStage::DesyncCheck => "desync check",
            PipelineStage::Screenshots => "screenshots",
        };
        f.write_str(name)
    }
}

/// Progress of a run. Variants are declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Init,
    Probed,
    Cropped,
    TracksInspected,
    TracksExtracted,
    /// Only entered when a target bitrate was requested
    RateMatched,
    Encoded,
    Muxed,
    DesyncChecked,
    /// Only entered when screenshots are enabled
    ScreenshotsTaken,
    Done,
}

/// State of one run. Stages never mutate a context; each `with_*` call
/// consumes it and returns the next one.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    input: PathBuf,
    output: PathBuf,
    state: PipelineState,
    descriptor: Option<MediaDescriptor>,
    crop: CropBox,
    script: Option<PathBuf>,
    tracks: TrackSet,
    extracted: Vec<ExtractedTrack>,
    quality: f64,
    rate_match: Option<RateMatch>,
    encoded: Option<PathBuf>,
    desync: Option<DesyncOutcome>,
    screenshots: ScreenshotSet,
}

impl PipelineContext {
    pub fn new(input: &Path, output: &Path, quality: f64) -> Self {
        Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            state: PipelineState::Init,
            descriptor: None,
            crop: CropBox::NONE,
            script: None,
            tracks: TrackSet::default(),
            extracted: Vec::new(),
            quality,
            rate_match: None,
            encoded: None,
            desync: None,
            screenshots: ScreenshotSet::default(),
        }
    }

    #[must_use]
    pub fn with_descriptor(self, descriptor: MediaDescriptor) -> Self {
        Self {
            state: PipelineState::Probed,
            descriptor: Some(descriptor),
            ..self
        }
    }

    /// Records the crop box and the frame-server script generated for it.
    #[must_use]
    pub fn with_crop(self, crop: CropBox, script: PathBuf) -> Self {
        Self {
            state: PipelineState::Cropped,
            crop,
            script: Some(script),
            ..self
        }
    }

    #[must_use]
    pub fn with_tracks(self, tracks: TrackSet) -> Self {
        Self {
            state: PipelineState::TracksInspected,
            tracks,
            ..self
        }
    }

    #[must_use]
    pub fn with_extracted(self, extracted: Vec<ExtractedTrack>) -> Self {
        Self {
            state: PipelineState::TracksExtracted,
            extracted,
            ..self
        }
    }

    /// Adopts the matched quality for the full encode.
    #[must_use]
    pub fn with_rate_match(self, rate_match: RateMatch) -> Self {
        Self {
            state: PipelineState::RateMatched,
            quality: rate_match.quality,
            rate_match: Some(rate_match),
            ..self
        }
    }

    #[must_use]
    pub fn with_encoded(self, encoded: PathBuf) -> Self {
        Self {
            state: PipelineState::Encoded,
            encoded: Some(encoded),
            ..self
        }
    }

    #[must_use]
    pub fn with_muxed(self) -> Self {
        Self {
            state: PipelineState::Muxed,
            ..self
        }
    }

    #[must_use]
    pub fn with_desync(self, desync: DesyncOutcome) -> Self {
        Self {
            state: PipelineState::DesyncChecked,
            desync: Some(desync),
            ..self
        }
    }

    #[must_use]
    pub fn with_screenshots(self, screenshots: ScreenshotSet) -> Self {
        Self {
            state: PipelineState::ScreenshotsTaken,
            screenshots,
            ..self
        }
    }

    #[must_use]
    pub fn finish(self) -> Self {
        Self {
            state: PipelineState::Done,
            ..self
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn crop(&self) -> CropBox {
        self.crop
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    pub fn extracted(&self) -> &[ExtractedTrack] {
        &self.extracted
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn desync(&self) -> Option<&DesyncOutcome> {
        self.desync.as_ref()
    }

    /// The probed descriptor; an error before the probe stage has run.
    pub fn descriptor(&self) -> CoreResult<MediaDescriptor> {
        self.descriptor
            .ok_or_else(|| out_of_order("media descriptor", self.state))
    }

    pub fn script(&self) -> CoreResult<&Path> {
        self.script
            .as_deref()
            .ok_or_else(|| out_of_order("frame-server script", self.state))
    }

    pub fn encoded(&self) -> CoreResult<&Path> {
        self.encoded
            .as_deref()
            .ok_or_else(|| out_of_order("encoded stream", self.state))
    }

    fn into_summary(
        self,
        elapsed: Duration,
        input_size: u64,
        output_size: u64,
    ) -> CoreResult<RunSummary> {
        let descriptor = self.descriptor()?;
        Ok(RunSummary {
            input: self.input,
            output: self.output,
            state: self.state,
            descriptor,
            crop: self.crop,
            quality: self.quality,
            rate_match: self.rate_match,
            desync: self.desync.unwrap_or(DesyncOutcome::InSync),
            screenshots: self.screenshots,
            elapsed,
            input_size,
            output_size,
        })
    }
}

fn out_of_order(what: &str, state: PipelineState) -> CoreError {
    CoreError::OperationFailed(format!("{what} is not available in state {state:?}"))
}

/// Result of one successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub state: PipelineState,
    pub descriptor: MediaDescriptor,
    pub crop: CropBox,
    /// Quality used for the full encode
    pub quality: f64,
    /// `None` when no target bitrate was requested
    pub rate_match: Option<RateMatch>,
    pub desync: DesyncOutcome,
    pub screenshots: ScreenshotSet,
    pub elapsed: Duration,
    pub input_size: u64,
    pub output_size: u64,
}

impl RunSummary {
    pub fn size_reduction(&self) -> u64 {
        calculate_size_reduction(self.input_size, self.output_size)
    }
}

/// Runs files through the stages with one set of collaborators.
pub struct Pipeline<'a, S, P, M, R> {
    spawner: &'a S,
    ffprobe: &'a P,
    mediainfo: &'a M,
    runner: &'a R,
    config: &'a CoreConfig,
    token: CancellationToken,
}

impl<'a, S, P, M, R> Pipeline<'a, S, P, M, R>
where
    S: FfmpegSpawner,
    P: FfprobeExecutor,
    M: MediaInfoExecutor,
    R: ProcessRunner,
{
    pub fn new(
        spawner: &'a S,
        ffprobe: &'a P,
        mediainfo: &'a M,
        runner: &'a R,
        config: &'a CoreConfig,
    ) -> Self {
        Self {
            spawner,
            ffprobe,
            mediainfo,
            runner,
            config,
            token: CancellationToken::new(),
        }
    }

    /// Uses `token` to abort runs; the caller keeps a clone to cancel with.
    #[must_use]
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        Self { token, ..self }
    }

    pub fn config(&self) -> &CoreConfig {
        self.config
    }

    /// Processes one file from probe to screenshots.
    ///
    /// # Errors
    ///
    /// `StageFailed` naming the stage when a required stage fails,
    /// `Cancelled` when the token fires, `Io` for scratch directory problems.
    pub fn run_file(&self, input: &Path, output: &Path) -> CoreResult<RunSummary> {
        let start = Instant::now();
        self.token.check()?;

        // Dropping the TempDir at the end of the run removes every scratch file.
        let scratch_dir = create_temp_dir(self.config, ".autoenc_")?;
        let scratch = scratch_dir.path();
        debug!("Scratch directory: {}", scratch.display());

        let ctx = PipelineContext::new(input, output, self.config.default_quality);

        let ctx = self.required(PipelineStage::Probe, || self.probe_source(ctx))?;
        let ctx = self.required(PipelineStage::Crop, || self.detect_crop_box(ctx, scratch))?;
        let ctx = self.required(PipelineStage::InspectTracks, || self.inspect_tracks(ctx))?;
        let ctx = self.required(PipelineStage::ExtractTracks, || self.extract(ctx, scratch))?;
        let ctx = match self.config.target_bitrate_kbps {
            Some(target) => {
                self.required(PipelineStage::RateMatch, || self.match_rate(ctx, target, scratch))?
            }
            None => {
                debug!("No target bitrate requested, skipping rate match");
                ctx
            }
        };
        let ctx = self.required(PipelineStage::Encode, || self.encode_video(ctx, scratch))?;
        let ctx = self.required(PipelineStage::Mux, || self.mux(ctx))?;
        let ctx = self.check_desync(ctx, scratch)?;
        let ctx = self.capture_screenshots(ctx)?;
        let ctx = ctx.finish();

        let input_size = get_file_size(input)?;
        let output_size = get_file_size(output)?;
        ctx.into_summary(start.elapsed(), input_size, output_size)
    }

    fn required<T>(
        &self,
        stage: PipelineStage,
        run: impl FnOnce() -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.token.check()?;
        debug!("Entering stage: {stage}");
        run().map_err(|e| e.in_stage(stage))
    }

    fn x264_settings(&self, descriptor: &MediaDescriptor, quality: f64) -> X264Settings {
        X264Settings {
            preset: self.config.encoder_preset.clone(),
            quality,
            ref_frames: ref_frames_for_width(descriptor.width),
            frame_rate: descriptor.frame_rate,
        }
    }

    fn probe_source(&self, ctx: PipelineContext) -> CoreResult<PipelineContext> {
        print_processing("Probing source");
        let descriptor = self.ffprobe.get_media_descriptor(ctx.input())?;

        print_status(
            "Resolution",
            &format!("{}x{}", descriptor.width, descriptor.height),
            false,
        );
        print_status("Frames", &descriptor.total_frames.to_string(), false);
        print_status("Frame rate", &descriptor.frame_rate.to_string(), false);
        print_status("Bit depth", &format!("{}-bit", descriptor.bit_depth), false);

        Ok(ctx.with_descriptor(descriptor))
    }

    fn detect_crop_box(&self, ctx: PipelineContext, scratch: &Path) -> CoreResult<PipelineContext> {
        let descriptor = ctx.descriptor()?;

        let crop = if self.config.autocrop_enabled() {
            print_processing("Detecting black bars");
            let settings = CropDetectionSettings {
                sample_secs: self.config.crop_sample_secs,
                threshold: self.config.crop_threshold,
            };
            detect_crop(self.spawner, ctx.input(), &descriptor, settings, &self.token)?
        } else {
            debug!("Crop detection disabled");
            CropBox::NONE
        };
        print_status("Crop", &crop.to_string(), false);

        let script = create_temp_file_path(scratch, "frameserver", "vpy");
        FrameServerScript::new(ctx.input(), crop).write_to(&script)?;
        debug!("Frame-server script: {}", script.display());

        Ok(ctx.with_crop(crop, script))
    }

    fn inspect_tracks(&self, ctx: PipelineContext) -> CoreResult<PipelineContext> {
        let tracks = TrackSet::partition(&self.mediainfo.get_tracks(ctx.input())?);
        print_status("Audio tracks", &tracks.audio.len().to_string(), false);
        print_status("Subtitles", &tracks.subtitles.len().to_string(), false);
        Ok(ctx.with_tracks(tracks))
    }

    fn extract(&self, ctx: PipelineContext, scratch: &Path) -> CoreResult<PipelineContext> {
        if !ctx.tracks().is_empty() {
            print_processing("Extracting tracks");
        }
        let extracted = extract_tracks(self.runner, ctx.input(), ctx.tracks(), scratch, &self.token)?;
        Ok(ctx.with_extracted(extracted))
    }

    fn match_rate(
        &self,
        ctx: PipelineContext,
        target_kbps: u64,
        scratch: &Path,
    ) -> CoreResult<PipelineContext> {
        let descriptor = ctx.descriptor()?;
        let script = ctx.script()?;
        let config = &self.config.rate_match;

        let window = ProbeWindow::place(
            descriptor.total_frames,
            config.probe_frames,
            config.probe_start_frame,
        );
        let probe_output = scratch.join("probe.mkv");

        print_processing(&format!("Matching target bitrate of {target_kbps} kbps"));
        debug!(
            "Probe window: frames {}..={} ({} frames)",
            window.start,
            window.end,
            window.frames()
        );

        let matcher = RateMatcher::new(target_kbps, config.clone());
        let result = matcher.search(|quality| {
            let settings = self.x264_settings(&descriptor, quality);
            encode(self.runner, script, &settings, Some(window), &probe_output, &self.token)?;
            let bitrate = self.mediainfo.get_video_bitrate_kbps(&probe_output)?;
            print_status(
                &format!("Probe crf {}", format_quality(quality)),
                &format!("{bitrate} kbps"),
                false,
            );
            Ok(bitrate)
        })?;

        print_status("Quality", &format_quality(result.quality), result.converged);
        if !result.converged {
            print_warning(&format!(
                "Bitrate search did not converge after {} probes, using crf {}",
                result.probes.len(),
                format_quality(result.quality)
            ));
        }

        Ok(ctx.with_rate_match(result))
    }

    fn encode_video(&self, ctx: PipelineContext, scratch: &Path) -> CoreResult<PipelineContext> {
        let descriptor = ctx.descriptor()?;
        let encoded = scratch.join("encoded.mkv");
        let settings = self.x264_settings(&descriptor, ctx.quality());

        print_processing(&format!(
            "Encoding with crf {} (preset {})",
            format_quality(settings.quality),
            settings.preset
        ));
        encode(self.runner, ctx.script()?, &settings, None, &encoded, &self.token)?;

        Ok(ctx.with_encoded(encoded))
    }

    fn mux(&self, ctx: PipelineContext) -> CoreResult<PipelineContext> {
        let descriptor = ctx.descriptor()?;
        print_processing("Muxing output");

        if let Some(parent) = ctx.output().parent() {
            std::fs::create_dir_all(parent)?;
        }
        mux_tracks(
            self.runner,
            ctx.encoded()?,
            descriptor.frame_rate,
            ctx.extracted(),
            ctx.output(),
            &self.token,
        )?;

        Ok(ctx.with_muxed())
    }

    /// Diagnostic: any failure other than cancellation becomes `Unavailable`.
    fn check_desync(&self, ctx: PipelineContext, scratch: &Path) -> CoreResult<PipelineContext> {
        self.token.check()?;
        debug!("Entering stage: {}", PipelineStage::DesyncCheck);
        print_processing("Checking frame alignment");

        let attempt = || -> CoreResult<i64> {
            let descriptor = ctx.descriptor()?;
            let work_dir = scratch_subdir(scratch, "Sync")?;
            DesyncDetector::new(self.config.desync.clone()).detect(
                self.spawner,
                ctx.input(),
                ctx.output(),
                ctx.crop(),
                (descriptor.width, descriptor.height),
                descriptor.total_frames,
                &work_dir,
                &self.token,
            )
        };

        let outcome = match attempt() {
            Ok(offset) => DesyncOutcome::from_offset(offset),
            Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
            Err(e) => {
                print_warning(&format!("{} failed: {e}", PipelineStage::DesyncCheck));
                DesyncOutcome::Unavailable(e.to_string())
            }
        };
        print_status(
            "Desync",
            &outcome.to_string(),
            outcome == DesyncOutcome::InSync,
        );

        Ok(ctx.with_desync(outcome))
    }

    /// Diagnostic: failures are logged and the run completes without them.
    fn capture_screenshots(&self, ctx: PipelineContext) -> CoreResult<PipelineContext> {
        let count = self.config.screenshot_count;
        if count == 0 {
            debug!("Screenshots disabled");
            return Ok(ctx);
        }
        self.token.check()?;
        debug!("Entering stage: {}", PipelineStage::Screenshots);
        print_processing(&format!("Taking {count} screenshots"));

        let attempt = || -> CoreResult<ScreenshotSet> {
            let descriptor = ctx.descriptor()?;
            let dir = screenshot_dir(self.config, ctx.input())?;
            let request = ScreenshotRequest {
                source: ctx.input(),
                encoded: ctx.output(),
                crop: ctx.crop(),
                source_size: (descriptor.width, descriptor.height),
                total_frames: descriptor.total_frames,
                desync: ctx.desync().map_or(0, DesyncOutcome::offset),
                count,
            };
            let shots = take_screenshots(self.spawner, &request, &dir, &self.token)?;
            print_status("Screenshots", &dir.display().to_string(), false);
            Ok(shots)
        };

        match attempt() {
            Ok(shots) => Ok(ctx.with_screenshots(shots)),
            Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
            Err(e) => {
                print_warning(&format!("{} failed: {e}", PipelineStage::Screenshots));
                Ok(ctx)
            }
        }
    }
}

/// Screenshot directory for `input`: `<screenshot_dir>/<stem>` when one is
/// configured, otherwise `<output_dir>/<stem>_screenshots`.
pub fn screenshot_dir(config: &CoreConfig, input: &Path) -> CoreResult<PathBuf> {
    let stem = get_file_stem_safe(input)?;
    Ok(match &config.screenshot_dir {
        Some(dir) => dir.join(stem),
        None => config.output_dir.join(format!("{stem}_screenshots")),
    })
}

/// Output path for `input`.
///
/// An override with an extension names the output of a single-file run;
/// otherwise the output is `<output_dir>/<input stem>.mkv`.
pub fn resolve_output_path(
    config: &CoreConfig,
    input: &Path,
    target_filename_override: Option<&Path>,
    batch_len: usize,
) -> CoreResult<PathBuf> {
    match target_filename_override {
        Some(target) if batch_len == 1 && target.extension().is_some() => {
            Ok(config.output_dir.join(target))
        }
        _ => Ok(config
            .output_dir
            .join(format!("{}.mkv", get_file_stem_safe(input)?))),
    }
}

/// Outcome of a batch: one entry per input file.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<RunSummary>,
    pub failed: Vec<(PathBuf, CoreError)>,
    /// Inputs whose output already existed
    pub skipped: Vec<PathBuf>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.skipped.len()
    }
}

/// Processes `files` one after another.
///
/// A failing file is logged and recorded; the batch moves on. Only
/// cancellation stops the batch early.
pub fn process_videos<S, P, M, R>(
    pipeline: &Pipeline<'_, S, P, M, R>,
    files_to_process: &[PathBuf],
    target_filename_override: Option<&Path>,
) -> CoreResult<BatchReport>
where
    S: FfmpegSpawner,
    P: FfprobeExecutor,
    M: MediaInfoExecutor,
    R: ProcessRunner,
{
    let mut report = BatchReport::default();

    for input_path in files_to_process {
        let filename = get_filename_safe(input_path)?;

        // ========================================================================
        // STEP 1: DETERMINE OUTPUT PATH
        // ========================================================================

        let output_path = resolve_output_path(
            pipeline.config(),
            input_path,
            target_filename_override,
            files_to_process.len(),
        )?;

        if output_path.exists() {
            error!(
                "Output file already exists: {}. Skipping encode.",
                output_path.display()
            );
            report.skipped.push(input_path.clone());
            info!("----------------------------------------");
            continue;
        }

        info!(
            "{} {}",
            style("Processing:").cyan().bold(),
            style(&filename).yellow()
        );

        // ========================================================================
        // STEP 2: RUN THE PIPELINE
        // ========================================================================

        match pipeline.run_file(input_path, &output_path) {
            Ok(summary) => {
                print_success(&format!(
                    "Completed: {} in {}",
                    filename,
                    format_elapsed(summary.elapsed)
                ));
                print_status("Output", &summary.output.display().to_string(), false);
                print_status(
                    "Size",
                    &format!(
                        "{} -> {} (reduced by {}%)",
                        format_bytes(summary.input_size),
                        format_bytes(summary.output_size),
                        summary.size_reduction()
                    ),
                    false,
                );
                print_status("Quality", &format_quality(summary.quality), false);
                print_status("Desync", &summary.desync.to_string(), false);
                print_status(
                    "Screenshots",
                    &summary.screenshots.len().to_string(),
                    false,
                );
                report.completed.push(summary);
            }
            Err(CoreError::Cancelled) => {
                error!("Cancelled while processing {filename}");
                return Err(CoreError::Cancelled);
            }
            Err(e) => {
                error!("Encode failed for {filename}: {e}");
                report.failed.push((input_path.clone(), e));
            }
        }

        info!("----------------------------------------");
    }

    Ok(report)
}
