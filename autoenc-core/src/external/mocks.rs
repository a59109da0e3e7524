// autoenc-core/src/external/mocks.rs

// --- ffmpeg doubles ---

// Compiled for unit tests and when the "test-mocks" feature is enabled.

use super::{FfmpegProcess, FfmpegSpawner, FfprobeExecutor, MediaInfoExecutor, ProcessRunner};
use super::{ToolCommand, ToolOutput};
use crate::cancel::CancellationToken;
use crate::error::{CoreError, CoreResult, command_failed_error};
use crate::media::{MediaDescriptor, Track};
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::os::unix::process::ExitStatusExt; // For ExitStatus::from_raw
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::rc::Rc;

/// Creates an empty file (and its parent directories) for a mocked tool output.
fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::error!("Mock failed to create parent dir {parent:?}: {e}");
        }
    }
    match std::fs::File::create(path) {
        Ok(_) => log::debug!("Mock created dummy output file: {path:?}"),
        Err(e) => log::error!("Mock failed to create dummy output file {path:?}: {e}"),
    }
}

/// Expands an ffmpeg image sequence pattern (`%d`, `%03d`) into `count` paths.
fn expand_sequence(template: &str, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|n| {
            let name = template
                .replace("%03d", &format!("{n:03}"))
                .replace("%d", &n.to_string());
            PathBuf::from(name)
        })
        .collect()
}

/// Builds an info-level ffmpeg log event, as emitted by filters like cropdetect.
pub fn log_event(line: &str) -> FfmpegEvent {
    FfmpegEvent::Log(LogLevel::Info, line.to_string())
}

// --- ffmpeg ---

/// Scripted ffmpeg run.
#[derive(Clone)]
pub struct MockFfmpegProcess {
    /// Replayed to the handler, in order.
    pub events_to_emit: Rc<RefCell<Vec<FfmpegEvent>>>,
    /// Returned by `wait`.
    pub exit_status: ExitStatus,
    pub killed: Rc<Cell<bool>>,
}

impl FfmpegProcess for MockFfmpegProcess {
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        let events = self.events_to_emit.borrow().clone();
        for event in events {
            handler(event)?;
        }
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        Ok(self.exit_status)
    }

    fn kill(&mut self) -> CoreResult<()> {
        self.killed.set(true);
        Ok(())
    }
}

/// One queued ffmpeg call: an argument substring and the run to hand out.
pub struct MockFfmpegExpectation {
    pub arg_pattern: String,
    pub result: CoreResult<MockFfmpegProcess>,
    /// Number of files to create at the output path; sequence patterns
    /// (`%03d`) are expanded, plain paths get one file when this is non-zero.
    pub outputs_to_create: usize,
}

/// Hands out scripted runs to commands matching a queued expectation;
/// panics on a command nothing expects.
///
/// Each expectation is consumed by the first spawned command with an argument
/// containing its pattern. Unmatched commands panic.
#[derive(Clone, Default)]
pub struct MockFfmpegSpawner {
    expectations: Rc<RefCell<Vec<MockFfmpegExpectation>>>,
    received_calls: Rc<RefCell<Vec<Vec<String>>>>,
}

impl MockFfmpegSpawner {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_expectation(
        &self,
        arg_pattern: &str,
        result: CoreResult<MockFfmpegProcess>,
        outputs_to_create: usize,
    ) {
        self.expectations.borrow_mut().push(MockFfmpegExpectation {
            arg_pattern: arg_pattern.to_string(),
            result,
            outputs_to_create,
        });
    }

    fn process(events: Vec<FfmpegEvent>, exit_code: i32) -> MockFfmpegProcess {
        MockFfmpegProcess {
            events_to_emit: Rc::new(RefCell::new(events)),
            exit_status: ExitStatus::from_raw(exit_code),
            killed: Rc::new(Cell::new(false)),
        }
    }

    pub fn add_success_expectation(
        &self,
        arg_pattern: &str,
        events: Vec<FfmpegEvent>,
        outputs_to_create: usize,
    ) {
        self.add_expectation(arg_pattern, Ok(Self::process(events, 0)), outputs_to_create);
    }

    pub fn add_spawn_error_expectation(&self, arg_pattern: &str, error: CoreError) {
        self.add_expectation(arg_pattern, Err(error), 0);
    }

    /// The process runs and exits with `exit_code` (encoded as a raw wait status).
    pub fn add_exit_error_expectation(
        &self,
        arg_pattern: &str,
        events: Vec<FfmpegEvent>,
        exit_code: i32,
    ) {
        self.add_expectation(arg_pattern, Ok(Self::process(events, exit_code << 8)), 0);
    }

    pub fn get_received_calls(&self) -> Vec<Vec<String>> {
        self.received_calls.borrow().clone()
    }

    /// Number of spawned commands with an argument containing `pattern`.
    pub fn count_calls_matching(&self, pattern: &str) -> usize {
        self.received_calls
            .borrow()
            .iter()
            .filter(|args| args.iter().any(|a| a.contains(pattern)))
            .count()
    }

    pub fn remaining_expectations(&self) -> usize {
        self.expectations.borrow().len()
    }
}

impl FfmpegSpawner for MockFfmpegSpawner {
    type Process = MockFfmpegProcess;

    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        let args: Vec<String> = cmd
            .get_args()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        self.received_calls.borrow_mut().push(args.clone());

        let mut expectations = self.expectations.borrow_mut();
        let found_index = expectations
            .iter()
            .position(|exp| args.iter().any(|arg| arg.contains(&exp.arg_pattern)));

        let Some(index) = found_index else {
            panic!("MockFfmpegSpawner: No expectation found for command args: {args:?}");
        };

        let expectation = expectations.remove(index);
        log::debug!(
            "MockFfmpegSpawner: Matched expectation with pattern '{}'",
            expectation.arg_pattern
        );

        if expectation.result.is_ok() && expectation.outputs_to_create > 0 {
            match args.last() {
                Some(output) if output.contains('%') => {
                    for path in expand_sequence(output, expectation.outputs_to_create) {
                        touch(&path);
                    }
                }
                Some(output) => touch(Path::new(output)),
                None => log::warn!("MockFfmpegSpawner couldn't find output path in args"),
            }
        }

        expectation.result
    }
}

// --- ffprobe ---

/// Returns registered descriptors by path.
#[derive(Clone, Default)]
pub struct MockFfprobeExecutor {
    descriptors: Rc<RefCell<HashMap<PathBuf, MediaDescriptor>>>,
    calls: Rc<Cell<usize>>,
}

impl MockFfprobeExecutor {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn expect_descriptor(&self, input_path: &Path, descriptor: MediaDescriptor) {
        self.descriptors
            .borrow_mut()
            .insert(input_path.to_path_buf(), descriptor);
    }

    pub fn call_count(&self) -> usize {
        self.calls.get()
    }
}

impl FfprobeExecutor for MockFfprobeExecutor {
    fn get_media_descriptor(&self, input_path: &Path) -> CoreResult<MediaDescriptor> {
        self.calls.set(self.calls.get() + 1);
        self.descriptors
            .borrow()
            .get(input_path)
            .copied()
            .ok_or_else(|| {
                CoreError::VideoInfoError(format!(
                    "MockFfprobeExecutor: No expectation set for path {}",
                    input_path.display()
                ))
            })
    }
}

// --- mediainfo ---

/// Mock implementation of MediaInfoExecutor.
///
/// Bitrates are returned from a queue, one per read-back call.
#[derive(Clone, Default)]
pub struct MockMediaInfoExecutor {
    tracks: Rc<RefCell<HashMap<PathBuf, Vec<Track>>>>,
    bitrates: Rc<RefCell<VecDeque<u64>>>,
    bitrate_calls: Rc<Cell<usize>>,
}

impl MockMediaInfoExecutor {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn expect_tracks(&self, input_path: &Path, tracks: Vec<Track>) {
        self.tracks
            .borrow_mut()
            .insert(input_path.to_path_buf(), tracks);
    }

    pub fn push_bitrate(&self, kbps: u64) {
        self.bitrates.borrow_mut().push_back(kbps);
    }

    pub fn bitrate_calls(&self) -> usize {
        self.bitrate_calls.get()
    }
}

impl MediaInfoExecutor for MockMediaInfoExecutor {
    fn get_tracks(&self, input_path: &Path) -> CoreResult<Vec<Track>> {
        Ok(self
            .tracks
            .borrow()
            .get(input_path)
            .cloned()
            .unwrap_or_default())
    }

    fn get_video_bitrate_kbps(&self, input_path: &Path) -> CoreResult<u64> {
        self.bitrate_calls.set(self.bitrate_calls.get() + 1);
        self.bitrates.borrow_mut().pop_front().ok_or_else(|| {
            CoreError::VideoInfoError(format!(
                "MockMediaInfoExecutor: No bitrate queued for {}",
                input_path.display()
            ))
        })
    }
}

// --- plain processes ---

/// A command recorded by `MockProcessRunner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedRun {
    Single(ToolCommand),
    Piped(ToolCommand, ToolCommand),
}

impl RecordedRun {
    /// The command whose output matters (the consumer of a pipe).
    pub fn main_command(&self) -> &ToolCommand {
        match self {
            RecordedRun::Single(cmd) | RecordedRun::Piped(_, cmd) => cmd,
        }
    }
}

/// Mock implementation of ProcessRunner.
///
/// Every command succeeds unless a failure was registered for its program.
/// Output files named by `-o`, `--output` and mkvextract `N:path` arguments
/// are created so later stages find them.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    calls: Rc<RefCell<Vec<RecordedRun>>>,
    failures: Rc<RefCell<HashMap<String, String>>>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes every run of `program` fail with the given stderr.
    pub fn fail_program(&self, program: &str, stderr: &str) {
        self.failures
            .borrow_mut()
            .insert(program.to_string(), stderr.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedRun> {
        self.calls.borrow().clone()
    }

    /// Recorded runs whose main command is `program`.
    pub fn commands_for(&self, program: &str) -> Vec<ToolCommand> {
        self.calls
            .borrow()
            .iter()
            .map(RecordedRun::main_command)
            .filter(|cmd| cmd.program == program)
            .cloned()
            .collect()
    }

    fn outcome(&self, cmd: &ToolCommand) -> CoreResult<ToolOutput> {
        if let Some(stderr) = self.failures.borrow().get(&cmd.program) {
            return Err(command_failed_error(
                &cmd.program,
                ExitStatus::from_raw(1 << 8),
                stderr.clone(),
            ));
        }
        for path in dummy_output_paths(cmd) {
            touch(&path);
        }
        Ok(ToolOutput::default())
    }
}

fn dummy_output_paths(cmd: &ToolCommand) -> Vec<PathBuf> {
    let args = cmd.args_lossy();
    let mut paths = Vec::new();

    for (i, arg) in args.iter().enumerate() {
        if arg == "-o" || arg == "--output" {
            if let Some(next) = args.get(i + 1) {
                paths.push(PathBuf::from(next));
            }
        }
    }

    if cmd.program == "mkvextract" {
        if let Some(pos) = args.iter().position(|a| a == "tracks") {
            paths.extend(
                args[pos + 1..]
                    .iter()
                    .filter_map(|a| a.split_once(':'))
                    .map(|(_, path)| PathBuf::from(path)),
            );
        }
    }

    paths
}

impl ProcessRunner for MockProcessRunner {
    fn run(&self, cmd: &ToolCommand, token: &CancellationToken) -> CoreResult<ToolOutput> {
        token.check()?;
        self.calls
            .borrow_mut()
            .push(RecordedRun::Single(cmd.clone()));
        self.outcome(cmd)
    }

    fn run_piped(
        &self,
        producer: &ToolCommand,
        consumer: &ToolCommand,
        token: &CancellationToken,
    ) -> CoreResult<ToolOutput> {
        token.check()?;
        self.calls
            .borrow_mut()
            .push(RecordedRun::Piped(producer.clone(), consumer.clone()));
        self.outcome(producer)?;
        self.outcome(consumer)
    }
}
