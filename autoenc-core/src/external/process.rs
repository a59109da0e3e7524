// ============================================================================
// autoenc-core/src/external/process.rs
// ============================================================================
//
// PROCESS RUNNER: Plain std::process execution for non-ffmpeg tools
//
// mkvextract, mkvmerge and the `vspipe | x264` encoder pair are run through
// the `ProcessRunner` trait. Commands are explicit argument vectors (no shell),
// stdout/stderr are drained on helper threads, and the child is polled so a
// cancelled token can kill it.

use crate::cancel::CancellationToken;
use crate::error::{
    CoreError, CoreResult, command_failed_error, command_start_error, command_wait_error,
};

use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<OsString>,
    /// Non-zero exit codes meaning "finished with warnings"
    pub warning_exit_codes: Vec<i32>,
    /// The tool prints its diagnostics on stdout (mkvtoolnix does)
    pub diagnostics_on_stdout: bool,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            warning_exit_codes: Vec::new(),
            diagnostics_on_stdout: false,
        }
    }

    /// Treats exit `code` as success, logging the tool's output as a warning.
    #[must_use]
    pub fn accept_warning_exit(mut self, code: i32) -> Self {
        self.warning_exit_codes.push(code);
        self
    }

    #[must_use]
    pub fn with_stdout_diagnostics(mut self) -> Self {
        self.diagnostics_on_stdout = true;
        self
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments as lossy strings, for logging and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// What the tool had to say: stderr, prefixed by stdout for tools that
    /// report on stdout.
    fn diagnostics(&self, stdout: &str, stderr: &str) -> String {
        if !self.diagnostics_on_stdout {
            return stderr.to_string();
        }
        [stdout.trim_end(), stderr.trim_end()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Maps an exit status to success, success with warnings, or `CommandFailed`.
    fn check_exit(&self, status: ExitStatus, stdout: &str, stderr: &str) -> CoreResult<()> {
        if status.success() {
            return Ok(());
        }
        let diagnostics = self.diagnostics(stdout, stderr);
        match status.code() {
            Some(code) if self.warning_exit_codes.contains(&code) => {
                log::warn!(
                    "{} finished with warnings (exit {code}): {}",
                    self.program,
                    diagnostics.trim()
                );
                Ok(())
            }
            _ => Err(command_failed_error(&self.program, status, diagnostics)),
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external tools.
///
/// Implementations return `CommandFailed` (with the tool's diagnostics
/// verbatim) when a tool exits with a code outside its accepted set, and
/// `Cancelled` when the token fires mid-run.
pub trait ProcessRunner {
    /// Runs a single command to completion.
    fn run(&self, cmd: &ToolCommand, token: &CancellationToken) -> CoreResult<ToolOutput>;

    /// Runs `producer | consumer`, returning the consumer's output.
    fn run_piped(
        &self,
        producer: &ToolCommand,
        consumer: &ToolCommand,
        token: &CancellationToken,
    ) -> CoreResult<ToolOutput>;
}

/// `ProcessRunner` backed by `std::process`.
#[derive(Debug, Clone, Default)]
pub struct StdProcessRunner;

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            if let Err(e) = reader.read_to_end(&mut buf) {
                log::debug!("Failed reading child output: {e}");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_output(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn kill_quietly(child: &mut Child, tool: &str) {
    if let Err(e) = child.kill() {
        log::debug!("Failed to kill {tool}: {e}");
    }
    let _ = child.wait();
}

fn kill_all(children: &mut [(&str, &mut Child)]) {
    for (tool, child) in children.iter_mut() {
        kill_quietly(child, tool);
    }
}

/// Polls the children until all have exited or the token is cancelled.
fn wait_all(
    children: &mut [(&str, &mut Child)],
    token: &CancellationToken,
) -> CoreResult<Vec<ExitStatus>> {
    let mut statuses: Vec<Option<ExitStatus>> = vec![None; children.len()];

    loop {
        if token.is_cancelled() {
            kill_all(children);
            return Err(CoreError::Cancelled);
        }

        let mut wait_error = None;
        for (slot, (tool, child)) in statuses.iter_mut().zip(children.iter_mut()) {
            if slot.is_none() {
                match child.try_wait() {
                    Ok(status) => *slot = status,
                    Err(e) => {
                        wait_error = Some(command_wait_error(*tool, e));
                        break;
                    }
                }
            }
        }
        if let Some(err) = wait_error {
            // Unreaped children would keep the output drains blocked
            kill_all(children);
            return Err(err);
        }

        if statuses.iter().all(Option::is_some) {
            return Ok(statuses.into_iter().flatten().collect());
        }

        thread::sleep(POLL_INTERVAL);
    }
}

impl ProcessRunner for StdProcessRunner {
    fn run(&self, cmd: &ToolCommand, token: &CancellationToken) -> CoreResult<ToolOutput> {
        log::debug!("Running: {cmd}");

        let mut child = cmd
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| command_start_error(&cmd.program, e))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let statuses = wait_all(&mut [(cmd.program.as_str(), &mut child)], token);
        let output = ToolOutput {
            stdout: join_output(stdout),
            stderr: join_output(stderr),
        };

        let status = statuses?[0];
        cmd.check_exit(status, &output.stdout, &output.stderr)?;
        Ok(output)
    }

    fn run_piped(
        &self,
        producer: &ToolCommand,
        consumer: &ToolCommand,
        token: &CancellationToken,
    ) -> CoreResult<ToolOutput> {
        log::debug!("Running: {producer} | {consumer}");

        let mut upstream = producer
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| command_start_error(&producer.program, e))?;

        let pipe = upstream.stdout.take().ok_or_else(|| {
            CoreError::OperationFailed(format!("{} stdout was not captured", producer.program))
        })?;

        let mut downstream = match consumer
            .to_command()
            .stdin(Stdio::from(pipe))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                kill_quietly(&mut upstream, &producer.program);
                return Err(command_start_error(&consumer.program, e));
            }
        };

        let producer_stderr = drain(upstream.stderr.take());
        let consumer_stdout = drain(downstream.stdout.take());
        let consumer_stderr = drain(downstream.stderr.take());

        let statuses = wait_all(
            &mut [
                (producer.program.as_str(), &mut upstream),
                (consumer.program.as_str(), &mut downstream),
            ],
            token,
        );

        let producer_stderr = join_output(producer_stderr);
        let output = ToolOutput {
            stdout: join_output(consumer_stdout),
            stderr: join_output(consumer_stderr),
        };

        let statuses = statuses?;
        consumer.check_exit(statuses[1], &output.stdout, &output.stderr)?;
        // The producer's stdout is the stream itself
        producer.check_exit(statuses[0], "", &producer_stderr)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_command_keeps_args_verbatim() {
        let cmd = ToolCommand::new("mkvmerge")
            .arg("--track-name")
            .arg("0:Director's \"Cut\" Commentary")
            .args(["a b", "c"]);

        assert_eq!(
            cmd.args_lossy(),
            vec!["--track-name", "0:Director's \"Cut\" Commentary", "a b", "c"]
        );
        assert_eq!(cmd.to_string(), "mkvmerge --track-name 0:Director's \"Cut\" Commentary a b c");
    }

    #[test]
    fn test_run_captures_stdout() {
        let token = CancellationToken::new();
        let output = StdProcessRunner
            .run(&ToolCommand::new("sh").args(["-c", "echo hello"]), &token)
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_failure_keeps_stderr() {
        let token = CancellationToken::new();
        let err = StdProcessRunner
            .run(&ToolCommand::new("sh").args(["-c", "echo broken >&2; exit 3"]), &token)
            .unwrap_err();

        match err {
            CoreError::CommandFailed { tool, stderr, .. } => {
                assert_eq!(tool, "sh");
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_warning_exit_code_is_success() {
        let token = CancellationToken::new();
        let cmd = ToolCommand::new("sh")
            .args(["-c", "echo 'Warning: timestamps adjusted'; exit 1"])
            .accept_warning_exit(1)
            .with_stdout_diagnostics();

        let output = StdProcessRunner.run(&cmd, &token).unwrap();
        assert_eq!(output.stdout.trim(), "Warning: timestamps adjusted");
    }

    #[test]
    fn test_unlisted_exit_code_still_fails() {
        let token = CancellationToken::new();
        let cmd = ToolCommand::new("sh")
            .args(["-c", "echo 'Warning: only a warning'; exit 1"]);

        assert!(matches!(
            StdProcessRunner.run(&cmd, &token),
            Err(CoreError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_stdout_diagnostics_reported_on_failure() {
        let token = CancellationToken::new();
        let cmd = ToolCommand::new("sh")
            .args(["-c", "echo 'Error: no tracks to mux'; echo 'extra' >&2; exit 2"])
            .accept_warning_exit(1)
            .with_stdout_diagnostics();

        match StdProcessRunner.run(&cmd, &token).unwrap_err() {
            CoreError::CommandFailed { tool, status, stderr } => {
                assert_eq!(tool, "sh");
                assert_eq!(status.code(), Some(2));
                assert_eq!(stderr, "Error: no tracks to mux\nextra");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_kill_all_reaps_running_children() {
        let mut first = Command::new("sleep").arg("30").spawn().unwrap();
        let mut second = Command::new("sleep").arg("30").spawn().unwrap();

        kill_all(&mut [("sleep", &mut first), ("sleep", &mut second)]);

        assert!(first.try_wait().unwrap().is_some());
        assert!(second.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_missing_program_is_start_error() {
        let token = CancellationToken::new();
        let err = StdProcessRunner
            .run(&ToolCommand::new("autoenc-definitely-missing-tool"), &token)
            .unwrap_err();
        assert!(matches!(err, CoreError::CommandStart(..)));
    }

    #[test]
    fn test_run_piped_feeds_consumer() {
        let token = CancellationToken::new();
        let output = StdProcessRunner
            .run_piped(
                &ToolCommand::new("sh").args(["-c", "printf 'a\\nb\\nc\\n'"]),
                &ToolCommand::new("wc").arg("-l"),
                &token,
            )
            .unwrap();
        assert_eq!(output.stdout.trim(), "3");
    }

    #[test]
    fn test_cancelled_token_kills_child() {
        let token = CancellationToken::new();
        token.cancel();
        let err = StdProcessRunner
            .run(&ToolCommand::new("sleep").arg("30"), &token)
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }
}
