use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::app::config::TunerConfig;
use crate::app::models::{CommandResult, FailureKind};
use crate::app::shell::validator::{check, sanitize};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Executes one command line and reports the outcome as a value.
///
/// Implementations never panic or return errors across this boundary, so the
/// orchestrators can run them without any error plumbing of their own.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str, trace_id: &str) -> CommandResult;
}

/// Raised by the worker pool on forced shutdown; in-flight waits observe it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub timeout: Duration,
    pub launcher: Vec<String>,
    pub tool_dir: Option<PathBuf>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(crate::app::config::DEFAULT_COMMAND_TIMEOUT_MS),
            launcher: Vec::new(),
            tool_dir: None,
        }
    }
}

impl RunnerOptions {
    pub fn from_config(config: &TunerConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.command.timeout_ms),
            launcher: config.command.launcher.clone(),
            tool_dir: config.tool_dir(),
        }
    }
}

/// Spawns one external process per command with a hard wall-clock timeout.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    options: RunnerOptions,
    cancel: CancelToken,
}

impl ShellRunner {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Splits the sanitized line the way the platform tokenizer does and
    /// applies the launcher prefix or tool directory.
    fn build_argv(&self, sanitized: &str) -> Option<(String, Vec<String>)> {
        let mut tokens = sanitized.split_whitespace().map(str::to_string);
        if let Some((program, prefix_args)) = self.options.launcher.split_first() {
            let mut args = prefix_args.to_vec();
            args.extend(tokens);
            return Some((program.clone(), args));
        }
        let head = tokens.next()?;
        let program = match &self.options.tool_dir {
            Some(dir) => dir.join(&head).to_string_lossy().to_string(),
            None => head,
        };
        Some((program, tokens.collect()))
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, trace_id: &str) -> CommandResult {
        if let Err(err) = check(command) {
            let message = format!("Invalid or unsafe command: {command}");
            error!(trace_id = %trace_id, reason = %err.error, "{message}");
            return CommandResult::failed(FailureKind::Validation, message);
        }

        let sanitized = sanitize(command);
        let Some((program, args)) = self.build_argv(&sanitized) else {
            return CommandResult::failed(FailureKind::Validation, "Command is empty");
        };
        debug!(trace_id = %trace_id, command = %sanitized, "executing command");

        let result = run_with_timeout(&program, &args, self.options.timeout, &self.cancel, trace_id);
        if result.success {
            debug!(trace_id = %trace_id, command = %sanitized, exit_code = result.exit_code, "command finished");
        } else {
            warn!(
                trace_id = %trace_id,
                command = %sanitized,
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "command failed"
            );
        }
        result
    }
}

fn spawn_drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(buffer)
    })
}

fn collect(handle: JoinHandle<io::Result<Vec<u8>>>) -> Result<String, String> {
    match handle.join() {
        Ok(Ok(bytes)) => Ok(String::from_utf8_lossy(&bytes).trim().to_string()),
        Ok(Err(err)) => Err(format!("Failed to read command output: {err}")),
        Err(_) => Err("Output reader thread panicked".to_string()),
    }
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Runs `program` to completion or until `timeout` elapses. The child is
/// always reaped before this returns.
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    cancel: &CancelToken,
    trace_id: &str,
) -> CommandResult {
    if cancel.is_cancelled() {
        return CommandResult::failed(FailureKind::Interrupted, "Command interrupted before start");
    }

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            error!(trace_id = %trace_id, program = %program, error = %err, "spawn refused");
            return CommandResult::failed(FailureKind::Security, format!("Security error: {err}"));
        }
        Err(err) => {
            error!(trace_id = %trace_id, program = %program, error = %err, "spawn failed");
            return CommandResult::failed(FailureKind::Io, format!("Failed to spawn command: {err}"));
        }
    };

    // Both pipes are drained concurrently with the wait loop.
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        terminate(&mut child);
        return CommandResult::failed(FailureKind::Io, "Failed to capture command output");
    };
    let stdout_handle = spawn_drain(stdout);
    let stderr_handle = spawn_drain(stderr);

    // Readers are detached, not joined, on timeout or cancellation.
    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if cancel.is_cancelled() {
                    terminate(&mut child);
                    warn!(trace_id = %trace_id, program = %program, "command interrupted by shutdown");
                    return CommandResult::failed(FailureKind::Interrupted, "Command interrupted");
                }
                if start.elapsed() > timeout {
                    terminate(&mut child);
                    error!(
                        trace_id = %trace_id,
                        program = %program,
                        timeout_ms = timeout.as_millis() as u64,
                        "command timed out"
                    );
                    return CommandResult::timed_out();
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                terminate(&mut child);
                return CommandResult::failed(FailureKind::Io, format!("Failed to poll command: {err}"));
            }
        }
    };

    let stdout = collect(stdout_handle);
    let stderr = collect(stderr_handle);
    match (stdout, stderr) {
        (Ok(stdout), Ok(stderr)) => match exit_code {
            Some(code) => CommandResult::completed(code, stdout, stderr),
            // Killed by a signal: there is no exit status to report.
            None => {
                let message = if stderr.is_empty() {
                    "Command terminated by signal".to_string()
                } else {
                    stderr
                };
                let mut result = CommandResult::failed(FailureKind::Io, message);
                result.stdout = stdout;
                result
            }
        },
        (Err(message), _) | (_, Err(message)) => CommandResult::failed(FailureKind::Io, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_launcher(script: &str) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ]
    }

    fn runner_with(script: &str, timeout: Duration) -> ShellRunner {
        ShellRunner::new(RunnerOptions {
            timeout,
            launcher: shell_launcher(script),
            tool_dir: None,
        })
    }

    #[test]
    fn build_argv_applies_launcher_prefix() {
        let runner = ShellRunner::new(RunnerOptions {
            launcher: vec!["adb".into(), "-s".into(), "SERIAL".into(), "shell".into()],
            ..RunnerOptions::default()
        });
        let (program, args) = runner.build_argv("wm size 720x1280").expect("argv");
        assert_eq!(program, "adb");
        assert_eq!(args, vec!["-s", "SERIAL", "shell", "wm", "size", "720x1280"]);
    }

    #[test]
    fn build_argv_resolves_against_tool_dir() {
        let runner = ShellRunner::new(RunnerOptions {
            tool_dir: Some(PathBuf::from("/system/bin")),
            ..RunnerOptions::default()
        });
        let (program, args) = runner.build_argv("wm   density   320").expect("argv");
        assert_eq!(PathBuf::from(program), PathBuf::from("/system/bin").join("wm"));
        assert_eq!(args, vec!["density", "320"]);
    }

    #[test]
    fn rejects_invalid_command_without_spawning() {
        let runner = ShellRunner::default();
        let result = runner.run("echo test", "trace-invalid");
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.failure, Some(FailureKind::Validation));
        assert_eq!(result.stderr, "Invalid or unsafe command: echo test");
    }

    #[test]
    fn missing_program_is_an_io_failure() {
        let runner = ShellRunner::new(RunnerOptions {
            launcher: vec!["/nonexistent/display-tuner-launcher".to_string()],
            ..RunnerOptions::default()
        });
        let result = runner.run("wm size", "trace-missing");
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Io));
        assert!(result.stderr.starts_with("Failed to spawn command"));
    }

    #[cfg(unix)]
    #[test]
    fn captures_trimmed_output_and_exit_code() {
        let runner = runner_with(
            "printf '  Physical size: 1080x2400\\n\\n'; printf 'warn\\n' >&2; exit 3",
            Duration::from_secs(5),
        );
        let result = runner.run("wm size", "trace-output");
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.failure, None);
        assert_eq!(result.stdout, "Physical size: 1080x2400");
        assert_eq!(result.stderr, "warn");
    }

    #[cfg(unix)]
    #[test]
    fn passes_tokens_as_separate_arguments() {
        let runner = runner_with("printf '%s|' \"$@\"", Duration::from_secs(5));
        let result = runner.run("  settings put global low_power_mode 0 ", "trace-args");
        assert!(result.success);
        assert_eq!(result.stdout, "settings|put|global|low_power_mode|0|");
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
        let runner = runner_with(&script, Duration::from_millis(300));

        let started = Instant::now();
        let result = runner.run("wm size", "trace-timeout");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stderr, "Command timed out");
        assert_eq!(result.failure, Some(FailureKind::Timeout));

        let pid = std::fs::read_to_string(&pid_file).expect("pid file");
        let alive = Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .expect("kill -0");
        assert!(!alive.success(), "process {} is still running", pid.trim());
    }

    #[cfg(unix)]
    #[test]
    fn cancellation_interrupts_in_flight_command() {
        let cancel = CancelToken::new();
        let runner = runner_with("exec sleep 30", Duration::from_secs(20))
            .with_cancel_token(cancel.clone());

        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });
        let started = Instant::now();
        let result = runner.run("wm size", "trace-cancel");
        canceller.join().expect("join");

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(result.failure, Some(FailureKind::Interrupted));
        assert!(!result.success);
    }

    #[cfg(unix)]
    #[test]
    fn does_not_deadlock_on_large_stdout() {
        // Regression test: If stdout/stderr are piped but not drained, the child can block once
        // the pipe buffer fills, causing an otherwise-fast command to "hang" until we hit the
        // timeout.
        let runner = runner_with(
            "i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done",
            Duration::from_secs(10),
        );
        let result = runner.run("dumpsys package", "test-trace-large-output");
        assert_eq!(result.exit_code, 0);
        assert!(
            result.stdout.len() >= 1_000_000,
            "expected stdout >= 1000000, got {}",
            result.stdout.len()
        );
    }
}
