use serde::{Deserialize, Serialize};

use crate::app::error::{
    AppError, ERR_COMMAND_FAILED, ERR_INTERRUPTED, ERR_IO, ERR_SECURITY, ERR_SYSTEM, ERR_TIMEOUT,
    ERR_VALIDATION,
};

/// The only exit code treated as success, for every command in the vocabulary.
pub const SUCCESS_EXIT_CODE: i32 = 0;
/// Exit code reported when no process exit status is available.
pub const FAILURE_EXIT_CODE: i32 = -1;

pub const TIMED_OUT_MESSAGE: &str = "Command timed out";
pub const ALL_SUCCEEDED_MESSAGE: &str = "All commands executed successfully";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected by the validator; nothing was spawned.
    Validation,
    /// Spawn failed or the output streams could not be read.
    Io,
    /// The wait was abandoned because the owning pool was force-stopped.
    Interrupted,
    /// The platform refused to start the process.
    Security,
    Timeout,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::Validation => ERR_VALIDATION,
            FailureKind::Io => ERR_IO,
            FailureKind::Interrupted => ERR_INTERRUPTED,
            FailureKind::Security => ERR_SECURITY,
            FailureKind::Timeout => ERR_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub failure: Option<FailureKind>,
}

impl CommandResult {
    /// A process that ran to completion; success is derived from the exit code.
    pub fn completed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: exit_code == SUCCESS_EXIT_CODE,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            failure: None,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message.into(),
            failure: Some(kind),
        }
    }

    pub fn timed_out() -> Self {
        Self::failed(FailureKind::Timeout, TIMED_OUT_MESSAGE)
    }

    /// `ERR_COMMAND_FAILED` for a process that exited non-zero on its own.
    pub fn error_code(&self) -> &'static str {
        self.failure.map(FailureKind::code).unwrap_or(ERR_COMMAND_FAILED)
    }

    pub fn to_error(&self, trace_id: &str) -> AppError {
        let message = if self.stderr.trim().is_empty() {
            format!("Command exited with code {}", self.exit_code)
        } else {
            self.stderr.clone()
        };
        AppError::new(self.error_code(), message, trace_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: String,
    pub result: CommandResult,
}

/// Ordered per-command outcomes of one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchOutcome {
    pub trace_id: String,
    pub outcomes: Vec<CommandOutcome>,
}

impl BatchOutcome {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, command: impl Into<String>, result: CommandResult) {
        self.outcomes.push(CommandOutcome {
            command: command.into(),
            result,
        });
    }

    /// Logical AND over every result; an empty batch succeeds.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.result.success)
    }

    pub fn last_result(&self) -> Option<&CommandResult> {
        self.outcomes.last().map(|outcome| &outcome.result)
    }

    pub fn error_text(&self) -> String {
        let mut text = String::new();
        for outcome in self.failures() {
            text.push_str(&format!(
                "Command failed: {} | Error: {}\n",
                outcome.command, outcome.result.stderr
            ));
        }
        text
    }

    /// Single-result view: the last result on success, a synthesized failure otherwise.
    pub fn summary_result(&self) -> CommandResult {
        if self.success() {
            return self
                .last_result()
                .cloned()
                .unwrap_or_else(|| CommandResult::completed(SUCCESS_EXIT_CODE, ALL_SUCCEEDED_MESSAGE, ""));
        }
        CommandResult {
            success: false,
            exit_code: FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: self.error_text(),
            failure: self.failures().find_map(|outcome| outcome.result.failure),
        }
    }

    pub fn into_result(self) -> Result<BatchOutcome, AppError> {
        if self.success() {
            return Ok(self);
        }
        let code = self
            .failures()
            .next()
            .map(|outcome| outcome.result.error_code())
            .unwrap_or(ERR_SYSTEM);
        Err(AppError::new(code, self.error_text(), self.trace_id.clone()))
    }
}

/// Width, height and density of one display configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceGeometry {
    pub width: i32,
    pub height: i32,
    pub density_dpi: i32,
}

impl DeviceGeometry {
    pub fn new(width: i32, height: i32, density_dpi: i32) -> Result<Self, AppError> {
        if width <= 0 || height <= 0 || density_dpi <= 0 {
            return Err(AppError::domain_parameter(
                format!("Invalid geometry: {width}x{height} @ {density_dpi}dpi"),
                "",
            ));
        }
        Ok(Self {
            width,
            height,
            density_dpi,
        })
    }

    pub fn resolution_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_result_succeeds_only_on_zero_exit() {
        assert!(CommandResult::completed(0, "ok", "").success);
        let failed = CommandResult::completed(1, "", "boom");
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 1);
        assert_eq!(failed.failure, None);
    }

    #[test]
    fn empty_batch_is_vacuously_successful() {
        let batch = BatchOutcome::new("trace-empty");
        assert!(batch.success());
        let summary = batch.summary_result();
        assert!(summary.success);
        assert_eq!(summary.stdout, ALL_SUCCEEDED_MESSAGE);
        assert!(batch.into_result().is_ok());
    }

    #[test]
    fn failed_batch_synthesizes_concatenated_error() {
        let mut batch = BatchOutcome::new("trace-1");
        batch.push("wm size", CommandResult::completed(0, "Physical size: 1080x2400", ""));
        batch.push("am kill-all", CommandResult::completed(1, "", "denied"));
        batch.push("wm density", CommandResult::timed_out());

        let summary = batch.summary_result();
        assert!(!summary.success);
        assert_eq!(summary.exit_code, FAILURE_EXIT_CODE);
        assert_eq!(
            summary.stderr,
            "Command failed: am kill-all | Error: denied\nCommand failed: wm density | Error: Command timed out\n"
        );
        assert_eq!(summary.failure, Some(FailureKind::Timeout));

        let err = batch.into_result().expect_err("expected failure");
        assert_eq!(err.trace_id, "trace-1");
        assert_eq!(err.code, "ERR_COMMAND_FAILED");
    }

    #[test]
    fn successful_batch_reports_last_result() {
        let mut batch = BatchOutcome::new("trace-2");
        batch.push("wm size 720x1280", CommandResult::completed(0, "first", ""));
        batch.push("wm density 320", CommandResult::completed(0, "second", ""));
        assert_eq!(batch.summary_result().stdout, "second");
    }

    #[test]
    fn geometry_rejects_non_positive_values() {
        assert!(DeviceGeometry::new(0, 1920, 420).is_err());
        assert!(DeviceGeometry::new(1080, 1920, 0).is_err());
        assert_eq!(
            DeviceGeometry::new(1080, 1920, 420).expect("geometry").resolution_label(),
            "1080x1920"
        );
    }
}
