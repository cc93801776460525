use tracing::{debug, error};
use uuid::Uuid;

use crate::app::models::{BatchOutcome, CommandResult};
use crate::app::shell::runner::CommandRunner;

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(new_trace_id)
}

/// Runs every command in order on the caller's thread. A failure is recorded
/// and the next command still runs.
pub fn run_all<R, S>(runner: &R, commands: &[S], trace_id: &str) -> BatchOutcome
where
    R: CommandRunner + ?Sized,
    S: AsRef<str>,
{
    let mut batch = BatchOutcome::new(trace_id);
    for command in commands {
        let command = command.as_ref();
        let result = runner.run(command, trace_id);
        if result.success {
            debug!(trace_id = %trace_id, command = %command, "command succeeded");
        } else {
            error!(
                trace_id = %trace_id,
                command = %command,
                exit_code = result.exit_code,
                error = %result.stderr,
                "command failed"
            );
        }
        batch.push(command, result);
    }
    batch
}

pub fn run_all_ok<R, S>(runner: &R, commands: &[S], trace_id: &str) -> bool
where
    R: CommandRunner + ?Sized,
    S: AsRef<str>,
{
    run_all(runner, commands, trace_id).success()
}

pub fn run_one<R>(runner: &R, command: &str, trace_id: &str) -> CommandResult
where
    R: CommandRunner + ?Sized,
{
    run_all(runner, &[command], trace_id).summary_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::shell::testing::ScriptedRunner;

    #[test]
    fn runs_every_command_even_after_a_failure() {
        let runner = ScriptedRunner::new(|command| {
            if command.contains("transition") {
                CommandResult::completed(1, "", "denied")
            } else {
                CommandResult::completed(0, "", "")
            }
        });
        let commands = [
            "settings put global window_animation_scale 1.0",
            "settings put global transition_animation_scale 1.0",
            "settings put global animator_duration_scale 1.0",
        ];

        let batch = run_all(&runner, &commands, "trace-batch");

        assert_eq!(runner.calls(), commands.to_vec());
        assert!(!batch.success());
        assert_eq!(batch.outcomes.len(), 3);
        assert_eq!(batch.failures().count(), 1);
        assert!(!run_all_ok(&runner, &commands, "trace-batch-2"));
    }

    #[test]
    fn empty_batch_succeeds_without_running_anything() {
        let runner = ScriptedRunner::succeeding();
        let commands: [&str; 0] = [];
        assert!(run_all_ok(&runner, &commands, "trace-empty"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn run_one_returns_the_command_result() {
        let runner = ScriptedRunner::new(|_| CommandResult::completed(0, "Physical density: 420", ""));
        let result = run_one(&runner, "wm density", "trace-one");
        assert!(result.success);
        assert_eq!(result.stdout, "Physical density: 420");
    }

    #[test]
    fn resolve_trace_id_generates_when_blank() {
        assert_eq!(resolve_trace_id(Some("abc".to_string())), "abc");
        assert!(!resolve_trace_id(Some("  ".to_string())).trim().is_empty());
        assert_ne!(resolve_trace_id(None), resolve_trace_id(None));
    }

    #[cfg(unix)]
    #[test]
    fn later_commands_run_after_a_real_failure() {
        use crate::app::shell::runner::{RunnerOptions, ShellRunner};
        use std::time::Duration;

        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("calls.log");
        let script = format!(
            "echo \"$4\" >> '{}'; [ \"$4\" != fail ]",
            log.display()
        );
        let runner = ShellRunner::new(RunnerOptions {
            timeout: Duration::from_secs(5),
            launcher: vec!["sh".into(), "-c".into(), script, "sh".into()],
            tool_dir: None,
        });
        let commands = [
            "settings put global ok 1",
            "settings put global fail 1",
            "settings put global third 1",
        ];

        let batch = run_all(&runner, &commands, "trace-real");

        assert!(!batch.success());
        let calls = std::fs::read_to_string(&log).expect("log");
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["ok", "fail", "third"]);
        assert!(batch.outcomes[2].result.success);
    }
}
