use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::error::AppError;
use crate::app::models::{BatchOutcome, CommandOutcome};
use crate::app::shell::batch::new_trace_id;
use crate::app::shell::dispatch::BatchTicket;
use crate::app::tuner::parse::parse_pm_list_packages;
use crate::app::tuner::{is_valid_package_name, DeviceTuner};

pub const KILL_ALL_COMMAND: &str = "am kill-all";
pub const LIST_THIRD_PARTY_PACKAGES_COMMAND: &str = "pm list packages -3";

pub const KILL_PAUSE_EVERY: usize = 10;
pub const KILL_PAUSE: Duration = Duration::from_millis(100);

const ANIMATION_SCALE_KEYS: [&str; 3] = [
    "window_animation_scale",
    "transition_animation_scale",
    "animator_duration_scale",
];

pub fn performance_profile_commands() -> Vec<String> {
    let mut commands: Vec<String> = ANIMATION_SCALE_KEYS
        .iter()
        .map(|key| format!("settings put global {key} 0.5"))
        .collect();
    commands.push("settings put global low_power_mode 0".to_string());
    commands.push("settings put global background_app_refresh_disabled 1".to_string());
    commands
}

pub fn revert_profile_commands() -> Vec<String> {
    let mut commands: Vec<String> = ANIMATION_SCALE_KEYS
        .iter()
        .map(|key| format!("settings put global {key} 1.0"))
        .collect();
    commands.push("settings put global background_app_refresh_disabled 0".to_string());
    commands
}

pub fn force_stop_command(package: &str, trace_id: &str) -> Result<String, AppError> {
    if !is_valid_package_name(package) {
        return Err(AppError::domain_parameter(
            format!("Invalid package name: {package}"),
            trace_id,
        ));
    }
    Ok(format!("am force-stop {package}"))
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct KillReport {
    pub stopped: Vec<String>,
    /// Protected or malformed package names that were never sent.
    pub skipped: Vec<String>,
    pub failed: Vec<CommandOutcome>,
}

impl DeviceTuner {
    pub fn kill_background_apps(&self) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "kill_background_apps");
        self.execute(&[KILL_ALL_COMMAND.to_string()], &trace_id)
    }

    pub fn kill_background_apps_async(&self) -> BatchTicket {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "kill_background_apps_async");
        self.dispatch(trace_id, Ok(vec![KILL_ALL_COMMAND.to_string()]))
    }

    pub fn force_stop_app(&self, package: &str) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, package = %package, "force_stop_app");
        let command = force_stop_command(package, &trace_id)?;
        self.execute(&[command], &trace_id)
    }

    /// Third-party packages installed on the device.
    pub fn list_third_party_packages(&self) -> Result<Vec<String>, AppError> {
        let trace_id = new_trace_id();
        let result = self.query(LIST_THIRD_PARTY_PACKAGES_COMMAND, &trace_id);
        if !result.success {
            return Err(result.to_error(&trace_id));
        }
        Ok(parse_pm_list_packages(&result.stdout))
    }

    /// Force-stops every package outside the unkillable list, one command at
    /// a time. Sleeps [`KILL_PAUSE`] after the 10th, 20th, ... attempted stop;
    /// skipped packages do not count.
    pub fn kill_apps(&self, packages: &[String]) -> KillReport {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, count = packages.len(), "kill_apps");

        let mut report = KillReport::default();
        let mut attempted = 0usize;
        for package in packages {
            if self
                .device
                .unkillable_packages
                .iter()
                .any(|protected| protected == package)
            {
                debug!(trace_id = %trace_id, package = %package, "skipping protected package");
                report.skipped.push(package.clone());
                continue;
            }
            let command = match force_stop_command(package, &trace_id) {
                Ok(command) => command,
                Err(err) => {
                    warn!(trace_id = %trace_id, "{}", err.error);
                    report.skipped.push(package.clone());
                    continue;
                }
            };

            let result = self.runner.run(&command, &trace_id);
            if result.success {
                report.stopped.push(package.clone());
            } else {
                warn!(
                    trace_id = %trace_id,
                    package = %package,
                    exit_code = result.exit_code,
                    "force-stop failed: {}",
                    result.stderr
                );
                report.failed.push(CommandOutcome { command, result });
            }

            attempted += 1;
            if attempted % KILL_PAUSE_EVERY == 0 {
                thread::sleep(KILL_PAUSE);
            }
        }
        info!(
            trace_id = %trace_id,
            stopped = report.stopped.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "kill_apps finished"
        );
        report
    }

    pub fn apply_performance_profile(&self) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "apply_performance_profile");
        self.execute(&performance_profile_commands(), &trace_id)
    }

    pub fn apply_performance_profile_async(&self) -> BatchTicket {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "apply_performance_profile_async");
        self.dispatch(trace_id, Ok(performance_profile_commands()))
    }

    pub fn revert_performance_profile(&self) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "revert_performance_profile");
        self.execute(&revert_profile_commands(), &trace_id)
    }

    pub fn revert_performance_profile_async(&self) -> BatchTicket {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "revert_performance_profile_async");
        self.dispatch(trace_id, Ok(revert_profile_commands()))
    }
}
