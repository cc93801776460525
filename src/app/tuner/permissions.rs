use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::models::BatchOutcome;
use crate::app::shell::batch::new_trace_id;
use crate::app::shell::dispatch::BatchTicket;
use crate::app::tuner::{is_valid_package_name, DeviceTuner};

pub const WRITE_SECURE_SETTINGS: &str = "android.permission.WRITE_SECURE_SETTINGS";
pub const CONNECTIVITY_PROBE_COMMAND: &str = "settings get secure android_id";

/// Loose check over `dumpsys package` output: the permission name and some
/// `granted=true` marker both appear. Kept separate so a per-permission
/// parse can replace it without touching callers.
pub fn permission_granted_in_dump(output: &str, permission: &str) -> bool {
    output.contains(permission) && output.contains("granted=true")
}

pub fn grant_command(package: &str, permission: &str, trace_id: &str) -> Result<String, AppError> {
    if !is_valid_package_name(package) {
        return Err(AppError::domain_parameter(
            format!("Invalid package name: {package}"),
            trace_id,
        ));
    }
    if !is_valid_package_name(permission) {
        return Err(AppError::domain_parameter(
            format!("Invalid permission name: {permission}"),
            trace_id,
        ));
    }
    Ok(format!("pm grant {package} {permission}"))
}

impl DeviceTuner {
    pub fn has_permission(&self, permission: &str) -> bool {
        let trace_id = new_trace_id();
        let command = format!("dumpsys package {}", self.device.app_package);
        let result = self.query(&command, &trace_id);
        if !result.success {
            warn!(trace_id = %trace_id, "permission query failed: {}", result.stderr);
            return false;
        }
        let granted = permission_granted_in_dump(&result.stdout, permission);
        info!(trace_id = %trace_id, permission = %permission, granted, "has_permission");
        granted
    }

    pub fn has_secure_settings_permission(&self) -> bool {
        self.has_permission(WRITE_SECURE_SETTINGS)
    }

    /// True when a privileged read round-trips with exit code 0.
    pub fn probe_connectivity(&self) -> bool {
        let trace_id = new_trace_id();
        let result = self.query(CONNECTIVITY_PROBE_COMMAND, &trace_id);
        info!(trace_id = %trace_id, reachable = result.success, "probe_connectivity");
        result.success
    }

    pub fn probe_connectivity_async(&self) -> BatchTicket {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "probe_connectivity_async");
        self.dispatch(trace_id, Ok(vec![CONNECTIVITY_PROBE_COMMAND.to_string()]))
    }

    pub fn grant_permission(&self, package: &str, permission: &str) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, package = %package, permission = %permission, "grant_permission");
        let command = grant_command(package, permission, &trace_id)?;
        self.execute(&[command], &trace_id)
    }
}
