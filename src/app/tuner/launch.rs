use serde::Serialize;
use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::models::DeviceGeometry;
use crate::app::settings::TunerSettings;
use crate::app::store::PreferenceStore;
use crate::app::tuner::performance::KillReport;
use crate::app::tuner::DeviceTuner;

/// Each step of launch preparation runs even when an earlier one failed;
/// failures are recorded here instead of aborting the launch.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LaunchReport {
    /// Geometry applied for the stored scale; `None` when that step failed.
    pub geometry: Option<DeviceGeometry>,
    pub scale: i32,
    pub resolution_error: Option<AppError>,
    /// Present when kill-all-on-launch is enabled and the package list was read.
    pub kills: Option<KillReport>,
    pub kill_error: Option<AppError>,
    pub profile_applied: bool,
    pub profile_error: Option<AppError>,
}

impl LaunchReport {
    pub fn is_clean(&self) -> bool {
        self.resolution_error.is_none()
            && self.kill_error.is_none()
            && self.profile_error.is_none()
            && self.kills.as_ref().map_or(true, |kills| kills.failed.is_empty())
    }
}

impl DeviceTuner {
    /// Gets the device ready before a recent app is started: applies the
    /// stored scale, then honours the kill-all and aggressive-kill flags.
    pub fn prepare_launch<S: PreferenceStore>(&self, settings: &mut TunerSettings<S>) -> LaunchReport {
        let mut report = LaunchReport::default();

        let scale = settings.last_resolution_scale();
        match self.apply_scale(settings, scale) {
            Ok(geometry) => report.geometry = Some(geometry),
            Err(err) => {
                warn!(trace_id = %err.trace_id, "launch resolution failed: {}", err.error);
                report.resolution_error = Some(err);
            }
        }
        report.scale = settings.last_resolution_scale();

        if settings.kill_all_on_launch() {
            match self.list_third_party_packages() {
                Ok(packages) => report.kills = Some(self.kill_apps(&packages)),
                Err(err) => {
                    warn!(trace_id = %err.trace_id, "launch package listing failed: {}", err.error);
                    report.kill_error = Some(err);
                }
            }
        }

        if settings.aggressive_kill() {
            match self.apply_performance_profile() {
                Ok(_) => report.profile_applied = true,
                Err(err) => {
                    warn!(trace_id = %err.trace_id, "launch profile failed: {}", err.error);
                    report.profile_error = Some(err);
                }
            }
        }

        info!(
            scale = report.scale,
            profile_applied = report.profile_applied,
            clean = report.is_clean(),
            "launch prepared"
        );
        report
    }
}
