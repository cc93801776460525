use std::sync::Arc;

use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::models::{BatchOutcome, DeviceGeometry};
use crate::app::scaling::{optimal_dpi, validate_scale, ScalingPlan};
use crate::app::settings::TunerSettings;
use crate::app::shell::batch::{new_trace_id, run_one};
use crate::app::shell::dispatch::BatchTicket;
use crate::app::shell::runner::CommandRunner;
use crate::app::store::PreferenceStore;
use crate::app::tuner::parse::{
    label_or_unknown, parse_wm_density, parse_wm_size, PHYSICAL_DENSITY_LABEL,
    PHYSICAL_SIZE_LABEL, UNKNOWN,
};
use crate::app::tuner::{update_snapshot, DeviceTuner};

pub const QUERY_SIZE_COMMAND: &str = "wm size";
pub const QUERY_DENSITY_COMMAND: &str = "wm density";
pub const RESET_SIZE_COMMAND: &str = "wm size reset";
pub const RESET_DENSITY_COMMAND: &str = "wm density reset";
pub const MAX_DENSITY_DPI: i32 = 1000;

pub fn resolution_command(width: i32, height: i32, trace_id: &str) -> Result<String, AppError> {
    if width <= 0 || height <= 0 {
        return Err(AppError::domain_parameter(
            format!("Invalid resolution: {width}x{height}"),
            trace_id,
        ));
    }
    Ok(format!("wm size {width}x{height}"))
}

pub fn density_command(density: i32, trace_id: &str) -> Result<String, AppError> {
    if density <= 0 || density > MAX_DENSITY_DPI {
        return Err(AppError::domain_parameter(
            format!("Invalid density: {density}"),
            trace_id,
        ));
    }
    Ok(format!("wm density {density}"))
}

pub fn font_scale_command(scale: f32, trace_id: &str) -> Result<String, AppError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(AppError::domain_parameter(
            format!("Invalid font scale: {scale}"),
            trace_id,
        ));
    }
    Ok(format!("settings put system font_scale {scale}"))
}

/// Effective geometry from `wm size` and `wm density`, Override preferred.
pub(crate) fn read_geometry(
    runner: &dyn CommandRunner,
    trace_id: &str,
) -> Result<DeviceGeometry, AppError> {
    let size = run_one(runner, QUERY_SIZE_COMMAND, trace_id);
    if !size.success {
        return Err(size.to_error(trace_id));
    }
    let (width, height) = parse_wm_size(&size.stdout).ok_or_else(|| {
        AppError::parse(format!("Unrecognised wm size output: {}", size.stdout), trace_id)
    })?;

    let density = run_one(runner, QUERY_DENSITY_COMMAND, trace_id);
    if !density.success {
        return Err(density.to_error(trace_id));
    }
    let density_dpi = parse_wm_density(&density.stdout).ok_or_else(|| {
        AppError::parse(
            format!("Unrecognised wm density output: {}", density.stdout),
            trace_id,
        )
    })?;

    Ok(DeviceGeometry {
        width,
        height,
        density_dpi,
    })
}

impl DeviceTuner {
    pub fn change_resolution(&self, width: i32, height: i32) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, width, height, "change_resolution");
        let command = resolution_command(width, height, &trace_id)?;
        let outcome = self.execute(&[command], &trace_id)?;
        self.update_current(|geometry| {
            geometry.width = width;
            geometry.height = height;
        });
        Ok(outcome)
    }

    pub fn change_resolution_async(&self, width: i32, height: i32) -> BatchTicket {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, width, height, "change_resolution_async");
        let commands = resolution_command(width, height, &trace_id).map(|command| vec![command]);
        let runner = Arc::clone(&self.runner);
        let current = Arc::clone(&self.current);
        self.dispatch_then(trace_id, commands, move |_| {
            update_snapshot(runner.as_ref(), &current, |geometry| {
                geometry.width = width;
                geometry.height = height;
            });
        })
    }

    pub fn reset_resolution(&self) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "reset_resolution");
        self.execute(&[RESET_SIZE_COMMAND.to_string()], &trace_id)
    }

    pub fn reset_resolution_async(&self) -> BatchTicket {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "reset_resolution_async");
        self.dispatch(trace_id, Ok(vec![RESET_SIZE_COMMAND.to_string()]))
    }

    pub fn change_density(&self, density: i32) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, density, "change_density");
        let command = density_command(density, &trace_id)?;
        let outcome = self.execute(&[command], &trace_id)?;
        self.update_current(|geometry| geometry.density_dpi = density);
        Ok(outcome)
    }

    pub fn change_density_async(&self, density: i32) -> BatchTicket {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, density, "change_density_async");
        let commands = density_command(density, &trace_id).map(|command| vec![command]);
        let runner = Arc::clone(&self.runner);
        let current = Arc::clone(&self.current);
        self.dispatch_then(trace_id, commands, move |_| {
            update_snapshot(runner.as_ref(), &current, |geometry| geometry.density_dpi = density);
        })
    }

    pub fn reset_density(&self) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "reset_density");
        self.execute(&[RESET_DENSITY_COMMAND.to_string()], &trace_id)
    }

    pub fn reset_density_async(&self) -> BatchTicket {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "reset_density_async");
        self.dispatch(trace_id, Ok(vec![RESET_DENSITY_COMMAND.to_string()]))
    }

    pub fn change_font_scale(&self, scale: f32) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, scale, "change_font_scale");
        let command = font_scale_command(scale, &trace_id)?;
        self.execute(&[command], &trace_id)
    }

    /// Panel size as reported after `Physical size:`, or `Unknown`.
    pub fn get_current_resolution(&self) -> String {
        let trace_id = new_trace_id();
        let result = self.query(QUERY_SIZE_COMMAND, &trace_id);
        if !result.success {
            warn!(trace_id = %trace_id, "resolution query failed: {}", result.stderr);
            return UNKNOWN.to_string();
        }
        label_or_unknown(&result.stdout, PHYSICAL_SIZE_LABEL)
    }

    pub fn get_current_density(&self) -> String {
        let trace_id = new_trace_id();
        let result = self.query(QUERY_DENSITY_COMMAND, &trace_id);
        if !result.success {
            warn!(trace_id = %trace_id, "density query failed: {}", result.stderr);
            return UNKNOWN.to_string();
        }
        label_or_unknown(&result.stdout, PHYSICAL_DENSITY_LABEL)
    }

    /// Reads the effective geometry and records it as current.
    pub fn query_geometry(&self) -> Result<DeviceGeometry, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, "query_geometry");

        let geometry = read_geometry(self.runner.as_ref(), &trace_id)?;
        self.set_current(geometry);
        Ok(geometry)
    }

    /// Applies `width`x`height` together with a matching density.
    ///
    /// A shrink applies density before resolution, a grow the reverse. The
    /// second step does not run if the first fails.
    pub fn set_screen_dimension(
        &self,
        width: i32,
        height: i32,
        original: DeviceGeometry,
        keep_stock_dpi: bool,
    ) -> Result<DeviceGeometry, AppError> {
        let trace_id = new_trace_id();
        let density = if keep_stock_dpi {
            original.density_dpi
        } else {
            optimal_dpi(original.density_dpi, original.width, width)
        };
        info!(trace_id = %trace_id, width, height, density, "set_screen_dimension");

        let resolution = resolution_command(width, height, &trace_id)?;
        let density_cmd = density_command(density, &trace_id)?;
        let current = match self.current_geometry() {
            Some(current) => current,
            None => self.query_geometry()?,
        };

        let steps = if height < current.height {
            [density_cmd, resolution]
        } else {
            [resolution, density_cmd]
        };
        for step in steps {
            self.execute(&[step], &trace_id)?;
        }

        let applied = DeviceGeometry {
            width,
            height,
            density_dpi: density,
        };
        self.set_current(applied);
        Ok(applied)
    }

    /// Scales the original geometry by `scale` and remembers the scale.
    pub fn apply_scale<S: PreferenceStore>(
        &self,
        settings: &mut TunerSettings<S>,
        scale: i32,
    ) -> Result<DeviceGeometry, AppError> {
        let scale = validate_scale(scale);
        let original = match settings.stored_original_geometry() {
            Some(original) => original,
            None => {
                let current = match self.current_geometry() {
                    Some(current) => current,
                    None => self.query_geometry()?,
                };
                settings.original_geometry(current)
            }
        };
        let keep_stock_dpi = settings.keep_stock_dpi();
        let target = ScalingPlan::new(original).target_for(scale, keep_stock_dpi);
        let applied =
            self.set_screen_dimension(target.width, target.height, original, keep_stock_dpi)?;
        settings.set_last_resolution_scale(scale)?;
        Ok(applied)
    }

    pub fn restore_original(&self, original: DeviceGeometry) -> Result<BatchOutcome, AppError> {
        let trace_id = new_trace_id();
        info!(trace_id = %trace_id, resolution = %original.resolution_label(), "restore_original");
        let outcome = self.execute(
            &[RESET_SIZE_COMMAND.to_string(), RESET_DENSITY_COMMAND.to_string()],
            &trace_id,
        )?;
        self.set_current(original);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_reject_out_of_range_parameters() {
        assert_eq!(resolution_command(1280, 720, "t").expect("cmd"), "wm size 1280x720");
        assert_eq!(resolution_command(0, 720, "t").expect_err("zero").code, "ERR_DOMAIN_PARAMETER");
        assert!(resolution_command(1280, -1, "t").is_err());

        assert_eq!(density_command(1000, "t").expect("cmd"), "wm density 1000");
        assert!(density_command(1001, "t").is_err());
        assert!(density_command(0, "t").is_err());

        assert_eq!(
            font_scale_command(1.15, "t").expect("cmd"),
            "settings put system font_scale 1.15"
        );
        assert!(font_scale_command(0.0, "t").is_err());
        assert!(font_scale_command(f32::NAN, "t").is_err());
    }
}
