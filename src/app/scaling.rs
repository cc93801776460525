//! Resolution and DPI arithmetic driven by the 0–100 scale control.
//!
//! The scale is an aggressiveness knob, not a percentage of native
//! resolution: a larger scale yields a *smaller* target size.

use serde::{Deserialize, Serialize};

use crate::app::models::DeviceGeometry;

pub const RESOLUTION_COEFFICIENT_MULTIPLIER: f32 = 0.005;
pub const FPS_BOOST_MULTIPLIER: f32 = 0.8;
pub const DEFAULT_SCALE: i32 = 75;
pub const MIN_SCALE: i32 = 50;
pub const MAX_SCALE: i32 = 100;

pub fn width_coefficient(original_width: i32) -> f32 {
    -(original_width as f32) * RESOLUTION_COEFFICIENT_MULTIPLIER
}

pub fn height_coefficient(original_height: i32) -> f32 {
    -(original_height as f32) * RESOLUTION_COEFFICIENT_MULTIPLIER
}

pub fn new_dimension(original: i32, coefficient: f32, scale: i32) -> i32 {
    (coefficient * scale as f32).ceil() as i32 + original
}

/// Density scaled linearly with the width change.
pub fn optimal_dpi(original_dpi: i32, original_width: i32, new_width: i32) -> i32 {
    if original_width <= 0 {
        return original_dpi;
    }
    (original_dpi as f32 * (new_width as f32 / original_width as f32)).round() as i32
}

/// Clamps into `[DEFAULT_SCALE, MAX_SCALE]`. The lower bound is the default,
/// not `MIN_SCALE`; persisted scales have always been normalised this way.
pub fn validate_scale(scale: i32) -> i32 {
    scale.clamp(DEFAULT_SCALE, MAX_SCALE)
}

pub fn fps_boost(scale: i32) -> i32 {
    (scale as f32 * FPS_BOOST_MULTIPLIER).round() as i32
}

/// Scale suggested for first-time users from panel size and memory.
pub fn recommended_scale(width: i32, height: i32, total_memory_mb: u64, low_ram: bool) -> i32 {
    let pixels = i64::from(width) * i64::from(height);
    let high_resolution = pixels > 1920 * 1080;
    if !high_resolution && !low_ram {
        return DEFAULT_SCALE;
    }
    match total_memory_mb {
        0..=2047 if pixels > 1920 * 1080 => 30,
        0..=2047 => 20,
        2048..=4095 if pixels > 2560 * 1440 => 25,
        2048..=4095 => 15,
        _ if pixels > 3840 * 2160 => 20,
        _ => 10,
    }
}

/// Coefficients derived once from the original geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScalingPlan {
    pub original: DeviceGeometry,
    pub width_coefficient: f32,
    pub height_coefficient: f32,
}

impl ScalingPlan {
    pub fn new(original: DeviceGeometry) -> Self {
        Self {
            original,
            width_coefficient: width_coefficient(original.width),
            height_coefficient: height_coefficient(original.height),
        }
    }

    pub fn width_for(&self, scale: i32) -> i32 {
        new_dimension(self.original.width, self.width_coefficient, scale)
    }

    pub fn height_for(&self, scale: i32) -> i32 {
        new_dimension(self.original.height, self.height_coefficient, scale)
    }

    /// Target geometry for `scale`; density follows the width unless
    /// `keep_stock_dpi` is set.
    pub fn target_for(&self, scale: i32, keep_stock_dpi: bool) -> DeviceGeometry {
        let width = self.width_for(scale);
        let height = self.height_for(scale);
        let density_dpi = if keep_stock_dpi {
            self.original.density_dpi
        } else {
            optimal_dpi(self.original.density_dpi, self.original.width, width)
        };
        DeviceGeometry {
            width,
            height,
            density_dpi,
        }
    }
}
