//! Typed device operations on top of the shell layer.
//!
//! Every operation builds its commands, rejects out-of-range parameters with
//! `ERR_DOMAIN_PARAMETER`, and only then hands the commands to the sync or
//! async orchestrator. Write operations report hard failures; read
//! operations degrade to [`parse::UNKNOWN`].

pub mod device;
pub mod display;
pub mod launch;
pub mod parse;
pub mod performance;
pub mod permissions;


use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regex::Regex;
use tracing::warn;

use crate::app::config::DeviceSettings;
use crate::app::error::AppError;
use crate::app::models::{BatchOutcome, CommandResult, DeviceGeometry};
use crate::app::shell::batch::{new_trace_id, run_all, run_one};
use crate::app::shell::dispatch::{BatchFailure, BatchResult, BatchTicket, Dispatcher};
use crate::app::shell::runner::CommandRunner;

/// Java package-name shape, also used for permission names.
pub fn is_valid_package_name(name: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9_]+)*$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct DeviceTuner {
    runner: Arc<dyn CommandRunner>,
    dispatcher: Dispatcher,
    device: DeviceSettings,
    current: Arc<Mutex<Option<DeviceGeometry>>>,
}

impl DeviceTuner {
    pub fn new(dispatcher: Dispatcher, device: DeviceSettings) -> Self {
        Self {
            runner: Arc::clone(dispatcher.runner()),
            dispatcher,
            device,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_geometry(self, geometry: DeviceGeometry) -> Self {
        self.set_current(geometry);
        self
    }

    pub fn device_settings(&self) -> &DeviceSettings {
        &self.device
    }

    /// Last geometry confirmed by a successful round-trip, if any.
    pub fn current_geometry(&self) -> Option<DeviceGeometry> {
        *self.current_slot()
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<DeviceGeometry>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_current(&self, geometry: DeviceGeometry) {
        *self.current_slot() = Some(geometry);
    }

    fn update_current(&self, update: impl FnOnce(&mut DeviceGeometry)) {
        update_snapshot(self.runner.as_ref(), &self.current, update);
    }

    fn execute(&self, commands: &[String], trace_id: &str) -> Result<BatchOutcome, AppError> {
        run_all(self.runner.as_ref(), commands, trace_id).into_result()
    }

    fn query(&self, command: &str, trace_id: &str) -> CommandResult {
        run_one(self.runner.as_ref(), command, trace_id)
    }

    /// Submits `commands`; a build error resolves the ticket without running anything.
    fn dispatch(&self, trace_id: String, commands: Result<Vec<String>, AppError>) -> BatchTicket {
        self.dispatch_then(trace_id, commands, |_| {})
    }

    fn dispatch_then<F>(
        &self,
        trace_id: String,
        commands: Result<Vec<String>, AppError>,
        on_success: F,
    ) -> BatchTicket
    where
        F: FnOnce(&BatchOutcome) + Send + 'static,
    {
        match commands {
            Ok(commands) => self
                .dispatcher
                .run_all_async_inspect(commands, trace_id, move |result: &BatchResult| {
                    if let Ok(outcome) = result {
                        on_success(outcome);
                    }
                }),
            Err(err) => Dispatcher::resolved(trace_id, Err(BatchFailure::from_error(err))),
        }
    }
}

/// Applies a confirmed change to the snapshot. An empty snapshot is first
/// filled from the device, so the change lands on the full geometry.
fn update_snapshot(
    runner: &dyn CommandRunner,
    current: &Mutex<Option<DeviceGeometry>>,
    update: impl FnOnce(&mut DeviceGeometry),
) {
    let known = current
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some();
    if !known {
        match display::read_geometry(runner, &new_trace_id()) {
            Ok(geometry) => {
                let mut slot = current.lock().unwrap_or_else(PoisonError::into_inner);
                slot.get_or_insert(geometry);
            }
            Err(err) => {
                warn!(trace_id = %err.trace_id, "geometry refresh failed: {}", err.error);
                return;
            }
        }
    }
    if let Some(geometry) = current
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_mut()
    {
        update(geometry);
    }
}
