use std::sync::Arc;

use tracing::info;

use crate::app::config::TunerConfig;
use crate::app::error::AppError;
use crate::app::models::DeviceGeometry;
use crate::app::scaling::recommended_scale;
use crate::app::settings::TunerSettings;
use crate::app::shell::dispatch::Dispatcher;
use crate::app::shell::pool::{ShutdownReport, WorkerPool};
use crate::app::shell::runner::{CommandRunner, RunnerOptions, ShellRunner};
use crate::app::store::{JsonFileStore, PreferenceStore};
use crate::app::tuner::DeviceTuner;

/// Runtime owned by the embedding application: one worker pool, one runner
/// and the tuner built on them.
pub struct AppState {
    pub config: TunerConfig,
    pool: Arc<WorkerPool>,
    tuner: DeviceTuner,
}

impl AppState {
    pub fn new(config: TunerConfig) -> Result<Self, AppError> {
        let pool = Arc::new(WorkerPool::new(&config.pool)?);
        let runner = ShellRunner::new(RunnerOptions::from_config(&config))
            .with_cancel_token(pool.cancel_token());
        Ok(Self::assemble(config, pool, Arc::new(runner)))
    }

    pub fn with_runner(config: TunerConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, AppError> {
        let pool = Arc::new(WorkerPool::new(&config.pool)?);
        Ok(Self::assemble(config, pool, runner))
    }

    fn assemble(config: TunerConfig, pool: Arc<WorkerPool>, runner: Arc<dyn CommandRunner>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&pool), runner);
        let tuner = DeviceTuner::new(dispatcher, config.device.clone());
        Self {
            config,
            pool,
            tuner,
        }
    }

    pub fn tuner(&self) -> &DeviceTuner {
        &self.tuner
    }

    pub fn open_settings(&self) -> Result<TunerSettings<JsonFileStore>, AppError> {
        JsonFileStore::open(self.config.preferences_path()).map(TunerSettings::new)
    }

    /// Reads the device geometry and, on first launch, records it as the
    /// original together with a recommended scale. Returns the original.
    pub fn ensure_initialized<S: PreferenceStore>(
        &self,
        settings: &mut TunerSettings<S>,
        total_memory_mb: u64,
        low_ram: bool,
    ) -> Result<DeviceGeometry, AppError> {
        let current = self.tuner.query_geometry()?;
        if !settings.is_first_launch() {
            return Ok(settings.original_geometry(current));
        }
        let scale = recommended_scale(current.width, current.height, total_memory_mb, low_ram);
        settings.initialize_first_launch(current, scale)?;
        info!(
            resolution = %current.resolution_label(),
            density = current.density_dpi,
            scale,
            "first launch recorded"
        );
        Ok(current)
    }

    pub fn shutdown(&self) -> ShutdownReport {
        self.pool.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::CommandResult;
    use crate::app::shell::testing::ScriptedRunner;
    use crate::app::store::MemoryStore;

    fn state() -> AppState {
        let runner = ScriptedRunner::new(|command| match command {
            "wm size" => CommandResult::completed(0, "Physical size: 1440x3200", ""),
            "wm density" => CommandResult::completed(0, "Physical density: 560", ""),
            _ => CommandResult::completed(0, "", ""),
        });
        AppState::with_runner(TunerConfig::default(), Arc::new(runner)).expect("state")
    }

    #[test]
    fn first_launch_records_geometry_once() {
        let state = state();
        let mut settings = TunerSettings::new(MemoryStore::new());

        let original = state
            .ensure_initialized(&mut settings, 1536, false)
            .expect("init");
        assert_eq!(original, DeviceGeometry::new(1440, 3200, 560).expect("geometry"));
        assert_eq!(settings.last_resolution_scale(), 30);
        assert!(!settings.is_first_launch());

        settings.set_last_resolution_scale(90).expect("scale");
        state
            .ensure_initialized(&mut settings, 1536, false)
            .expect("second init");
        assert_eq!(settings.last_resolution_scale(), 90);
    }

    #[test]
    fn shutdown_stops_async_work() {
        let state = state();
        assert!(state.tuner().kill_background_apps_async().wait().is_ok());

        assert!(state.shutdown().graceful);
        let failure = state
            .tuner()
            .kill_background_apps_async()
            .wait()
            .expect_err("pool closed");
        assert_eq!(failure.error.error, "Worker pool shut down");
    }
}
