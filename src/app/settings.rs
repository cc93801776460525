use chrono::Utc;
use tracing::{debug, warn};

use crate::app::error::AppError;
use crate::app::models::DeviceGeometry;
use crate::app::scaling::{validate_scale, DEFAULT_SCALE};
use crate::app::store::PreferenceStore;

pub const PREF_FIRST_LAUNCH: &str = "firstLaunch";
pub const PREF_ORIGINAL_WIDTH: &str = "originalWidth";
pub const PREF_ORIGINAL_HEIGHT: &str = "originalHeight";
pub const PREF_ORIGINAL_RESOLUTION: &str = "originalResolution";
pub const PREF_ORIGINAL_DPI: &str = "originalDPI";
pub const PREF_AGGRESSIVE_KILL: &str = "aggressiveLMK";
pub const PREF_KILL_ALL_ON_LAUNCH: &str = "isMurderer";
pub const PREF_KEEP_STOCK_DPI: &str = "keepStockDPI";
pub const PREF_LAST_RESOLUTION_SCALE: &str = "lastResolutionScale";
pub const PREF_RECENT_APP_SUFFIX: &str = "thGame";

pub const MAX_RECENT_APPS: usize = 6;

fn recent_app_key(slot: usize) -> String {
    format!("{slot}{PREF_RECENT_APP_SUFFIX}")
}

/// Typed view over the preference keys this crate reads and writes.
///
/// Every setter flushes, so a crash never loses an acknowledged change.
pub struct TunerSettings<S: PreferenceStore> {
    store: S,
}

impl<S: PreferenceStore> TunerSettings<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn is_first_launch(&self) -> bool {
        self.store.get_bool(PREF_FIRST_LAUNCH, true)
    }

    /// Captures `current` as the original geometry and seeds the scale.
    pub fn initialize_first_launch(
        &mut self,
        current: DeviceGeometry,
        recommended_scale: i32,
    ) -> Result<(), AppError> {
        self.store.put_int(PREF_ORIGINAL_WIDTH, current.width);
        self.store.put_int(PREF_ORIGINAL_HEIGHT, current.height);
        self.store
            .put_string(PREF_ORIGINAL_RESOLUTION, &current.resolution_label());
        self.store.put_int(PREF_ORIGINAL_DPI, current.density_dpi);
        self.store.put_bool(PREF_FIRST_LAUNCH, false);
        self.store
            .put_int(PREF_LAST_RESOLUTION_SCALE, recommended_scale);
        self.store.flush()?;
        debug!(
            resolution = %current.resolution_label(),
            density = current.density_dpi,
            scale = recommended_scale,
            "first launch initialised"
        );
        Ok(())
    }

    /// Persisted original geometry; each missing field falls back to `current`.
    pub fn original_geometry(&self, current: DeviceGeometry) -> DeviceGeometry {
        DeviceGeometry {
            width: self.store.get_int(PREF_ORIGINAL_WIDTH, current.width),
            height: self.store.get_int(PREF_ORIGINAL_HEIGHT, current.height),
            density_dpi: self.store.get_int(PREF_ORIGINAL_DPI, current.density_dpi),
        }
    }

    pub fn stored_original_geometry(&self) -> Option<DeviceGeometry> {
        let width = self.store.get_int(PREF_ORIGINAL_WIDTH, 0);
        let height = self.store.get_int(PREF_ORIGINAL_HEIGHT, 0);
        let density = self.store.get_int(PREF_ORIGINAL_DPI, 0);
        DeviceGeometry::new(width, height, density).ok()
    }

    pub fn original_resolution(&self, current: DeviceGeometry) -> String {
        self.store
            .get_string(PREF_ORIGINAL_RESOLUTION, &current.resolution_label())
    }

    pub fn last_resolution_scale(&self) -> i32 {
        self.store
            .get_int(PREF_LAST_RESOLUTION_SCALE, DEFAULT_SCALE)
    }

    /// Stores the clamped scale and returns what was stored.
    pub fn set_last_resolution_scale(&mut self, scale: i32) -> Result<i32, AppError> {
        let validated = validate_scale(scale);
        self.store.put_int(PREF_LAST_RESOLUTION_SCALE, validated);
        self.store.flush()?;
        Ok(validated)
    }

    pub fn keep_stock_dpi(&self) -> bool {
        self.store.get_bool(PREF_KEEP_STOCK_DPI, false)
    }

    pub fn set_keep_stock_dpi(&mut self, state: bool) -> Result<(), AppError> {
        self.put_flag(PREF_KEEP_STOCK_DPI, state)
    }

    pub fn aggressive_kill(&self) -> bool {
        self.store.get_bool(PREF_AGGRESSIVE_KILL, false)
    }

    pub fn set_aggressive_kill(&mut self, state: bool) -> Result<(), AppError> {
        self.put_flag(PREF_AGGRESSIVE_KILL, state)
    }

    pub fn kill_all_on_launch(&self) -> bool {
        self.store.get_bool(PREF_KILL_ALL_ON_LAUNCH, false)
    }

    pub fn set_kill_all_on_launch(&mut self, state: bool) -> Result<(), AppError> {
        self.put_flag(PREF_KILL_ALL_ON_LAUNCH, state)
    }

    fn put_flag(&mut self, key: &str, state: bool) -> Result<(), AppError> {
        self.store.put_bool(key, state);
        self.store.flush()?;
        debug!(key = %key, state, "flag updated");
        Ok(())
    }

    /// Package name in 1-based `slot`, if one is stored.
    pub fn recent_app(&self, slot: usize) -> Option<String> {
        if slot < 1 || slot > MAX_RECENT_APPS {
            warn!(slot, "invalid recent app slot");
            return None;
        }
        let package = self.store.get_string(&recent_app_key(slot), "");
        if package.is_empty() {
            None
        } else {
            Some(package)
        }
    }

    pub fn recent_apps(&self) -> Vec<Option<String>> {
        (1..=MAX_RECENT_APPS).map(|slot| self.recent_app(slot)).collect()
    }

    /// Stores `package` at 0-based `index`.
    pub fn add_recent_app(&mut self, package: &str, index: usize) -> Result<(), AppError> {
        if index >= MAX_RECENT_APPS {
            return Err(AppError::domain_parameter(
                format!("Invalid recent app index: {index}"),
                "",
            ));
        }
        self.store.put_string(&recent_app_key(index + 1), package);
        self.store.flush()
    }

    pub fn remove_recent_app(&mut self, index: usize) -> Result<(), AppError> {
        if index >= MAX_RECENT_APPS {
            return Err(AppError::domain_parameter(
                format!("Invalid recent app index: {index}"),
                "",
            ));
        }
        self.store.put_string(&recent_app_key(index + 1), "");
        self.store.flush()
    }

    /// First free 0-based index; slot 0 when every slot is taken.
    pub fn first_empty_recent_index(&self) -> usize {
        (1..=MAX_RECENT_APPS)
            .find(|slot| self.recent_app(*slot).is_none())
            .map(|slot| slot - 1)
            .unwrap_or(0)
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), AppError> {
        self.store.clear();
        self.store.flush()
    }

    pub fn export_summary(&self, current: DeviceGeometry) -> String {
        let original = self.original_geometry(current);
        let mut export = String::new();
        export.push_str("Display Tuner Settings Export\n");
        export.push_str(&format!("Exported At: {}\n", Utc::now().to_rfc3339()));
        export.push_str(&format!(
            "Original Resolution: {}\n",
            self.original_resolution(current)
        ));
        export.push_str(&format!("Original DPI: {}\n", original.density_dpi));
        export.push_str(&format!(
            "Last Resolution Scale: {}\n",
            self.last_resolution_scale()
        ));
        export.push_str(&format!("Keep Stock DPI: {}\n", self.keep_stock_dpi()));
        export.push_str(&format!("Aggressive Kill: {}\n", self.aggressive_kill()));
        export.push_str(&format!(
            "Kill All On Launch: {}\n",
            self.kill_all_on_launch()
        ));
        export
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::store::{JsonFileStore, MemoryStore};

    fn geometry() -> DeviceGeometry {
        DeviceGeometry::new(1080, 2400, 420).expect("geometry")
    }

    #[test]
    fn first_launch_captures_original_geometry() {
        let mut settings = TunerSettings::new(MemoryStore::new());
        assert!(settings.is_first_launch());
        assert_eq!(settings.stored_original_geometry(), None);

        settings
            .initialize_first_launch(geometry(), 15)
            .expect("init");

        assert!(!settings.is_first_launch());
        assert_eq!(settings.stored_original_geometry(), Some(geometry()));
        assert_eq!(settings.original_resolution(geometry()), "1080x2400");
        assert_eq!(settings.last_resolution_scale(), 15);
    }

    #[test]
    fn original_geometry_falls_back_to_current() {
        let settings = TunerSettings::new(MemoryStore::new());
        let current = DeviceGeometry::new(720, 1280, 320).expect("geometry");
        assert_eq!(settings.original_geometry(current), current);
    }

    #[test]
    fn scale_is_clamped_before_storing() {
        let mut settings = TunerSettings::new(MemoryStore::new());
        assert_eq!(settings.last_resolution_scale(), DEFAULT_SCALE);
        assert_eq!(settings.set_last_resolution_scale(0).expect("set"), DEFAULT_SCALE);
        assert_eq!(settings.set_last_resolution_scale(90).expect("set"), 90);
        assert_eq!(settings.last_resolution_scale(), 90);
    }

    #[test]
    fn recent_app_slots() {
        let mut settings = TunerSettings::new(MemoryStore::new());
        assert_eq!(settings.first_empty_recent_index(), 0);
        settings.add_recent_app("com.example.a", 0).expect("add");
        settings.add_recent_app("com.example.b", 1).expect("add");
        assert_eq!(settings.first_empty_recent_index(), 2);
        assert_eq!(settings.recent_app(1).as_deref(), Some("com.example.a"));
        assert_eq!(settings.recent_app(0), None);
        assert_eq!(settings.recent_app(7), None);

        settings.remove_recent_app(0).expect("remove");
        assert_eq!(settings.recent_app(1), None);
        assert_eq!(settings.first_empty_recent_index(), 0);
        assert!(settings.add_recent_app("com.example.c", 6).is_err());

        for index in 0..MAX_RECENT_APPS {
            settings.add_recent_app("com.example.full", index).expect("add");
        }
        assert_eq!(settings.first_empty_recent_index(), 0);
        assert_eq!(settings.recent_apps().iter().filter(|slot| slot.is_some()).count(), 6);
    }

    #[test]
    fn flags_survive_reopen_and_reset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");

        let mut settings = TunerSettings::new(JsonFileStore::open(&path).expect("open"));
        settings.set_keep_stock_dpi(true).expect("flag");
        settings.set_aggressive_kill(true).expect("flag");
        settings.set_kill_all_on_launch(true).expect("flag");

        let mut reopened = TunerSettings::new(JsonFileStore::open(&path).expect("reopen"));
        assert!(reopened.keep_stock_dpi());
        assert!(reopened.aggressive_kill());
        assert!(reopened.kill_all_on_launch());

        reopened.reset_to_defaults().expect("reset");
        let cleared = TunerSettings::new(JsonFileStore::open(&path).expect("reopen"));
        assert!(!cleared.keep_stock_dpi());
        assert!(cleared.is_first_launch());
    }

    #[test]
    fn export_lists_every_setting() {
        let mut settings = TunerSettings::new(MemoryStore::new());
        settings.initialize_first_launch(geometry(), 80).expect("init");
        let export = settings.export_summary(geometry());
        assert!(export.starts_with("Display Tuner Settings Export\n"));
        assert!(export.contains("Original Resolution: 1080x2400\n"));
        assert!(export.contains("Original DPI: 420\n"));
        assert!(export.contains("Last Resolution Scale: 80\n"));
        assert!(export.contains("Kill All On Launch: false\n"));
    }
}
