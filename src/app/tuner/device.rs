use tracing::{info, warn};

use crate::app::shell::batch::new_trace_id;
use crate::app::tuner::parse::UNKNOWN;
use crate::app::tuner::DeviceTuner;

pub const ANDROID_VERSION_PROP: &str = "ro.build.version.release";

fn is_valid_prop_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
}

impl DeviceTuner {
    /// Value of one system property; `None` on failure or empty output.
    pub fn get_prop(&self, key: &str) -> Option<String> {
        let trace_id = new_trace_id();
        if !is_valid_prop_key(key) {
            warn!(trace_id = %trace_id, key = %key, "invalid property key");
            return None;
        }
        let result = self.query(&format!("getprop {key}"), &trace_id);
        if !result.success {
            warn!(trace_id = %trace_id, key = %key, "getprop failed: {}", result.stderr);
            return None;
        }
        let value = result.stdout.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// OS release string, or `Unknown`.
    pub fn get_device_info(&self) -> String {
        let info = self
            .get_prop(ANDROID_VERSION_PROP)
            .unwrap_or_else(|| UNKNOWN.to_string());
        info!(android_version = %info, "get_device_info");
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_keys_are_restricted() {
        assert!(is_valid_prop_key(ANDROID_VERSION_PROP));
        assert!(is_valid_prop_key("ro.product.model"));
        assert!(!is_valid_prop_key(""));
        assert!(!is_valid_prop_key("ro.x;reboot"));
        assert!(!is_valid_prop_key("ro x"));
    }
}
