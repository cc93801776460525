use tracing_subscriber::EnvFilter;

/// Installs the process-wide subscriber. Embedders call this once; the
/// library itself only emits events.
pub fn init_logging() {
    init_logging_with_default("info");
}

pub fn init_logging_with_default(default_directive: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .try_init();
    }
}
