use tracing_subscriber::EnvFilter;

use crate::app::config::LoggingSettings;

/// Installs the global subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(settings: &LoggingSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init();
    }
}
