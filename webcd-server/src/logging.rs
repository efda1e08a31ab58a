//! Tracing subscriber setup
//!
//! The subscriber is installed before the config file is read so that config
//! warnings are not lost. The filter sits behind a reload handle; once the config
//! is loaded its `[logging] level` replaces the startup default unless `RUST_LOG`
//! is set.

use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Level used until the config file has been read
pub const STARTUP_LEVEL: &str = "info";

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Filter directives for the webcd crates and request tracing at `level`
pub fn filter_directives(level: &str) -> String {
    format!("webcd={level},webcd_server={level},webcd_common={level},tower_http={level}")
}

fn rust_log_set() -> bool {
    std::env::var_os(EnvFilter::DEFAULT_ENV).is_some()
}

/// Install the global subscriber; `RUST_LOG` wins over the startup default
pub fn init() -> FilterHandle {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(STARTUP_LEVEL)));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    handle
}

/// Switch to the configured level unless `RUST_LOG` was given
pub fn apply_config_level(handle: &FilterHandle, level: &str) {
    if rust_log_set() {
        return;
    }
    match EnvFilter::try_new(filter_directives(level)) {
        Ok(filter) => {
            if let Err(e) = handle.reload(filter) {
                warn!("Failed to apply log level {}: {}", level, e);
            }
        }
        Err(e) => warn!("Ignoring invalid log level {:?}: {}", level, e),
    }
}
