//! Logger initialization
//!
//! Library code only emits through the `log` facade. Applications and tests
//! that want output can install `env_logger` through [`init`].

use crate::config::OrbisConfig;

/// Install `env_logger` with the given filter
///
/// Returns `false` when a logger was already installed.
pub fn init(level: &str) -> bool {
    env_logger::Builder::new()
        .parse_filters(level)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Install `env_logger` with the configured level
pub fn init_from_config(config: &OrbisConfig) -> bool {
    init(&config.log_level)
}
