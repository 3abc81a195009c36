//! Log subscriber bootstrap. Library code logs through the `log` facade;
//! the subscriber's `tracing-log` bridge picks those records up.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tanzanite_agent=debug";

/// Install the global subscriber. Calling it twice is harmless.
///
/// Filter precedence: `RUST_LOG`, then `TANZANITE_LOG`, then the default.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(filter_from_env())
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(value) = env::var("TANZANITE_LOG").ok().filter(|v| !v.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(value) {
            return filter;
        }
    }

    EnvFilter::new(DEFAULT_FILTER)
}
