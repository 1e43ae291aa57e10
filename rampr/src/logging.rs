use tracing_subscriber::{EnvFilter, fmt};

const LOG_ENV: &str = "RAMPR_LOG";

/// Installs the stderr log subscriber. `RAMPR_LOG` wins over `--log-level`;
/// an unparsable level falls back to `warn`.
pub(crate) fn init(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
