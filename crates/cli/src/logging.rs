//! Installs the `tracing-subscriber` sink both binaries log through.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for a log filter directive, overriding
/// the `-v`/`-q` delta when set.
const LOG_ENV_VAR: &str = "XCP_LOG";

/// Installs a `tracing-subscriber` `fmt` layer writing to stderr, filtered
/// by `XCP_LOG` if set, otherwise by the level [`xcp_logging::level_for_verbosity`]
/// derives from the CLI's verbosity delta.
///
/// Safe to call more than once per process (subsequent calls are ignored);
/// tests that exercise `run_client`/`run_server` repeatedly rely on this.
pub fn init_tracing(verbosity: i32) {
    let default_level = xcp_logging::level_for_verbosity(verbosity);
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
