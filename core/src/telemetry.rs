// Logging setup
use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` when it is unset or invalid.
///
/// Returns `false` if a global subscriber was already installed (e.g. by a
/// previous call in the same test binary).
///
/// # Example
///
/// ```no_run
/// switchboard_core::telemetry::init_logging("info,switchboard_core=debug");
/// ```
pub fn init_logging(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Dumps the bus counters as one JSON line at info level.
pub fn log_stats_json(bus: &crate::Bus) -> crate::Result<()> {
    let line = serde_json::to_string(&bus.stats())?;
    tracing::info!(target: "switchboard::stats", stats = %line, "Bus stats");
    Ok(())
}
