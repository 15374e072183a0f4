//! Ambient tracing setup shared by binaries and test harnesses.

use std::fmt;

use tracing::metadata::LevelFilter;
use tracing_subscriber::fmt::time::FormatTime;

/// UTC timestamps with microsecond precision
struct UtcTime;

impl FormatTime for UtcTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

/// Resolve the log level from a `LOG_LEVEL` setting.
///
/// Unset falls back to `TRACE` in debug builds and `INFO` otherwise.
/// Unrecognized values mean `ERROR`, so a typo quiets logging rather than
/// flooding it.
fn level_filter(value: Option<&str>) -> LevelFilter {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("trace") => LevelFilter::TRACE,
        Some("debug") => LevelFilter::DEBUG,
        Some("info") => LevelFilter::INFO,
        Some("warn") => LevelFilter::WARN,
        Some(_) => LevelFilter::ERROR,
        None if cfg!(debug_assertions) => LevelFilter::TRACE,
        None => LevelFilter::INFO,
    }
}

/// Install the global tracing subscriber.
///
/// The level comes from the `LOG_LEVEL` environment variable (see
/// [`level_filter`] for the fallbacks). Later calls are no-ops, so test
/// binaries can call this freely.
pub fn init() {
    let level = level_filter(std::env::var("LOG_LEVEL").ok().as_deref());
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_timer(UtcTime)
        .with_target(false)
        .with_max_level(level)
        .try_init();
}
