pub mod token_counter;

use crate::protocol::canonical::UsageData;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level and format.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// `log_format` is `text` (default) or `json`. Installing twice is a no-op.
pub fn init_tracing(log_level: &str, log_format: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = if log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Whether [`log_generation_complete`] output would be recorded.
///
/// Lets callers skip token estimation when usage logging is filtered out.
#[must_use]
pub fn usage_logging_enabled() -> bool {
    tracing::enabled!(tracing::Level::INFO)
}

/// Log token usage for a completed generation, computing duration from start time.
pub fn log_generation_complete(model: &str, usage: &UsageData, start_time: std::time::Instant) {
    token_counter::log_generation_usage(model, usage, start_time.elapsed());
}
