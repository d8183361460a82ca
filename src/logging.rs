//! # Structured Logging Module
//!
//! Environment-aware console logging for the scheduler and its drivers.
//! Output is human-readable (ANSI only on a TTY) unless
//! `FLEET_ROTOR_LOG_FORMAT=json` asks for JSON lines.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize tracing with console output.
///
/// Safe to call more than once; only the first call installs a subscriber,
/// and an already installed global subscriber is left alone.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("RUST_LOG")
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(get_log_level(&environment)));

        // Determine if we're in a TTY for ANSI color support
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());
        let json = use_json_format();

        let console_layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(filter)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                ansi_colors = use_ansi && !json,
                json_output = json,
                "Console logging initialized"
            );
        }
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("FLEET_ROTOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var("FLEET_ROTOR_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log a scheduler operation with a consistent field layout
#[macro_export]
macro_rules! log_rotor {
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "ROTOR_{}", $operation
        );
    };
    // Generic form with additional fields
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = %$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "ROTOR_{}", $operation
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_repeated_initialization_is_noop() {
        init_tracing();
        init_tracing();
        log_rotor!(info, "TEST_OPERATION");
        log_rotor!(debug, "TEST_OPERATION", cycle: 1, batch: 2);
    }
}
