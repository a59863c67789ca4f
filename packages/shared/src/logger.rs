//! Logging setup utilities for the roomcast binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// This function sets up logging for the server library crate and the binary.
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "roomcast-server")
/// * `default_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use roomcast_shared::logger::setup_logger;
///
/// setup_logger("roomcast-server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                default_filter(binary_name, default_log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the fallback filter directive used when `RUST_LOG` is not set.
fn default_filter(binary_name: &str, default_log_level: &str) -> String {
    format!(
        "roomcast_server={level},roomcast_shared={level},{bin}={level},tower_http=info",
        level = default_log_level,
        bin = binary_name.replace('-', "_"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_contains_all_targets() {
        // テスト項目: デフォルトのフィルタに各クレートとバイナリのターゲットが含まれる
        // given (前提条件):
        let binary_name = "roomcast-server";

        // when (操作):
        let filter = default_filter(binary_name, "debug");

        // then (期待する結果):
        assert!(filter.contains("roomcast_server=debug"));
        assert!(filter.contains("roomcast_shared=debug"));
        assert!(filter.contains("tower_http=info"));
        assert!(!filter.contains("roomcast-server"));
    }
}
