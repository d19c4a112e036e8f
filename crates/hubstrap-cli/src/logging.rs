//! Logging setup and paired user/log output.

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::output::Display;

/// Installs the subscriber. `RUST_LOG` wins over `debug`.
///
/// Logs go to stderr so `--json` output on stdout stays parseable.
pub fn init_logging(debug: bool) {
	let default = if debug { "debug" } else { "info" };
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

	tracing_subscriber::registry()
		.with(
			fmt::layer()
				.with_writer(std::io::stderr)
				.with_target(debug)
				.with_thread_ids(false)
				.with_file(false)
				.with_line_number(false)
				.compact(),
		)
		.with(env_filter)
		.init();
}

pub fn operation_success(operation: &str, details: &str) {
	Display::success(&format!("{operation} completed"));
	info!(operation, details, "Operation completed successfully");
}

pub fn operation_error(operation: &str, error: &anyhow::Error) {
	Display::error(&format!("{operation} failed: {error:#}"));
	error!(operation, error = %format!("{error:#}"), "Operation failed");
}

pub fn operation_warning(operation: &str, message: &str, context: &str) {
	Display::warning(message);
	warn!(operation, message, context, "Operation warning");
}
