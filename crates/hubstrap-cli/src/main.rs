//! `hubstrap`: funds a custody account across chains, registers a social
//! identity for it, authorizes a signer and publishes through a paid hub.
//!
//! Each step is its own subcommand; `bootstrap` runs them in order and
//! stores whatever it produced, even when a later step fails.

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod logging;
mod output;
mod session;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.global.debug);

	let operation = cli.command.name();
	tracing::debug!(operation, "Starting");
	if let Err(error) = commands::dispatch(cli).await {
		logging::operation_error(operation, &error);
		std::process::exit(1);
	}
	Ok(())
}
