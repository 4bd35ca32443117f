//! Tether host binary.
//!
//! Launches the key/value plugin, runs one `get` or `put` against it and
//! renders everything the plugin logs (stderr and reverse channel) through
//! the host's own subscriber.

mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tether_log::{HostLevel, LogBridge, to_plugin_level};
use tether_session::{SessionClient, SessionConfig};
use tether_transport::{LaunchConfig, PluginClient};
use tracing::{debug, error, info, warn};

use crate::cli::{Cli, Command};

/// How long the plugin may take to exit once its connection is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
	let cli = match Cli::try_parse() {
		Ok(cli) => cli,
		Err(err) => {
			let _ = err.print();
			return if err.use_stderr() {
				ExitCode::FAILURE
			} else {
				ExitCode::SUCCESS
			};
		}
	};

	setup_tracing(cli.level());

	match run(cli).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!(error = %format_args!("{err:#}"), "tether failed");
			eprintln!("error: {err:#}");
			ExitCode::FAILURE
		}
	}
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	let level = cli.level();
	let bridge = LogBridge::tracing();

	let mut launch = LaunchConfig::new(cli.plugin.clone());
	launch.plugin_level = to_plugin_level(level);
	let (plugin, connection) = PluginClient::launch(launch, bridge.clone())
		.await
		.with_context(|| format!("launching plugin `{}`", cli.plugin))?;

	let session = SessionClient::connect(
		connection.primary,
		connection.broker,
		bridge,
		SessionConfig {
			rpc_timeout: cli.rpc_timeout(),
		},
	);

	let result = execute(&session, cli.command).await;

	match plugin.shutdown(SHUTDOWN_GRACE).await {
		Ok(status) => debug!(%status, "plugin stopped"),
		Err(error) => warn!(%error, "plugin shutdown failed"),
	}
	result
}

async fn execute(session: &SessionClient, command: Command) -> anyhow::Result<()> {
	match command {
		Command::Get { key } => {
			let value = session
				.get(&key)
				.await
				.with_context(|| format!("get `{key}`"))?;
			let value = String::from_utf8_lossy(&value);
			info!(%key, %value, "plugin get call result");
			println!("{value}");
		}
		Command::Put { key, value } => {
			session
				.put(&key, value.into_bytes())
				.await
				.with_context(|| format!("put `{key}`"))?;
			info!(%key, "plugin put call done");
		}
	}
	Ok(())
}

fn setup_tracing(level: HostLevel) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let max_level = level.level_filter();

	// TETHER_LOG_DIR keeps stderr free for the command's own output.
	if let Some(log_dir) = std::env::var("TETHER_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("tether.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let filter = EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::default().add_directive(max_level.into()));

			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_target(true);

			tracing_subscriber::registry()
				.with(filter)
				.with(file_layer)
				.init();

			info!(path = ?log_path, "host tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt()
		.with_max_level(max_level)
		.with_writer(std::io::stderr)
		.init();
}
