//! Tether key/value plugin binary.
//!
//! Speaks the plugin handshake on stdout, serves `Ping`, `Init`, `Get` and
//! `Put` over stdin/stdout and logs to stderr in the plugin line layout.
//! Store operations are also reported to the host over the reverse log
//! channel once the host has sent `Init`.

mod store;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tether_log::{PluginLevel, PluginLineFormat};
use tether_proto::HandshakeConfig;
use tether_proto::handshake::PLUGIN_LOG_LEVEL_ENV;
use tether_session::{PluginLogger, SessionServer};
use tracing::{error, info};

use crate::store::FileStore;

/// Environment key of the store directory.
const KV_DIR_ENV: &str = "TETHER_KV_DIR";

#[tokio::main]
async fn main() -> ExitCode {
	setup_tracing();

	match run().await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			let not_a_plugin = matches!(
				err.downcast_ref::<tether_transport::Error>(),
				Some(tether_transport::Error::NotLaunchedAsPlugin)
			);
			if not_a_plugin {
				eprintln!(
					"This binary is a plugin and is not meant to be executed directly.\n\
					 Run the tether host with KV_PLUGIN pointing at it instead."
				);
			} else {
				error!(error = %format_args!("{err:#}"), "plugin failed");
			}
			ExitCode::FAILURE
		}
	}
}

async fn run() -> anyhow::Result<()> {
	let connection = tether_transport::serve_stdio(&HandshakeConfig::default()).await?;

	let dir = std::env::var_os(KV_DIR_ENV).map_or_else(|| PathBuf::from("."), PathBuf::from);
	let logger = PluginLogger::new();
	let store = FileStore::new(dir, logger.clone());
	info!(dir = %store.dir().display(), "serving key/value store");

	let server = SessionServer::new(Arc::new(store), connection.broker, logger);
	server
		.serve(connection.primary)
		.await
		.context("primary channel failed")?;
	info!("host disconnected");
	Ok(())
}

fn setup_tracing() {
	let level = std::env::var(PLUGIN_LOG_LEVEL_ENV)
		.ok()
		.and_then(|value| value.parse::<PluginLevel>().ok())
		.unwrap_or(PluginLevel::Info);

	tracing_subscriber::fmt()
		.with_ansi(false)
		.event_format(PluginLineFormat::default())
		.with_max_level(level.level_filter())
		.with_writer(std::io::stderr)
		.init();
}
