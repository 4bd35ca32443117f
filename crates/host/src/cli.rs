//! Command line surface of the host.

use std::time::Duration;

use clap::{Parser, Subcommand};
use tether_log::HostLevel;

/// Host command line arguments.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Drive a key/value plugin over tether")]
pub struct Cli {
	/// Shell command starting the plugin
	#[arg(long, env = "KV_PLUGIN", value_name = "CMD")]
	pub plugin: String,

	/// Host log level; the plugin is started at the matching level
	#[arg(long, env = "TETHER_LOG_LEVEL", value_name = "LEVEL", default_value = "info")]
	pub log_level: HostLevel,

	/// Per-call deadline in seconds; 0 waits indefinitely
	#[arg(long, env = "TETHER_RPC_TIMEOUT", value_name = "SECS", default_value_t = 0)]
	pub rpc_timeout: u64,

	/// Verbose logging
	#[arg(short, long)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

/// Operations forwarded to the plugin.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// Print the value stored under KEY
	Get {
		/// Key to read
		key: String,
	},
	/// Store VALUE under KEY
	Put {
		/// Key to write
		key: String,
		/// Value to store
		value: String,
	},
}

impl Cli {
	/// Level after applying `--verbose`.
	#[must_use]
	pub fn level(&self) -> HostLevel {
		if self.verbose && matches!(self.log_level, HostLevel::Info | HostLevel::Warn) {
			HostLevel::Debug
		} else {
			self.log_level
		}
	}

	/// Per-call deadline, if any.
	#[must_use]
	pub fn rpc_timeout(&self) -> Option<Duration> {
		(self.rpc_timeout > 0).then(|| Duration::from_secs(self.rpc_timeout))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
		Cli::try_parse_from(std::iter::once("tether").chain(args.iter().copied()))
	}

	#[test]
	fn parses_get_and_put() {
		let cli = parse(&["--plugin", "./kv", "get", "foo"]).expect("get");
		assert_eq!(cli.command, Command::Get { key: "foo".into() });
		assert_eq!(cli.plugin, "./kv");
		assert_eq!(cli.level(), HostLevel::Info);
		assert_eq!(cli.rpc_timeout(), None);

		let cli = parse(&["--plugin", "./kv", "--rpc-timeout", "3", "put", "foo", "bar"]).expect("put");
		assert_eq!(
			cli.command,
			Command::Put {
				key: "foo".into(),
				value: "bar".into()
			}
		);
		assert_eq!(cli.rpc_timeout(), Some(Duration::from_secs(3)));
	}

	#[test]
	fn rejects_unknown_operations() {
		assert!(parse(&["--plugin", "./kv", "delete", "foo"]).is_err());
		assert!(parse(&["--plugin", "./kv", "put", "foo"]).is_err());
		assert!(parse(&["--plugin", "./kv"]).is_err());
	}

	#[test]
	fn verbose_raises_quiet_levels_only() {
		let cli = parse(&["--plugin", "x", "-v", "get", "k"]).expect("parse");
		assert_eq!(cli.level(), HostLevel::Debug);
		let cli = parse(&["--plugin", "x", "-v", "--log-level", "trace", "get", "k"]).expect("parse");
		assert_eq!(cli.level(), HostLevel::Trace);
		assert!(parse(&["--plugin", "x", "--log-level", "loud", "get", "k"]).is_err());
	}
}
