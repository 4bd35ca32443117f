//! Host side: spawning a plugin and completing its handshake.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tether_log::{LogBridge, PluginLevel, spawn_stderr_forwarder};
use tether_proto::handshake::PLUGIN_LOG_LEVEL_ENV;
use tether_proto::{HandshakeConfig, HandshakeLine};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mux::{Connection, Mux, Side};

/// How long the plugin may take to announce itself by default.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

/// How long stderr may keep draining after the plugin exits.
const STDERR_DRAIN: Duration = Duration::from_millis(500);

/// Plugin launch parameters.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
	/// Shell command line starting the plugin; run through `sh -c`.
	pub command: String,
	/// Cookie and version contract.
	pub handshake: HandshakeConfig,
	/// Level the plugin is asked to log at.
	pub plugin_level: PluginLevel,
	/// Deadline for the handshake line.
	pub start_timeout: Duration,
	/// Extra environment for the child.
	pub env: Vec<(String, String)>,
}

impl LaunchConfig {
	/// Defaults for `command`.
	#[must_use]
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			handshake: HandshakeConfig::default(),
			plugin_level: PluginLevel::Info,
			start_timeout: DEFAULT_START_TIMEOUT,
			env: Vec::new(),
		}
	}
}

/// A running plugin process.
///
/// The child is killed when this is dropped.
#[derive(Debug)]
pub struct PluginClient {
	child: Child,
	mux: Mux,
	stderr_task: JoinHandle<()>,
	stderr_cancel: CancellationToken,
}

impl PluginClient {
	/// Spawns the plugin, forwards its stderr through `bridge` and waits for
	/// its handshake.
	///
	/// # Errors
	///
	/// Fails if the command cannot be spawned or the plugin's handshake is
	/// missing, late or incompatible. The child is killed in every error case.
	pub async fn launch(config: LaunchConfig, bridge: LogBridge) -> Result<(Self, Connection)> {
		let mut child = Command::new("sh")
			.arg("-c")
			.arg(&config.command)
			.envs(config.handshake.child_env())
			.env(PLUGIN_LOG_LEVEL_ENV, config.plugin_level.as_str())
			.envs(config.env.iter().cloned())
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|source| Error::Spawn {
				command: config.command.clone(),
				source,
			})?;

		let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
		let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
		let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

		let stderr_cancel = CancellationToken::new();
		let stderr_task = spawn_stderr_forwarder(stderr, bridge, stderr_cancel.clone());

		let mut stdout = BufReader::new(stdout);
		let line = match tokio::time::timeout(config.start_timeout, read_handshake(&mut stdout)).await {
			Ok(line) => line?,
			Err(_) => {
				warn!(command = %config.command, timeout = ?config.start_timeout, "plugin handshake timed out");
				return Err(Error::HandshakeTimeout(config.start_timeout));
			}
		};
		config.handshake.validate(&line)?;
		info!(pid = ?child.id(), version = line.app_version, "plugin started");

		// The reader keeps its buffer: frames sent right after the line are not lost.
		let connection = Connection::new(stdout, stdin, Side::Host);
		let client = Self {
			child,
			mux: connection.mux.clone(),
			stderr_task,
			stderr_cancel,
		};
		Ok((client, connection))
	}

	/// OS process id, while the child runs.
	#[must_use]
	pub fn pid(&self) -> Option<u32> {
		self.child.id()
	}

	/// Closes the connection and waits up to `grace` for the plugin to exit,
	/// killing it afterwards.
	///
	/// # Errors
	///
	/// Fails if waiting on or killing the child fails.
	pub async fn shutdown(mut self, grace: Duration) -> Result<ExitStatus> {
		self.mux.close();
		let status = match tokio::time::timeout(grace, self.child.wait()).await {
			Ok(status) => status?,
			Err(_) => {
				warn!(pid = ?self.child.id(), "plugin did not exit in time, killing it");
				self.child.kill().await?;
				self.child.wait().await?
			}
		};
		debug!(%status, "plugin exited");

		if tokio::time::timeout(STDERR_DRAIN, &mut self.stderr_task).await.is_err() {
			self.stderr_cancel.cancel();
		}
		Ok(status)
	}

	/// Kills the plugin immediately.
	///
	/// # Errors
	///
	/// Fails if the kill signal cannot be delivered.
	pub async fn kill(&mut self) -> Result<()> {
		self.mux.close();
		self.child.kill().await?;
		self.stderr_cancel.cancel();
		Ok(())
	}
}

async fn read_handshake<R>(stdout: &mut R) -> Result<HandshakeLine>
where
	R: AsyncBufRead + Unpin,
{
	let mut line = String::new();
	if stdout.read_line(&mut line).await? == 0 {
		return Err(Error::HandshakeEof);
	}
	debug!(line = line.trim_end(), "plugin handshake received");
	Ok(line.parse()?)
}

fn missing_pipe(name: &str) -> Error {
	Error::Io(io::Error::other(format!("plugin {name} was not captured")))
}
