//! Transport errors.

use std::io;
use std::time::Duration;

use tether_proto::{BrokerId, HandshakeError};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures while launching, handshaking or multiplexing.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The plugin command could not be started.
	#[error("failed to start plugin `{command}`: {source}")]
	Spawn {
		/// Command line as given.
		command: String,
		/// Underlying spawn failure.
		#[source]
		source: io::Error,
	},
	/// The plugin announced something we cannot talk to.
	#[error("plugin handshake failed: {0}")]
	Handshake(#[from] HandshakeError),
	/// The plugin closed stdout before announcing itself.
	#[error("plugin exited before completing the handshake")]
	HandshakeEof,
	/// The plugin did not announce itself in time.
	#[error("plugin did not complete the handshake within {0:?}")]
	HandshakeTimeout(Duration),
	/// The binary was started directly instead of by a host.
	#[error(
		"this binary is a tether plugin and is not meant to be executed directly; \
		 run the tether host, which launches it"
	)]
	NotLaunchedAsPlugin,
	/// The host does not speak our protocol version.
	#[error("host does not offer plugin protocol version {0}")]
	VersionNotOffered(u32),
	/// Nobody listens on the dialed channel.
	#[error("no listener on broker channel {0}")]
	DialRefused(BrokerId),
	/// The channel is already open or pending.
	#[error("broker channel {0} is already in use")]
	ChannelInUse(BrokerId),
	/// The underlying connection is gone.
	#[error("plugin connection closed")]
	ConnectionClosed,
	/// I/O failure on the plugin's stdio.
	#[error(transparent)]
	Io(#[from] io::Error),
}
