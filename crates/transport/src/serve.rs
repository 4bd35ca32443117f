//! Plugin side of the handshake.

use tether_proto::HandshakeConfig;
use tether_proto::handshake::PROTOCOL_VERSIONS_ENV;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mux::{Connection, Side};

/// Checks that this process was launched by a compatible host.
///
/// # Errors
///
/// Returns [`Error::NotLaunchedAsPlugin`] without the magic cookie and
/// [`Error::VersionNotOffered`] when the host does not offer our version.
pub fn check_environment(
	config: &HandshakeConfig,
	lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
	if !config.cookie_matches(lookup(config.magic_cookie_key).as_deref()) {
		return Err(Error::NotLaunchedAsPlugin);
	}
	if !config.offered(lookup(PROTOCOL_VERSIONS_ENV).as_deref()) {
		return Err(Error::VersionNotOffered(config.protocol_version));
	}
	Ok(())
}

/// Announces the plugin on `writer` and starts multiplexing.
///
/// # Errors
///
/// Fails if the handshake line cannot be written.
pub async fn serve<R, W>(config: &HandshakeConfig, reader: R, mut writer: W) -> Result<Connection>
where
	R: AsyncRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static,
{
	let line = config.line();
	writer.write_all(format!("{line}\n").as_bytes()).await?;
	writer.flush().await?;
	debug!(%line, "handshake sent");
	Ok(Connection::new(reader, writer, Side::Plugin))
}

/// [`check_environment`] then [`serve`] over the process's stdin and stdout.
///
/// Nothing else may write to stdout afterwards.
///
/// # Errors
///
/// See [`check_environment`] and [`serve`].
pub async fn serve_stdio(config: &HandshakeConfig) -> Result<Connection> {
	check_environment(config, |key| std::env::var(key).ok())?;
	serve(config, tokio::io::stdin(), tokio::io::stdout()).await
}
