//! Session errors.

use tether_proto::RpcStatus;

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of session calls.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The connection or a broker channel failed.
	#[error(transparent)]
	Transport(#[from] tether_transport::Error),
	/// The channel loop stopped or broke.
	#[error("rpc channel failed: {0}")]
	Rpc(#[from] tether_rpc::Error),
	/// The peer's handler returned an error.
	#[error("plugin returned an error: {0}")]
	Remote(#[from] RpcStatus),
	/// No reply within the configured deadline.
	#[error("{0} call timed out")]
	Timeout(&'static str),
	/// The peer answered with the wrong reply type.
	#[error("unexpected reply to {0}")]
	UnexpectedReply(&'static str),
}
