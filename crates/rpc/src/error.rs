//! Errors raised by the message pump and its sockets.

use std::io;

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible pump errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The main loop stopped before the call completed.
	#[error("service stopped")]
	ServiceStopped,
	/// The underlying channel reached EOF.
	#[error("the underlying channel reached EOF")]
	Eof,
	/// Input/output errors from the underlying channel, including undecodable frames.
	#[error("{0}")]
	Io(#[from] io::Error),
}

impl Error {
	/// Returns true if this error means the peer went away cleanly.
	#[must_use]
	pub fn is_disconnect(&self) -> bool {
		match self {
			Self::Eof => true,
			Self::Io(e) => matches!(
				e.kind(),
				io::ErrorKind::UnexpectedEof
					| io::ErrorKind::BrokenPipe
					| io::ErrorKind::ConnectionReset
			),
			Self::ServiceStopped => false,
		}
	}
}
