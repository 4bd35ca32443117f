//! Destination of plugin log records on the host.

use crate::level::HostLevel;

/// Where a plugin record entered the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSource {
	/// A line captured from the plugin's stderr.
	Stderr,
	/// A `Log` call on the reverse channel.
	Reverse,
}

impl LogSource {
	/// Short name used as the `channel` field.
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Stderr => "stderr",
			Self::Reverse => "reverse",
		}
	}
}

/// One normalized plugin log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
	/// Translated severity.
	pub level: HostLevel,
	/// Entry path.
	pub source: LogSource,
	/// Message with formatting prefixes removed.
	pub message: String,
}

/// Failure to record a log entry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SinkError {
	/// The sink no longer accepts records.
	#[error("log sink closed")]
	Closed,
	/// Writing failed.
	#[error("log sink write failed: {0}")]
	Io(#[from] std::io::Error),
}

/// Structured destination for plugin log records.
pub trait LogSink: Send + Sync {
	/// Records one entry.
	///
	/// # Errors
	///
	/// Returns an error if the record could not be stored.
	fn write(&self, record: &LogRecord) -> Result<(), SinkError>;
}

/// Emits records as `tracing` events with target `plugin`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
	fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
		let channel = record.source.as_str();
		let message = record.message.as_str();
		match record.level {
			HostLevel::Trace => {
				tracing::trace!(target: "plugin", app = "plugin", channel, "{message}");
			}
			HostLevel::Debug => {
				tracing::debug!(target: "plugin", app = "plugin", channel, "{message}");
			}
			HostLevel::Info | HostLevel::NoLevel => {
				tracing::info!(target: "plugin", app = "plugin", channel, "{message}");
			}
			HostLevel::Warn => {
				tracing::warn!(target: "plugin", app = "plugin", channel, "{message}");
			}
			HostLevel::Error | HostLevel::Fatal | HostLevel::Panic => {
				tracing::error!(target: "plugin", app = "plugin", channel, "{message}");
			}
			HostLevel::Disabled => {}
		}
		Ok(())
	}
}
