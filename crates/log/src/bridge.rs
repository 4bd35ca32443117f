//! Adapter from raw plugin output to a [`LogSink`].

use std::fmt;
use std::sync::Arc;

use crate::level::{HostLevel, PluginLevel};
use crate::normalize::{is_stream_closed, normalize};
use crate::sink::{LogRecord, LogSink, LogSource, SinkError, TracingSink};

/// Outcome of forwarding one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
	/// The sink received a record.
	Written,
	/// The line was the shutdown diagnostic and was dropped.
	Suppressed,
}

/// Normalizes plugin output and writes it to a sink.
///
/// Cheap to clone; every clone shares the sink.
#[derive(Clone)]
pub struct LogBridge {
	sink: Arc<dyn LogSink>,
}

impl fmt::Debug for LogBridge {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LogBridge").finish_non_exhaustive()
	}
}

impl LogBridge {
	/// Wraps a sink.
	#[must_use]
	pub fn new(sink: Arc<dyn LogSink>) -> Self {
		Self { sink }
	}

	/// Bridge writing to the host's own `tracing` subscriber.
	#[must_use]
	pub fn tracing() -> Self {
		Self::new(Arc::new(TracingSink))
	}

	/// Normalizes `raw` using `hint`'s token and writes it at `level`.
	///
	/// # Errors
	///
	/// Returns the sink's error.
	pub fn forward(
		&self,
		level: HostLevel,
		hint: PluginLevel,
		raw: &str,
		source: LogSource,
	) -> Result<Forwarded, SinkError> {
		self.write(level, normalize(raw, hint), source)
	}

	/// Writes `text` as-is at `level`; for lines with no recognizable layout.
	///
	/// # Errors
	///
	/// Returns the sink's error.
	pub fn forward_plain(
		&self,
		level: HostLevel,
		text: &str,
		source: LogSource,
	) -> Result<Forwarded, SinkError> {
		self.write(level, text.trim().to_owned(), source)
	}

	fn write(
		&self,
		level: HostLevel,
		message: String,
		source: LogSource,
	) -> Result<Forwarded, SinkError> {
		if is_stream_closed(&message) {
			return Ok(Forwarded::Suppressed);
		}
		self.sink.write(&LogRecord {
			level,
			source,
			message,
		})?;
		Ok(Forwarded::Written)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::STREAM_CLOSED_DIAGNOSTIC;
	use crate::test_helpers::RecordingSink;

	#[test]
	fn forwards_normalized_record() {
		let sink = Arc::new(RecordingSink::default());
		let bridge = LogBridge::new(sink.clone());
		let outcome = bridge
			.forward(
				HostLevel::Info,
				PluginLevel::Info,
				"2024-01-01T00:00:00Z [INFO]  plugin: hello",
				LogSource::Reverse,
			)
			.expect("write");
		assert_eq!(outcome, Forwarded::Written);
		assert_eq!(
			sink.records(),
			vec![LogRecord {
				level: HostLevel::Info,
				source: LogSource::Reverse,
				message: "hello".into(),
			}]
		);
	}

	#[test]
	fn shutdown_diagnostic_never_reaches_the_sink() {
		let sink = Arc::new(RecordingSink::default());
		let bridge = LogBridge::new(sink.clone());
		let raw = format!("2024-01-01T00:00:00Z [DEBUG] plugin: {STREAM_CLOSED_DIAGNOSTIC}");

		let outcome = bridge
			.forward(HostLevel::Debug, PluginLevel::Debug, &raw, LogSource::Stderr)
			.expect("write");
		assert_eq!(outcome, Forwarded::Suppressed);
		let outcome = bridge
			.forward_plain(HostLevel::Debug, STREAM_CLOSED_DIAGNOSTIC, LogSource::Stderr)
			.expect("write");
		assert_eq!(outcome, Forwarded::Suppressed);
		assert_eq!(sink.write_calls(), 0);
	}

	#[test]
	fn plain_lines_are_only_trimmed() {
		let sink = Arc::new(RecordingSink::default());
		let bridge = LogBridge::new(sink.clone());
		bridge
			.forward_plain(HostLevel::Debug, "  [INFO] looks tagged \n", LogSource::Stderr)
			.expect("write");
		assert_eq!(sink.messages(), vec!["[INFO] looks tagged".to_owned()]);
	}

	#[test]
	fn sink_errors_are_returned() {
		let sink = Arc::new(RecordingSink::default());
		sink.set_failing(true);
		let bridge = LogBridge::new(sink.clone());
		let err = bridge
			.forward(HostLevel::Warn, PluginLevel::Warn, "x [WARN] y", LogSource::Reverse)
			.unwrap_err();
		assert!(matches!(err, SinkError::Closed));
		assert_eq!(sink.write_calls(), 1);
		assert!(sink.records().is_empty());
	}

	#[test]
	fn tracing_sink_accepts_every_level() {
		let bridge = LogBridge::tracing();
		for level in [
			HostLevel::Trace,
			HostLevel::Debug,
			HostLevel::Info,
			HostLevel::Warn,
			HostLevel::Error,
			HostLevel::Fatal,
			HostLevel::Panic,
			HostLevel::NoLevel,
			HostLevel::Disabled,
		] {
			let outcome = bridge
				.forward_plain(level, "message", LogSource::Reverse)
				.expect("tracing sink never fails");
			assert_eq!(outcome, Forwarded::Written);
		}
	}
}
