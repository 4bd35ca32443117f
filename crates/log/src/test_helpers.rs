//! Sinks for tests in this and dependent crates.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::sink::{LogRecord, LogSink, SinkError};

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
	records: Mutex<Vec<LogRecord>>,
	calls: AtomicUsize,
	failing: AtomicBool,
}

impl RecordingSink {
	/// Makes subsequent writes fail with [`SinkError::Closed`].
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	/// Records written so far.
	pub fn records(&self) -> Vec<LogRecord> {
		self.records.lock().clone()
	}

	/// Messages written so far.
	pub fn messages(&self) -> Vec<String> {
		self.records
			.lock()
			.iter()
			.map(|r| r.message.clone())
			.collect()
	}

	/// Number of write attempts, failed ones included.
	pub fn write_calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl LogSink for RecordingSink {
	fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.failing.load(Ordering::SeqCst) {
			return Err(SinkError::Closed);
		}
		self.records.lock().push(record.clone());
		Ok(())
	}
}
