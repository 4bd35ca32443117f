//! The line layout plugins write to stderr and over the reverse channel.
//!
//! ```text
//! 2024-03-01T08:00:00.000+0100 [INFO]  plugin: stored key foo
//! ```

use std::fmt;

use chrono::Local;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::level::PluginLevel;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Writes `{timestamp} [LEVEL] name: ` with the level tag padded to a fixed width.
fn write_prefix(w: &mut impl fmt::Write, level: PluginLevel, name: &str) -> fmt::Result {
	let tag = format!("[{}]", level.token());
	write!(w, "{} {tag:<7} {name}: ", Local::now().format(TIMESTAMP_FORMAT))
}

/// Renders one message in the plugin layout, without a trailing newline.
#[must_use]
pub fn render_line(level: PluginLevel, message: &str) -> String {
	let mut line = String::with_capacity(message.len() + 48);
	// Writing into a String cannot fail.
	let _ = write_prefix(&mut line, level, "plugin");
	line.push_str(message);
	line
}

/// `tracing-subscriber` event formatter producing the plugin layout.
#[derive(Debug, Clone)]
pub struct PluginLineFormat {
	name: &'static str,
}

impl Default for PluginLineFormat {
	fn default() -> Self {
		Self { name: "plugin" }
	}
}

impl PluginLineFormat {
	/// Formatter tagging lines with `name` instead of `plugin`.
	#[must_use]
	pub const fn named(name: &'static str) -> Self {
		Self { name }
	}
}

impl<S, N> FormatEvent<S, N> for PluginLineFormat
where
	S: Subscriber + for<'a> LookupSpan<'a>,
	N: for<'a> FormatFields<'a> + 'static,
{
	fn format_event(
		&self,
		ctx: &FmtContext<'_, S, N>,
		mut writer: Writer<'_>,
		event: &Event<'_>,
	) -> fmt::Result {
		write_prefix(&mut writer, PluginLevel::from(*event.metadata().level()), self.name)?;
		ctx.field_format().format_fields(writer.by_ref(), event)?;
		writeln!(writer)
	}
}

#[cfg(test)]
mod tests {
	use std::io;
	use std::sync::Arc;

	use parking_lot::Mutex;
	use tracing_subscriber::fmt::MakeWriter;

	use super::*;
	use crate::normalize::normalize;

	#[derive(Clone, Default)]
	struct Captured(Arc<Mutex<Vec<u8>>>);

	impl io::Write for Captured {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	impl<'a> MakeWriter<'a> for Captured {
		type Writer = Captured;

		fn make_writer(&'a self) -> Self::Writer {
			self.clone()
		}
	}

	#[test]
	fn rendered_line_normalizes_back_to_the_message() {
		for level in [
			PluginLevel::Trace,
			PluginLevel::Debug,
			PluginLevel::Info,
			PluginLevel::Warn,
			PluginLevel::Error,
		] {
			let line = render_line(level, "value stored");
			assert!(line.contains(&format!("[{}]", level.token())), "{line}");
			assert_eq!(PluginLevel::detect(&line), Some(level));
			assert_eq!(normalize(&line, level), "value stored");
		}
	}

	#[test]
	fn formatter_writes_the_plugin_layout() {
		let captured = Captured::default();
		let subscriber = tracing_subscriber::fmt()
			.with_ansi(false)
			.event_format(PluginLineFormat::default())
			.with_writer(captured.clone())
			.finish();

		tracing::subscriber::with_default(subscriber, || {
			tracing::warn!(key = "foo", "write slow");
		});

		let out = String::from_utf8(captured.0.lock().clone()).expect("utf8");
		let line = out.lines().next().expect("one line");
		assert!(line.contains(" [WARN]  plugin: "), "{line}");
		assert_eq!(PluginLevel::detect(line), Some(PluginLevel::Warn));
		assert_eq!(normalize(line, PluginLevel::Warn), "write slow key=\"foo\"");
	}
}
