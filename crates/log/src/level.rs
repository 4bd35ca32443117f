//! Severity scales on both sides of the process boundary.
//!
//! The two enumerations differ in cardinality and in what "no level" means,
//! so they are translated explicitly and never compared by ordinal. Unset
//! and unknown values resolve to the most verbose level.

use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;

/// Severity used by the host's log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostLevel {
	/// Most verbose.
	Trace,
	/// Debugging detail.
	Debug,
	/// Normal operation.
	Info,
	/// Something looks wrong.
	Warn,
	/// An operation failed.
	Error,
	/// The process cannot continue.
	Fatal,
	/// The process is panicking.
	Panic,
	/// No explicit level.
	NoLevel,
	/// Logging turned off.
	Disabled,
}

impl HostLevel {
	/// Lowercase name.
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Trace => "trace",
			Self::Debug => "debug",
			Self::Info => "info",
			Self::Warn => "warn",
			Self::Error => "error",
			Self::Fatal => "fatal",
			Self::Panic => "panic",
			Self::NoLevel => "none",
			Self::Disabled => "disabled",
		}
	}

	/// Maximum `tracing` level enabled when the host runs at this level.
	#[must_use]
	pub const fn level_filter(self) -> LevelFilter {
		match self {
			Self::Trace | Self::NoLevel => LevelFilter::TRACE,
			Self::Debug => LevelFilter::DEBUG,
			Self::Info => LevelFilter::INFO,
			Self::Warn => LevelFilter::WARN,
			Self::Error | Self::Fatal | Self::Panic => LevelFilter::ERROR,
			Self::Disabled => LevelFilter::OFF,
		}
	}
}

impl fmt::Display for HostLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for HostLevel {
	type Err = ParseLevelError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s.trim().to_ascii_lowercase().as_str() {
			"trace" => Self::Trace,
			"debug" => Self::Debug,
			"info" => Self::Info,
			"warn" | "warning" => Self::Warn,
			"error" => Self::Error,
			"fatal" => Self::Fatal,
			"panic" => Self::Panic,
			"" | "none" => Self::NoLevel,
			"disabled" | "off" => Self::Disabled,
			_ => return Err(ParseLevelError(s.to_owned())),
		})
	}
}

/// Severity used by plugins, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PluginLevel {
	/// No explicit level.
	NoLevel = 0,
	/// Most verbose.
	Trace = 1,
	/// Debugging detail.
	Debug = 2,
	/// Normal operation.
	Info = 3,
	/// Something looks wrong.
	Warn = 4,
	/// An operation failed.
	Error = 5,
	/// Logging turned off.
	Off = 6,
}

impl PluginLevel {
	/// Every level, in wire order.
	pub const ALL: [Self; 7] = [
		Self::NoLevel,
		Self::Trace,
		Self::Debug,
		Self::Info,
		Self::Warn,
		Self::Error,
		Self::Off,
	];

	/// Decodes a wire ordinal.
	#[must_use]
	pub const fn from_wire(level: i32) -> Option<Self> {
		Some(match level {
			0 => Self::NoLevel,
			1 => Self::Trace,
			2 => Self::Debug,
			3 => Self::Info,
			4 => Self::Warn,
			5 => Self::Error,
			6 => Self::Off,
			_ => return None,
		})
	}

	/// Wire ordinal.
	#[must_use]
	pub const fn wire(self) -> i32 {
		self as i32
	}

	/// Lowercase name.
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NoLevel => "none",
			Self::Trace => "trace",
			Self::Debug => "debug",
			Self::Info => "info",
			Self::Warn => "warn",
			Self::Error => "error",
			Self::Off => "off",
		}
	}

	/// Uppercase name as it appears in rendered lines.
	#[must_use]
	pub const fn token(self) -> &'static str {
		match self {
			Self::NoLevel => "NONE",
			Self::Trace => "TRACE",
			Self::Debug => "DEBUG",
			Self::Info => "INFO",
			Self::Warn => "WARN",
			Self::Error => "ERROR",
			Self::Off => "OFF",
		}
	}

	/// Maximum `tracing` level a plugin running at this level emits.
	#[must_use]
	pub const fn level_filter(self) -> LevelFilter {
		match self {
			Self::NoLevel | Self::Trace => LevelFilter::TRACE,
			Self::Debug => LevelFilter::DEBUG,
			Self::Info => LevelFilter::INFO,
			Self::Warn => LevelFilter::WARN,
			Self::Error => LevelFilter::ERROR,
			Self::Off => LevelFilter::OFF,
		}
	}

	/// Finds the level a rendered line was written at.
	///
	/// Looks for the earliest bracketed `[LEVEL]` tag first, then for a bare
	/// token in the second whitespace-separated field (`{timestamp} LEVEL ...`).
	#[must_use]
	pub fn detect(line: &str) -> Option<Self> {
		const EMITTED: [PluginLevel; 5] = [
			PluginLevel::Trace,
			PluginLevel::Debug,
			PluginLevel::Info,
			PluginLevel::Warn,
			PluginLevel::Error,
		];

		let bracketed = EMITTED
			.iter()
			.filter_map(|&level| {
				line.find(&format!("[{}]", level.token()))
					.map(|pos| (pos, level))
			})
			.min_by_key(|&(pos, _)| pos)
			.map(|(_, level)| level);
		if bracketed.is_some() {
			return bracketed;
		}

		let second = line.split_whitespace().nth(1)?;
		EMITTED.into_iter().find(|level| level.token() == second)
	}
}

impl fmt::Display for PluginLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PluginLevel {
	type Err = ParseLevelError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let wanted = s.trim();
		Self::ALL
			.into_iter()
			.find(|level| level.as_str().eq_ignore_ascii_case(wanted))
			.ok_or_else(|| ParseLevelError(s.to_owned()))
	}
}

impl From<Level> for PluginLevel {
	fn from(level: Level) -> Self {
		match level {
			Level::TRACE => Self::Trace,
			Level::DEBUG => Self::Debug,
			Level::INFO => Self::Info,
			Level::WARN => Self::Warn,
			_ => Self::Error,
		}
	}
}

/// Unrecognized level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level {0:?}")]
pub struct ParseLevelError(pub String);

/// Translates a plugin wire level into host severity.
///
/// Total: values outside the plugin range resolve to [`HostLevel::Trace`].
#[must_use]
pub const fn to_host_severity(level: i32) -> HostLevel {
	match PluginLevel::from_wire(level) {
		Some(PluginLevel::NoLevel | PluginLevel::Trace) | None => HostLevel::Trace,
		Some(PluginLevel::Debug) => HostLevel::Debug,
		Some(PluginLevel::Info) => HostLevel::Info,
		Some(PluginLevel::Warn) => HostLevel::Warn,
		Some(PluginLevel::Error | PluginLevel::Off) => HostLevel::Error,
	}
}

/// Translates host severity into the level a plugin should run at.
#[must_use]
pub const fn to_plugin_level(level: HostLevel) -> PluginLevel {
	match level {
		HostLevel::NoLevel | HostLevel::Trace => PluginLevel::Trace,
		HostLevel::Debug => PluginLevel::Debug,
		HostLevel::Info => PluginLevel::Info,
		HostLevel::Warn => PluginLevel::Warn,
		HostLevel::Error | HostLevel::Fatal | HostLevel::Panic | HostLevel::Disabled => {
			PluginLevel::Error
		}
	}
}
