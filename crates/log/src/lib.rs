//! Log plumbing between a tether host and its plugin.
//!
//! Plugins log with their own severity scale and line layout. This crate
//! reconciles both with the host:
//! * [`level`]: translation between [`PluginLevel`] and [`HostLevel`]
//! * [`normalize`]: stripping of repeated `{timestamp} [LEVEL] plugin:` prefixes
//! * [`LogBridge`]: normalize, suppress, then write to a [`LogSink`]
//! * [`stderr`]: forwarding of captured plugin stderr lines
//! * [`format`]: the plugin-side line layout

#![warn(missing_docs)]

pub mod bridge;
pub mod format;
pub mod level;
pub mod normalize;
pub mod sink;
pub mod stderr;

#[doc(hidden)]
pub mod test_helpers;

pub use bridge::{Forwarded, LogBridge};
pub use format::{PluginLineFormat, render_line};
pub use level::{HostLevel, ParseLevelError, PluginLevel, to_host_severity, to_plugin_level};
pub use normalize::{STREAM_CLOSED_DIAGNOSTIC, is_stream_closed, normalize};
pub use sink::{LogRecord, LogSink, LogSource, SinkError, TracingSink};
pub use stderr::spawn_stderr_forwarder;
