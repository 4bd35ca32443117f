//! Recovery of the authored message from a rendered plugin log line.
//!
//! Lines relayed through more than one formatting layer arrive with the
//! `{timestamp} [LEVEL]` prefix and the `plugin:` tag repeated:
//!
//! ```text
//! 2023-11-15T10:54:22Z [DEBUG] plugin: 2023-11-15T10:54:22Z [DEBUG] plugin: address: network=unix
//! ```
//!
//! [`normalize`] peels every layer off, leaving `address: network=unix`.
//!
//! The level token is searched anywhere in the text, so a payload that itself
//! contains the token (`"retrying DEBUG endpoint"` at debug level) loses
//! everything up to it. Callers relying on exact payloads should log at a
//! level whose token does not occur in the message.

use crate::level::PluginLevel;

/// Diagnostic the plugin transport emits when the host tears the connection
/// down. It is expected on every shutdown and never forwarded.
pub const STREAM_CLOSED_DIAGNOSTIC: &str =
	"received EOF, stopping recv loop: err=\"transport closed: EOF\"";

/// Source tag written after the level by the plugin line layout.
const SOURCE_TAG: &str = "plugin:";

/// Strips every `{anything} LEVEL?` prefix and the `plugin:` tag that follows
/// it, using `hint`'s uppercase token as the level marker.
///
/// Text without the token is returned unchanged.
#[must_use]
pub fn normalize(raw: &str, hint: PluginLevel) -> String {
	let token = hint.token();
	let mut text = raw;

	while text.len() >= token.len() {
		let Some(pos) = text.find(token) else {
			break;
		};
		// Drop the token and the one character closing it (`]` or a space).
		let rest = &text[pos + token.len()..];
		let closer = rest.chars().next().map_or(0, char::len_utf8);
		text = strip_source_tag(rest[closer..].trim());
	}

	text.to_owned()
}

/// Removes a leading case-insensitive `plugin:` tag.
fn strip_source_tag(text: &str) -> &str {
	match text.get(..SOURCE_TAG.len()) {
		Some(head) if head.eq_ignore_ascii_case(SOURCE_TAG) => text[SOURCE_TAG.len()..].trim(),
		_ => text,
	}
}

/// Returns true for the benign shutdown diagnostic.
#[must_use]
pub fn is_stream_closed(message: &str) -> bool {
	message == STREAM_CLOSED_DIAGNOSTIC
}
