//! Launch contract between host and plugin.
//!
//! The host passes the magic cookie and the protocol versions it speaks in
//! the child environment. The plugin answers with one line on stdout:
//!
//! ```text
//! 1|1|stdio|-|postcard
//! ```
//!
//! core protocol version, app protocol version, network, address and wire
//! protocol. Everything after that line on stdout is multiplexed frames.

use std::fmt;
use std::str::FromStr;

/// Version of the handshake line format itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Version of the key/value application protocol.
pub const PLUGIN_PROTOCOL_VERSION: u32 = 1;

/// Environment key of the magic cookie.
pub const MAGIC_COOKIE_KEY: &str = "BASIC_PLUGIN";

/// Expected value of the magic cookie.
pub const MAGIC_COOKIE_VALUE: &str = "hello";

/// Environment key listing the app protocol versions the host accepts.
pub const PROTOCOL_VERSIONS_ENV: &str = "PLUGIN_PROTOCOL_VERSIONS";

/// Environment key carrying the log level the plugin should emit at.
pub const PLUGIN_LOG_LEVEL_ENV: &str = "TETHER_PLUGIN_LOG_LEVEL";

/// Network field of the handshake line; frames travel over stdio.
pub const NETWORK_STDIO: &str = "stdio";

/// Wire protocol field of the handshake line.
pub const WIRE_PROTOCOL: &str = "postcard";

/// Shared handshake parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
	/// App protocol version both sides must agree on.
	pub protocol_version: u32,
	/// Environment key of the cookie.
	pub magic_cookie_key: &'static str,
	/// Expected cookie value.
	pub magic_cookie_value: &'static str,
}

impl Default for HandshakeConfig {
	fn default() -> Self {
		Self {
			protocol_version: PLUGIN_PROTOCOL_VERSION,
			magic_cookie_key: MAGIC_COOKIE_KEY,
			magic_cookie_value: MAGIC_COOKIE_VALUE,
		}
	}
}

impl HandshakeConfig {
	/// Environment the host sets on the child.
	#[must_use]
	pub fn child_env(&self) -> [(&'static str, String); 2] {
		[
			(self.magic_cookie_key, self.magic_cookie_value.to_owned()),
			(PROTOCOL_VERSIONS_ENV, self.protocol_version.to_string()),
		]
	}

	/// Checks the cookie found in the plugin's environment.
	#[must_use]
	pub fn cookie_matches(&self, value: Option<&str>) -> bool {
		value == Some(self.magic_cookie_value)
	}

	/// Checks whether a comma separated version list offers our version.
	///
	/// A missing list means the host did not negotiate, which is accepted.
	#[must_use]
	pub fn offered(&self, versions: Option<&str>) -> bool {
		let Some(versions) = versions else {
			return true;
		};
		versions
			.split(',')
			.filter_map(|v| v.trim().parse::<u32>().ok())
			.any(|v| v == self.protocol_version)
	}

	/// The line this side prints when serving as a plugin.
	#[must_use]
	pub fn line(&self) -> HandshakeLine {
		HandshakeLine {
			core_version: CORE_PROTOCOL_VERSION,
			app_version: self.protocol_version,
			network: NETWORK_STDIO.to_owned(),
			address: "-".to_owned(),
			protocol: WIRE_PROTOCOL.to_owned(),
		}
	}

	/// Validates a line received from a plugin.
	///
	/// # Errors
	///
	/// Returns the first field that disagrees with this configuration.
	pub fn validate(&self, line: &HandshakeLine) -> Result<(), HandshakeError> {
		if line.core_version != CORE_PROTOCOL_VERSION {
			return Err(HandshakeError::CoreVersion(line.core_version));
		}
		if line.app_version != self.protocol_version {
			return Err(HandshakeError::AppVersion {
				expected: self.protocol_version,
				got: line.app_version,
			});
		}
		if line.network != NETWORK_STDIO {
			return Err(HandshakeError::Network(line.network.clone()));
		}
		if line.protocol != WIRE_PROTOCOL {
			return Err(HandshakeError::Protocol(line.protocol.clone()));
		}
		Ok(())
	}
}

/// The plugin's announcement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
	/// Handshake format version.
	pub core_version: u32,
	/// Negotiated app protocol version.
	pub app_version: u32,
	/// Transport network.
	pub network: String,
	/// Transport address; `-` for stdio.
	pub address: String,
	/// Wire protocol name.
	pub protocol: String,
}

impl fmt::Display for HandshakeLine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}|{}|{}|{}|{}",
			self.core_version, self.app_version, self.network, self.address, self.protocol
		)
	}
}

impl FromStr for HandshakeLine {
	type Err = HandshakeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let line = s.trim_end_matches(['\r', '\n']);
		let malformed = || HandshakeError::Malformed(line.to_owned());
		let parts: Vec<&str> = line.split('|').collect();
		let [core, app, network, address, protocol] = parts.as_slice() else {
			return Err(malformed());
		};
		Ok(Self {
			core_version: core.parse().map_err(|_| malformed())?,
			app_version: app.parse().map_err(|_| malformed())?,
			network: (*network).to_owned(),
			address: (*address).to_owned(),
			protocol: (*protocol).to_owned(),
		})
	}
}

/// Handshake failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
	/// The line does not have the expected shape.
	#[error("unrecognized handshake line {0:?}; is this a tether plugin?")]
	Malformed(String),
	/// Unsupported handshake format.
	#[error("unsupported core protocol version {0}")]
	CoreVersion(u32),
	/// The plugin speaks another app protocol.
	#[error("incompatible plugin version: expected {expected}, plugin speaks {got}")]
	AppVersion {
		/// Version the host wants.
		expected: u32,
		/// Version the plugin announced.
		got: u32,
	},
	/// Unsupported network.
	#[error("unsupported network {0:?}")]
	Network(String),
	/// Unsupported wire protocol.
	#[error("unsupported wire protocol {0:?}")]
	Protocol(String),
}

#[cfg(test)]
mod tests;
