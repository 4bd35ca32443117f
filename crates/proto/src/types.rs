//! Wire types for the primary, reverse and multiplexing layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for requests and responses on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Identifier of a multiplexed channel, allocated by the broker.
///
/// Zero is the primary channel; broker allocations start at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrokerId(pub u32);

impl BrokerId {
	/// The channel opened implicitly by the handshake.
	pub const PRIMARY: Self = Self(0);

	/// Returns true for the handshake channel.
	#[must_use]
	pub const fn is_primary(self) -> bool {
		self.0 == 0
	}
}

impl fmt::Display for BrokerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Empty acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Asks the plugin to dial back to the host's reverse log service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
	/// Channel the host is listening on.
	pub broker_id: BrokerId,
}

/// Reads a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
	/// Key to read.
	pub key: String,
}

/// Value read for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
	/// Stored bytes.
	pub value: Vec<u8>,
}

/// Stores a value under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
	/// Key to write.
	pub key: String,
	/// Bytes to store.
	pub value: Vec<u8>,
}

/// One log record sent from the plugin to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
	/// Plugin-side severity ordinal. Values outside the known range are legal.
	pub level: i32,
	/// Formatted message, possibly carrying timestamp and level prefixes.
	pub message: String,
}

/// Calls served by the plugin on the primary channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvCall {
	/// Liveness probe.
	Ping(Empty),
	/// Bootstrap of the reverse log channel.
	Init(InitRequest),
	/// Key lookup.
	Get(GetRequest),
	/// Key store.
	Put(PutRequest),
}

impl KvCall {
	/// Operation name, for diagnostics.
	#[must_use]
	pub const fn method(&self) -> &'static str {
		match self {
			Self::Ping(_) => "Ping",
			Self::Init(_) => "Init",
			Self::Get(_) => "Get",
			Self::Put(_) => "Put",
		}
	}
}

/// Successful results on the primary channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvReply {
	/// Acknowledgement for `Ping`, `Init` and `Put`.
	Empty(Empty),
	/// Result of `Get`.
	Get(GetResponse),
}

/// A request on any channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request<C> {
	/// Correlation id, assigned by the sending loop.
	pub id: RequestId,
	/// The call payload.
	pub call: C,
}

/// A response on any channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response<R> {
	/// The request this responds to.
	pub id: RequestId,
	/// Reply, or the status the handler failed with.
	pub result: Result<R, RpcStatus>,
}

/// A single frame on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame<C, R> {
	/// A call from the peer.
	Request(Request<C>),
	/// A reply from the peer.
	Response(Response<R>),
}

/// Error returned by a remote handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcStatus {
	/// Category of the failure.
	pub code: StatusCode,
	/// Human readable detail.
	pub message: String,
}

impl RpcStatus {
	/// Creates a status with the given code.
	pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}

	/// Handler failed unexpectedly.
	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(StatusCode::Internal, message)
	}

	/// Requested entity does not exist.
	pub fn not_found(message: impl Into<String>) -> Self {
		Self::new(StatusCode::NotFound, message)
	}

	/// Arguments were rejected.
	pub fn invalid_argument(message: impl Into<String>) -> Self {
		Self::new(StatusCode::InvalidArgument, message)
	}

	/// The callee is not in a state to serve the call.
	pub fn failed_precondition(message: impl Into<String>) -> Self {
		Self::new(StatusCode::FailedPrecondition, message)
	}

	/// A dependency of the callee is unreachable.
	pub fn unavailable(message: impl Into<String>) -> Self {
		Self::new(StatusCode::Unavailable, message)
	}

	/// The callee does not serve this call.
	pub fn unimplemented(message: impl Into<String>) -> Self {
		Self::new(StatusCode::Unimplemented, message)
	}
}

/// Status codes for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
	/// Generic internal error.
	Internal,
	/// Entity not found.
	NotFound,
	/// Invalid arguments.
	InvalidArgument,
	/// Callee state does not allow the call.
	FailedPrecondition,
	/// Something the callee needs is unreachable.
	Unavailable,
	/// Call not served.
	Unimplemented,
}

impl fmt::Display for StatusCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Internal => "internal",
			Self::NotFound => "not found",
			Self::InvalidArgument => "invalid argument",
			Self::FailedPrecondition => "failed precondition",
			Self::Unavailable => "unavailable",
			Self::Unimplemented => "unimplemented",
		})
	}
}

/// Connection-level frame multiplexing channels over one byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MuxFrame {
	/// Dialer asks to open channel `id`.
	Open {
		/// Channel being opened.
		id: BrokerId,
	},
	/// Listener accepted channel `id`.
	Accepted {
		/// Channel now open.
		id: BrokerId,
	},
	/// Nobody listens on channel `id`.
	Refused {
		/// Channel that was dialed.
		id: BrokerId,
	},
	/// Bytes for channel `id`.
	Data {
		/// Target channel.
		id: BrokerId,
		/// Payload.
		bytes: Vec<u8>,
	},
	/// Sender finished writing to channel `id`.
	Close {
		/// Channel being half-closed.
		id: BrokerId,
	},
}
