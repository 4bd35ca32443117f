//! Plugin-side handle for logging into the host's stream.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tether_log::{PluginLevel, render_line};
use tether_proto::{BrokerId, LogProtocol, LogRequest, Request, RequestId};
use tether_rpc::{CounterIdGen, MainLoop};
use tether_transport::ChannelStream;
use tokio::io::BufReader;
use tracing::{debug, warn};

use crate::LogSocket;
use crate::error::Result;
use crate::service::CallerOnly;

/// What happened to one log call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	/// The host acknowledged the entry.
	Delivered,
	/// No reverse channel exists yet; the entry was discarded.
	Dropped,
}

/// Shared logger bound to the reverse channel once the host sends `Init`.
///
/// Clones share the binding. Entries logged before the binding are dropped.
#[derive(Clone, Default)]
pub struct PluginLogger {
	bound: Arc<OnceLock<Binding>>,
}

struct Binding {
	broker_id: BrokerId,
	socket: LogSocket,
}

impl fmt::Debug for PluginLogger {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PluginLogger")
			.field("broker_id", &self.broker_id())
			.finish()
	}
}

impl PluginLogger {
	/// An unbound logger.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Channel the logger is bound to, if any.
	#[must_use]
	pub fn broker_id(&self) -> Option<BrokerId> {
		self.bound.get().map(|b| b.broker_id)
	}

	/// Binds to an established reverse channel. Returns the channel already
	/// bound if there is one.
	pub(crate) fn bind(&self, broker_id: BrokerId, socket: LogSocket) -> Result<(), BrokerId> {
		self.bound
			.set(Binding { broker_id, socket })
			.map_err(|_| self.broker_id().unwrap_or(broker_id))
	}

	/// Sends one entry to the host and waits for its acknowledgement.
	///
	/// The message travels in the plugin line layout; the host strips it.
	///
	/// # Errors
	///
	/// Fails if the reverse channel is broken or the host rejects the call.
	pub async fn log(&self, level: PluginLevel, message: &str) -> Result<Delivery> {
		let Some(binding) = self.bound.get() else {
			return Ok(Delivery::Dropped);
		};
		let request = Request {
			id: RequestId(0),
			call: LogRequest {
				level: level.wire(),
				message: render_line(level, message),
			},
		};
		binding.socket.request(request).await?.result?;
		Ok(Delivery::Delivered)
	}

	/// Like [`log`](Self::log), reporting failures as local diagnostics.
	pub async fn log_or_warn(&self, level: PluginLevel, message: &str) -> Delivery {
		match self.log(level, message).await {
			Ok(delivery) => delivery,
			Err(error) => {
				warn!(%error, "reverse log call failed");
				Delivery::Dropped
			}
		}
	}
}

/// Starts the calling end of a reverse log channel.
pub(crate) fn spawn_log_client(broker_id: BrokerId, stream: ChannelStream) -> LogSocket {
	let (read, write) = tokio::io::split(stream);
	let (main_loop, socket) = MainLoop::new(
		|_| CallerOnly::default(),
		LogProtocol::new(),
		CounterIdGen::new(),
	);
	tokio::spawn(async move {
		if let Err(error) = main_loop.run(BufReader::new(read), write).await {
			warn!(%broker_id, %error, "reverse log channel failed");
		}
		debug!(%broker_id, "reverse log channel closed");
	});
	socket
}
