//! Host-side session over the primary channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tether_log::LogBridge;
use tether_proto::{
	BrokerId, Empty, GetRequest, InitRequest, KvCall, KvProtocol, KvReply, PutRequest, Request,
	RequestId,
};
use tether_rpc::{CounterIdGen, MainLoop};
use tether_transport::{Broker, ChannelStream};
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::KvSocket;
use crate::error::{Error, Result};
use crate::reverse::serve_reverse_channel;
use crate::service::CallerOnly;

/// Session tuning.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
	/// Deadline for each primary-channel call. `None` waits indefinitely.
	pub rpc_timeout: Option<Duration>,
}

#[derive(Debug, Default)]
struct SessionState {
	/// The plugin acknowledged `Init`.
	initialized: bool,
	/// Reverse log channel, once listening.
	reverse_channel: Option<BrokerId>,
}

/// The host's end of a plugin session.
///
/// The first `get`/`put` (or an explicit [`initialize`](Self::initialize))
/// stands up the reverse log channel and sends `Init`; both happen once per
/// session no matter how many callers race.
pub struct SessionClient {
	primary: KvSocket,
	broker: Arc<dyn Broker>,
	bridge: LogBridge,
	config: SessionConfig,
	state: Mutex<SessionState>,
}

impl fmt::Debug for SessionClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionClient")
			.field("primary", &self.primary)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

impl SessionClient {
	/// Starts the primary channel loop over `primary`.
	///
	/// Entries the plugin sends over the reverse channel are written through
	/// `bridge`.
	#[must_use]
	pub fn connect(
		primary: ChannelStream,
		broker: Arc<dyn Broker>,
		bridge: LogBridge,
		config: SessionConfig,
	) -> Self {
		let (read, write) = tokio::io::split(primary);
		let (main_loop, socket) = MainLoop::new(
			|_| CallerOnly::default(),
			KvProtocol::new(),
			CounterIdGen::new(),
		);
		tokio::spawn(async move {
			if let Err(error) = main_loop.run(BufReader::new(read), write).await {
				warn!(%error, "primary channel failed");
			}
			debug!("primary channel closed");
		});
		Self::new(socket, broker, bridge, config)
	}

	/// Session over an already running primary channel loop.
	#[must_use]
	pub fn new(
		primary: KvSocket,
		broker: Arc<dyn Broker>,
		bridge: LogBridge,
		config: SessionConfig,
	) -> Self {
		Self {
			primary,
			broker,
			bridge,
			config,
			state: Mutex::new(SessionState::default()),
		}
	}

	/// Liveness probe. Does not initialize the session.
	///
	/// # Errors
	///
	/// Surfaces transport and remote errors unchanged.
	pub async fn ping(&self) -> Result<()> {
		expect_empty("Ping", self.call(KvCall::Ping(Empty {})).await?)
	}

	/// Starts the reverse log channel and sends `Init`, once.
	///
	/// Later and concurrent calls wait for the first and return `Ok` once it
	/// succeeded. A failure leaves the session uninitialized, so the next
	/// call retries `Init` over the already listening channel.
	///
	/// # Errors
	///
	/// Fails if the channel cannot be registered or `Init` fails.
	pub async fn initialize(&self) -> Result<()> {
		let mut state = self.state.lock().await;
		if state.initialized {
			return Ok(());
		}
		let broker_id = self.ensure_reverse_channel(&mut state)?;
		let reply = self.call(KvCall::Init(InitRequest { broker_id })).await?;
		expect_empty("Init", reply)?;
		state.initialized = true;
		info!(%broker_id, "plugin session initialized");
		Ok(())
	}

	/// Registers the reverse log listener, once, and returns its channel.
	///
	/// Never waits for the plugin to connect.
	///
	/// # Errors
	///
	/// Fails if the broker cannot register the listener.
	pub async fn start_reverse_channel(&self) -> Result<BrokerId> {
		let mut state = self.state.lock().await;
		self.ensure_reverse_channel(&mut state)
	}

	/// Reads `key`, initializing the session first if needed.
	///
	/// # Errors
	///
	/// Initialization, transport and store errors.
	pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
		self.initialize().await?;
		let call = KvCall::Get(GetRequest {
			key: key.to_owned(),
		});
		match self.call(call).await? {
			KvReply::Get(reply) => Ok(reply.value),
			KvReply::Empty(_) => Err(Error::UnexpectedReply("Get")),
		}
	}

	/// Stores `value` under `key`, initializing the session first if needed.
	///
	/// # Errors
	///
	/// Initialization, transport and store errors.
	pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		self.initialize().await?;
		let call = KvCall::Put(PutRequest {
			key: key.to_owned(),
			value,
		});
		expect_empty("Put", self.call(call).await?)
	}

	/// Whether `Init` has succeeded.
	pub async fn is_initialized(&self) -> bool {
		self.state.lock().await.initialized
	}

	/// The reverse log channel, once started.
	pub async fn reverse_channel_id(&self) -> Option<BrokerId> {
		self.state.lock().await.reverse_channel
	}

	fn ensure_reverse_channel(&self, state: &mut SessionState) -> Result<BrokerId> {
		if let Some(id) = state.reverse_channel {
			return Ok(id);
		}
		let id = self.broker.next_id();
		let pending = self.broker.listen(id)?;
		tokio::spawn(serve_reverse_channel(pending, self.bridge.clone()));
		state.reverse_channel = Some(id);
		debug!(broker_id = %id, "reverse log channel listening");
		Ok(id)
	}

	async fn call(&self, call: KvCall) -> Result<KvReply> {
		let method = call.method();
		let pending = self.primary.request(Request {
			id: RequestId(0),
			call,
		});
		let response = match self.config.rpc_timeout {
			Some(limit) if !limit.is_zero() => tokio::time::timeout(limit, pending)
				.await
				.map_err(|_| Error::Timeout(method))??,
			_ => pending.await?,
		};
		Ok(response.result?)
	}
}

fn expect_empty(method: &'static str, reply: KvReply) -> Result<()> {
	match reply {
		KvReply::Empty(_) => Ok(()),
		KvReply::Get(_) => Err(Error::UnexpectedReply(method)),
	}
}
