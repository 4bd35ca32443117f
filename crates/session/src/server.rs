//! Plugin-side service on the primary channel.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tether_proto::{
	BrokerId, Empty, GetRequest, GetResponse, KvCall, KvProtocol, KvReply, PutRequest, Request,
	RpcStatus,
};
use tether_log::PluginLevel;
use tether_rpc::{CounterIdGen, MainLoop};
use tether_transport::{Broker, ChannelStream};
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tower_service::Service;
use tracing::{debug, info};

use crate::logger::{PluginLogger, spawn_log_client};
use crate::store::KvStore;

/// Serves `Ping`, `Init`, `Get` and `Put` for a [`KvStore`].
///
/// `Init` dials the host's reverse log channel and binds the shared
/// [`PluginLogger`]. Repeating it with the same id is a no-op; a different id
/// is refused.
pub struct SessionServer<S> {
	store: Arc<S>,
	broker: Arc<dyn Broker>,
	logger: PluginLogger,
	init_lock: Arc<Mutex<()>>,
}

impl<S> Clone for SessionServer<S> {
	fn clone(&self) -> Self {
		Self {
			store: self.store.clone(),
			broker: self.broker.clone(),
			logger: self.logger.clone(),
			init_lock: self.init_lock.clone(),
		}
	}
}

impl<S> fmt::Debug for SessionServer<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionServer")
			.field("logger", &self.logger)
			.finish_non_exhaustive()
	}
}

impl<S: KvStore> SessionServer<S> {
	/// Creates the service. `logger` should be the one `store` logs through.
	#[must_use]
	pub fn new(store: Arc<S>, broker: Arc<dyn Broker>, logger: PluginLogger) -> Self {
		Self {
			store,
			broker,
			logger,
			init_lock: Arc::new(Mutex::new(())),
		}
	}

	/// The logger bound by `Init`.
	#[must_use]
	pub fn logger(&self) -> &PluginLogger {
		&self.logger
	}

	/// Serves the primary channel until the host disconnects.
	///
	/// # Errors
	///
	/// Returns the channel error if it breaks instead of closing.
	pub async fn serve(self, primary: ChannelStream) -> Result<(), tether_rpc::Error> {
		let (read, write) = tokio::io::split(primary);
		let (main_loop, _socket) = MainLoop::new(|_| self, KvProtocol::new(), CounterIdGen::new());
		main_loop.run(BufReader::new(read), write).await
	}

	/// Dials the reverse log channel, binds the logger to it and announces
	/// the binding through it.
	///
	/// # Errors
	///
	/// `FailedPrecondition` if bound to another channel, `Unavailable` if the
	/// dial fails.
	pub async fn init(&self, broker_id: BrokerId) -> Result<(), RpcStatus> {
		let _guard = self.init_lock.lock().await;
		match self.logger.broker_id() {
			Some(bound) if bound == broker_id => {
				debug!(%broker_id, "repeated init ignored");
				return Ok(());
			}
			Some(bound) => {
				return Err(RpcStatus::failed_precondition(format!(
					"reverse log channel already bound to {bound}"
				)));
			}
			None => {}
		}

		let stream = self.broker.dial(broker_id).await.map_err(|e| {
			RpcStatus::unavailable(format!("dialing reverse log channel {broker_id}: {e}"))
		})?;
		let socket = spawn_log_client(broker_id, stream);
		self.logger
			.bind(broker_id, socket)
			.map_err(|bound| {
				RpcStatus::failed_precondition(format!("reverse log channel already bound to {bound}"))
			})?;
		info!(%broker_id, "reverse log channel bound");
		self.logger
			.log_or_warn(PluginLevel::Info, &format!("reverse log channel {broker_id} bound"))
			.await;
		Ok(())
	}

	async fn dispatch(self, call: KvCall) -> Result<KvReply, RpcStatus> {
		let empty = KvReply::Empty(Empty {});
		match call {
			KvCall::Ping(_) => {
				self.store.ping().await?;
				Ok(empty)
			}
			KvCall::Init(init) => {
				self.init(init.broker_id).await?;
				Ok(empty)
			}
			KvCall::Get(GetRequest { key }) => {
				let value = self.store.get(&key).await?;
				Ok(KvReply::Get(GetResponse { value }))
			}
			KvCall::Put(PutRequest { key, value }) => {
				self.store.put(&key, value).await?;
				Ok(empty)
			}
		}
	}
}

impl<S: KvStore> Service<Request<KvCall>> for SessionServer<S> {
	type Response = KvReply;
	type Error = RpcStatus;
	type Future = Pin<Box<dyn Future<Output = Result<KvReply, RpcStatus>> + Send>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: Request<KvCall>) -> Self::Future {
		debug!(method = req.call.method(), "plugin call");
		Box::pin(self.clone().dispatch(req.call))
	}
}
