//! Channel multiplexing over a single byte stream.
//!
//! Every channel is exposed as a [`ChannelStream`], an in-memory duplex pipe
//! whose far end is pumped to and from [`MuxFrame::Data`] frames. Channel
//! [`BrokerId::PRIMARY`] exists from the start; other channels are opened by
//! one side listening on an id and the other side dialing it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tether_log::STREAM_CLOSED_DIAGNOSTIC;
use tether_proto::codec;
use tether_proto::{BrokerId, MuxFrame};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::broker::MuxBroker;
use crate::error::{Error, Result};

/// Local end of a multiplexed channel.
pub type ChannelStream = DuplexStream;

/// Which end of the plugin connection a multiplexer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	/// The process that launched the plugin.
	Host,
	/// The plugin process.
	Plugin,
}

/// In-memory buffer of each channel pipe.
const CHANNEL_BUFFER: usize = 64 * 1024;

/// Largest payload of a single data frame.
const DATA_CHUNK: usize = 16 * 1024;

/// A live plugin connection: its multiplexer, broker and primary channel.
#[derive(Debug)]
pub struct Connection {
	/// The multiplexer carrying every channel.
	pub mux: Mux,
	/// Broker for additional channels.
	pub broker: Arc<MuxBroker>,
	/// The channel opened by the handshake.
	pub primary: ChannelStream,
}

impl Connection {
	/// Starts multiplexing over `reader`/`writer` as `side`.
	pub fn new<R, W>(reader: R, writer: W, side: Side) -> Self
	where
		R: AsyncRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (mux, primary) = Mux::new(reader, writer, side);
		Self {
			broker: Arc::new(MuxBroker::new(mux.clone())),
			mux,
			primary,
		}
	}
}

/// Handle to a running multiplexer. Cheap to clone.
#[derive(Clone)]
pub struct Mux {
	shared: Arc<Shared>,
}

impl fmt::Debug for Mux {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.shared.state.lock();
		f.debug_struct("Mux")
			.field("open", &state.open.len())
			.field("listening", &state.listening.len())
			.field("dialing", &state.dialing.len())
			.field("closed", &self.shared.closed.is_cancelled())
			.finish()
	}
}

struct Shared {
	side: Side,
	state: Mutex<State>,
	outbound: mpsc::UnboundedSender<MuxFrame>,
	closed: CancellationToken,
}

#[derive(Default)]
struct State {
	/// Inbound byte queues of open channels.
	///
	/// Unbounded so the connection reader never waits on one channel: a
	/// reader that stops draining its channel grows its queue instead of
	/// stalling every other channel, the primary one included.
	open: HashMap<BrokerId, mpsc::UnboundedSender<Vec<u8>>>,
	/// Channels waiting for the peer to dial.
	listening: HashMap<BrokerId, oneshot::Sender<ChannelStream>>,
	/// Channels waiting for the peer to accept.
	dialing: HashMap<BrokerId, oneshot::Sender<Result<ChannelStream>>>,
}

impl Mux {
	/// Starts the connection tasks and returns the primary channel.
	///
	/// Must be called within a tokio runtime.
	pub fn new<R, W>(reader: R, writer: W, side: Side) -> (Self, ChannelStream)
	where
		R: AsyncRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (outbound, outbound_rx) = mpsc::unbounded_channel();
		let shared = Arc::new(Shared {
			side,
			state: Mutex::new(State::default()),
			outbound,
			closed: CancellationToken::new(),
		});
		let primary = shared.attach(BrokerId::PRIMARY);
		tokio::spawn(write_loop(writer, outbound_rx, shared.closed.clone()));
		tokio::spawn(read_loop(reader, shared.clone()));
		(Self { shared }, primary)
	}

	/// Registers interest in channel `id`. Registration is immediate; the
	/// returned handle resolves once the peer dials.
	///
	/// # Errors
	///
	/// Fails if `id` is already open or pending, or the connection is closed.
	pub fn listen(&self, id: BrokerId) -> Result<PendingChannel> {
		let mut state = self.shared.state.lock();
		if self.shared.closed.is_cancelled() {
			return Err(Error::ConnectionClosed);
		}
		if state.open.contains_key(&id) || state.listening.contains_key(&id) {
			return Err(Error::ChannelInUse(id));
		}
		let (tx, rx) = oneshot::channel();
		state.listening.insert(id, tx);
		Ok(PendingChannel { id, rx })
	}

	/// Opens channel `id`, on which the peer must be listening.
	///
	/// # Errors
	///
	/// Returns [`Error::DialRefused`] if the peer has no listener on `id`, or
	/// [`Error::ConnectionClosed`] if the connection ends first.
	pub async fn dial(&self, id: BrokerId) -> Result<ChannelStream> {
		let rx = {
			let mut state = self.shared.state.lock();
			if self.shared.closed.is_cancelled() {
				return Err(Error::ConnectionClosed);
			}
			if state.open.contains_key(&id) || state.dialing.contains_key(&id) {
				return Err(Error::ChannelInUse(id));
			}
			let (tx, rx) = oneshot::channel();
			state.dialing.insert(id, tx);
			rx
		};
		self.shared
			.outbound
			.send(MuxFrame::Open { id })
			.map_err(|_| Error::ConnectionClosed)?;
		rx.await.map_err(|_| Error::ConnectionClosed)?
	}

	/// Stops the connection. Queued frames are still written; every channel
	/// then sees EOF and pending listens and dials fail.
	pub fn close(&self) {
		self.shared.closed.cancel();
	}

	/// Returns true once the connection has ended.
	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.shared.closed.is_cancelled()
	}

	/// Waits until the connection has ended.
	pub async fn closed(&self) {
		self.shared.closed.cancelled().await;
	}
}

/// A registered listen awaiting the peer's dial.
#[derive(Debug)]
pub struct PendingChannel {
	id: BrokerId,
	rx: oneshot::Receiver<ChannelStream>,
}

impl PendingChannel {
	/// Creates a pending channel resolved through `rx`.
	#[must_use]
	pub fn new(id: BrokerId, rx: oneshot::Receiver<ChannelStream>) -> Self {
		Self { id, rx }
	}

	/// The channel being listened on.
	#[must_use]
	pub fn id(&self) -> BrokerId {
		self.id
	}

	/// Waits for the peer to dial.
	///
	/// # Errors
	///
	/// Returns [`Error::ConnectionClosed`] if the connection ends first.
	pub async fn accept(self) -> Result<ChannelStream> {
		self.rx.await.map_err(|_| Error::ConnectionClosed)
	}
}

impl Shared {
	/// Creates the pipe for channel `id` and starts its pumps.
	fn attach(self: &Arc<Self>, id: BrokerId) -> ChannelStream {
		let (local, remote) = tokio::io::duplex(CHANNEL_BUFFER);
		let (remote_read, remote_write) = tokio::io::split(remote);
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		self.state.lock().open.insert(id, inbound_tx);
		tokio::spawn(pump_inbound(id, inbound_rx, remote_write));
		tokio::spawn(pump_outbound(id, remote_read, self.clone()));
		local
	}

	fn dispatch(self: &Arc<Self>, frame: MuxFrame) {
		match frame {
			MuxFrame::Data { id, bytes } => {
				let state = self.state.lock();
				match state.open.get(&id) {
					Some(tx) => {
						let _ = tx.send(bytes);
					}
					None => trace!(%id, len = bytes.len(), "data for unknown channel"),
				}
			}
			MuxFrame::Open { id } => {
				let listener = self.state.lock().listening.remove(&id);
				match listener {
					Some(accept) => {
						let stream = self.attach(id);
						let _ = self.outbound.send(MuxFrame::Accepted { id });
						if accept.send(stream).is_err() {
							debug!(%id, "listener gone before the channel was accepted");
						}
					}
					None => {
						debug!(%id, "refusing dial on channel nobody listens on");
						let _ = self.outbound.send(MuxFrame::Refused { id });
					}
				}
			}
			MuxFrame::Accepted { id } => {
				let dialer = self.state.lock().dialing.remove(&id);
				match dialer {
					Some(tx) => {
						let stream = self.attach(id);
						let _ = tx.send(Ok(stream));
					}
					None => warn!(%id, "accept for a channel we never dialed"),
				}
			}
			MuxFrame::Refused { id } => {
				if let Some(tx) = self.state.lock().dialing.remove(&id) {
					let _ = tx.send(Err(Error::DialRefused(id)));
				}
			}
			MuxFrame::Close { id } => {
				self.state.lock().open.remove(&id);
			}
		}
	}

	/// Ends every channel and fails everything pending.
	fn shutdown(&self) {
		self.closed.cancel();
		let mut state = self.state.lock();
		state.open.clear();
		state.listening.clear();
		for (_, tx) in state.dialing.drain() {
			let _ = tx.send(Err(Error::ConnectionClosed));
		}
	}
}

async fn read_loop<R>(mut reader: R, shared: Arc<Shared>)
where
	R: AsyncRead + Unpin,
{
	loop {
		let frame = tokio::select! {
			biased;

			() = shared.closed.cancelled() => break,
			frame = codec::read_frame::<_, MuxFrame>(&mut reader) => frame,
		};
		match frame {
			Ok(Some(frame)) => shared.dispatch(frame),
			Ok(None) => {
				match shared.side {
					// The host filters this line out of the plugin's stderr.
					Side::Plugin => debug!("{STREAM_CLOSED_DIAGNOSTIC}"),
					Side::Host => debug!("plugin closed the connection"),
				}
				break;
			}
			Err(error) => {
				warn!(%error, "plugin connection read failed");
				break;
			}
		}
	}
	shared.shutdown();
}

async fn write_loop<W>(
	mut writer: W,
	mut outbound: mpsc::UnboundedReceiver<MuxFrame>,
	closed: CancellationToken,
) where
	W: AsyncWrite + Unpin,
{
	loop {
		let frame = tokio::select! {
			biased;

			frame = outbound.recv() => match frame {
				Some(frame) => frame,
				None => break,
			},
			() = closed.cancelled() => break,
		};
		if let Err(error) = codec::write_frame(&mut writer, &frame).await {
			debug!(%error, "plugin connection write failed");
			closed.cancel();
			break;
		}
	}
	let _ = writer.shutdown().await;
}

/// Copies bytes received for channel `id` into its pipe.
async fn pump_inbound(
	id: BrokerId,
	mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
	mut pipe: WriteHalf<DuplexStream>,
) {
	while let Some(bytes) = inbound.recv().await {
		if pipe.write_all(&bytes).await.is_err() {
			trace!(%id, "channel reader dropped");
			break;
		}
	}
	let _ = pipe.shutdown().await;
}

/// Frames bytes written to channel `id` and half-closes it at EOF.
async fn pump_outbound(id: BrokerId, mut pipe: ReadHalf<DuplexStream>, shared: Arc<Shared>) {
	let mut buf = vec![0u8; DATA_CHUNK];
	loop {
		match pipe.read(&mut buf).await {
			Ok(0) | Err(_) => break,
			Ok(n) => {
				let frame = MuxFrame::Data {
					id,
					bytes: buf[..n].to_vec(),
				};
				if shared.outbound.send(frame).is_err() {
					return;
				}
			}
		}
	}
	let _ = shared.outbound.send(MuxFrame::Close { id });
}
