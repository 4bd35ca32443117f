//! Message pump driving one request/response channel.

use std::collections::HashMap;
use std::future::poll_fn;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinSet};
use tower_service::Service;
use tracing::{debug, error, warn};

use crate::protocol::{Inbound, Protocol};
use crate::socket::{MainLoopEvent, PeerSocket, ProtocolEvent, ProtocolSocket};

/// Decoded messages buffered between the reader task and the loop.
const INBOUND_QUEUE: usize = 64;

/// Drives a single channel: serves inbound requests with `S` and correlates
/// responses to requests issued through its [`PeerSocket`].
///
/// Inbound requests are handled concurrently; responses are written in
/// completion order.
pub struct MainLoop<P: Protocol, S> {
	/// The wrapped request handler.
	service: S,
	/// Wire binding used for writing.
	protocol: P,
	/// Generator for outgoing request IDs.
	id_gen: P::IdGen,
	/// Receiver for events queued by sockets.
	rx: mpsc::UnboundedReceiver<ProtocolEvent<P>>,
	/// Pending outgoing requests awaiting responses.
	outgoing: HashMap<P::Id, oneshot::Sender<P::Response>>,
	/// Concurrent request handlers in flight.
	tasks: JoinSet<P::Response>,
	/// Request served by each handler task, for answering failed handlers.
	in_flight: HashMap<task::Id, P::Id>,
}

impl<P, S> MainLoop<P, S>
where
	P: Protocol,
	S: Service<P::Request, Response = P::ReqResult, Error = P::ReqError>,
	S::Future: Send + 'static,
{
	/// Creates a main loop and the socket used to issue requests through it.
	///
	/// The builder receives a socket clone so the service can call back into
	/// its peer.
	#[must_use]
	pub fn new(
		builder: impl FnOnce(ProtocolSocket<P>) -> S,
		protocol: P,
		id_gen: P::IdGen,
	) -> (Self, ProtocolSocket<P>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let socket = PeerSocket::from_sender(tx);
		let this = Self {
			service: builder(socket.clone()),
			protocol,
			id_gen,
			rx,
			outgoing: HashMap::new(),
			tasks: JoinSet::new(),
			in_flight: HashMap::new(),
		};
		(this, socket)
	}

	/// Get a reference to the inner service.
	#[must_use]
	pub fn get_ref(&self) -> &S {
		&self.service
	}

	/// Drive the loop until the peer closes the channel.
	///
	/// Dropping every socket does not stop the loop; it keeps serving inbound
	/// requests until `input` reaches EOF. Requests still waiting for a
	/// response when the loop ends resolve to
	/// [`Error::ServiceStopped`](crate::Error::ServiceStopped).
	///
	/// # Errors
	///
	/// Returns the protocol's loop error when reading or writing fails for a
	/// reason other than a clean disconnect.
	pub async fn run<I, O>(mut self, input: I, mut output: O) -> Result<(), P::LoopError>
	where
		I: AsyncBufRead + Unpin + Send + 'static,
		O: AsyncWrite + Unpin + Send,
	{
		let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_QUEUE);
		let reader = tokio::spawn(read_loop(self.protocol.clone(), input, inbound_tx));
		let mut events_open = true;

		let ret = loop {
			let outbound = tokio::select! {
				biased;

				joined = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => match joined {
					Some(Ok((task, resp))) => {
						self.in_flight.remove(&task);
						Some(P::response_message(resp))
					}
					Some(Err(e)) => match self.in_flight.remove(&e.id()) {
						Some(id) => {
							error!(?id, error = %e, "request handler panicked or was cancelled");
							Some(P::response_message(P::handler_failed(id)))
						}
						None => {
							error!(error = %e, "unknown request handler failed");
							None
						}
					},
					None => None,
				},

				event = self.rx.recv(), if events_open => match event {
					Some(event) => Some(self.dispatch_event(event)),
					None => {
						events_open = false;
						None
					}
				},

				inbound = inbound_rx.recv() => match inbound {
					Some(Ok(msg)) => self.dispatch_message(msg).await,
					Some(Err(e)) => break Err(e),
					None => break Ok(()),
				},
			};

			if let Some(message) = outbound
				&& let Err(e) = self.protocol.encode(&mut output, &message).await
			{
				break Err(e);
			}
		};

		reader.abort();
		let _ = output.shutdown().await;
		ret
	}

	/// Routes an incoming message to the service or to a waiting requester.
	async fn dispatch_message(&mut self, msg: P::Message) -> Option<P::Message> {
		match P::classify(msg) {
			Inbound::Request(req) => {
				let id = P::request_id(&req);
				if let Err(err) = poll_fn(|cx| self.service.poll_ready(cx)).await {
					return Some(P::response_message(P::reply(id, Err(err))));
				}
				let fut = self.service.call(req);
				let handle = self.tasks.spawn({
					let id = id.clone();
					async move { P::reply(id, fut.await) }
				});
				self.in_flight.insert(handle.id(), id);
				None
			}
			Inbound::Response(resp) => {
				let id = P::response_id(&resp);
				match self.outgoing.remove(&id) {
					// The requester may have given up already.
					Some(resp_tx) => {
						let _: Result<_, _> = resp_tx.send(resp);
					}
					None => warn!(?id, "response for unknown request"),
				}
				None
			}
		}
	}

	/// Turns a socket event into the message to write.
	fn dispatch_event(&mut self, event: ProtocolEvent<P>) -> P::Message {
		match event {
			MainLoopEvent::OutgoingRequest(mut req, resp_tx) => {
				let id = P::next_id(&mut self.id_gen);
				P::stamp(&mut req, id.clone());
				self.outgoing.insert(id, resp_tx);
				P::request_message(req)
			}
			MainLoopEvent::Outgoing(msg) => msg,
		}
	}
}

/// Reads messages on a dedicated task so partial reads are never cancelled.
async fn read_loop<P, I>(
	mut protocol: P,
	mut input: I,
	tx: mpsc::Sender<Result<P::Message, P::LoopError>>,
) where
	P: Protocol,
	I: AsyncBufRead + Unpin + Send,
{
	loop {
		match protocol.decode(&mut input).await {
			Ok(msg) => {
				if tx.send(Ok(msg)).await.is_err() {
					break;
				}
			}
			Err(e) if P::is_disconnect(&e) => {
				debug!("peer closed the channel");
				break;
			}
			Err(e) => {
				let _ = tx.send(Err(e)).await;
				break;
			}
		}
	}
}
