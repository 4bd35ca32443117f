//! Handles for talking to a running [`MainLoop`](crate::MainLoop).

use tokio::sync::{mpsc, oneshot};

use crate::protocol::Protocol;
use crate::{Error, Result};

/// Internal events delivered to the main loop.
pub enum MainLoopEvent<M, Req, Resp> {
	/// A fully formed message to write as-is.
	Outgoing(M),
	/// A request to assign an ID to, write, and correlate with its response.
	OutgoingRequest(Req, oneshot::Sender<Resp>),
}

impl<M, Req, Resp> std::fmt::Debug for MainLoopEvent<M, Req, Resp> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Outgoing(_) => f.write_str("Outgoing(..)"),
			Self::OutgoingRequest(..) => f.write_str("OutgoingRequest(..)"),
		}
	}
}

/// Event type used by the loop of protocol `P`.
pub type ProtocolEvent<P> = MainLoopEvent<
	<P as Protocol>::Message,
	<P as Protocol>::Request,
	<P as Protocol>::Response,
>;

/// Socket type handed out by the loop of protocol `P`.
pub type ProtocolSocket<P> =
	PeerSocket<<P as Protocol>::Message, <P as Protocol>::Request, <P as Protocol>::Response>;

/// Cloneable sender side of a main loop.
pub struct PeerSocket<M, Req, Resp> {
	tx: mpsc::UnboundedSender<MainLoopEvent<M, Req, Resp>>,
}

impl<M, Req, Resp> Clone for PeerSocket<M, Req, Resp> {
	fn clone(&self) -> Self {
		Self {
			tx: self.tx.clone(),
		}
	}
}

impl<M, Req, Resp> std::fmt::Debug for PeerSocket<M, Req, Resp> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PeerSocket")
			.field("closed", &self.tx.is_closed())
			.finish()
	}
}

impl<M, Req, Resp> PeerSocket<M, Req, Resp> {
	/// Wraps an existing event sender.
	#[must_use]
	pub fn from_sender(tx: mpsc::UnboundedSender<MainLoopEvent<M, Req, Resp>>) -> Self {
		Self { tx }
	}

	/// Creates a socket whose loop is already gone. Every call fails with
	/// [`Error::ServiceStopped`].
	#[must_use]
	pub fn new_closed() -> Self {
		let (tx, _rx) = mpsc::unbounded_channel();
		Self { tx }
	}

	/// Returns true once the main loop has stopped.
	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}

	/// Queues a raw event for the main loop.
	///
	/// # Errors
	///
	/// Returns [`Error::ServiceStopped`] if the loop is gone.
	pub fn send(&self, event: MainLoopEvent<M, Req, Resp>) -> Result<()> {
		self.tx.send(event).map_err(|_| Error::ServiceStopped)
	}

	/// Sends a request and waits for the correlated response.
	///
	/// The request ID is assigned by the loop; whatever the caller put there
	/// is overwritten.
	///
	/// # Errors
	///
	/// Returns [`Error::ServiceStopped`] if the loop stops before a response
	/// arrives.
	pub async fn request(&self, req: Req) -> Result<Resp> {
		let (resp_tx, resp_rx) = oneshot::channel();
		self.send(MainLoopEvent::OutgoingRequest(req, resp_tx))?;
		resp_rx.await.map_err(|_| Error::ServiceStopped)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(flavor = "current_thread")]
	async fn closed_socket_rejects_calls() {
		let socket = PeerSocket::<(), u32, u32>::new_closed();
		assert!(socket.is_closed());
		assert!(matches!(
			socket.send(MainLoopEvent::Outgoing(())),
			Err(Error::ServiceStopped)
		));
		assert!(matches!(socket.request(1).await, Err(Error::ServiceStopped)));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn dropped_responder_reports_stopped() {
		let (tx, mut rx) = mpsc::unbounded_channel::<MainLoopEvent<(), u32, u32>>();
		let socket = PeerSocket::from_sender(tx);

		let pending = tokio::spawn({
			let socket = socket.clone();
			async move { socket.request(7).await }
		});

		match rx.recv().await {
			Some(MainLoopEvent::OutgoingRequest(req, resp_tx)) => {
				assert_eq!(req, 7);
				drop(resp_tx);
			}
			other => panic!("unexpected event: {other:?}"),
		}

		let result = pending.await.expect("request task panicked");
		assert!(matches!(result, Err(Error::ServiceStopped)));
	}
}
