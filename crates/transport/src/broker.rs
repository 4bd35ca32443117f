//! Allocation and rendezvous of broker channels.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tether_proto::BrokerId;

use crate::error::Result;
use crate::mux::{ChannelStream, Mux, PendingChannel};

/// Opens additional channels to the peer.
///
/// One side allocates an id and listens on it, tells the peer the id over an
/// existing channel, and the peer dials it.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
	/// Allocates a fresh channel id. Ids are never reused.
	fn next_id(&self) -> BrokerId;

	/// Registers a listener on `id`. The registration is in place when this
	/// returns, so the id may be handed to the peer right away.
	///
	/// # Errors
	///
	/// Fails if `id` is in use or the connection is gone.
	fn listen(&self, id: BrokerId) -> Result<PendingChannel>;

	/// Connects to the peer's listener on `id`.
	///
	/// # Errors
	///
	/// Fails if the peer does not listen on `id` or the connection is gone.
	async fn dial(&self, id: BrokerId) -> Result<ChannelStream>;
}

/// [`Broker`] over a [`Mux`], allocating ids from a counter starting at 1.
#[derive(Debug)]
pub struct MuxBroker {
	mux: Mux,
	next: AtomicU32,
}

impl MuxBroker {
	/// Creates a broker for `mux`.
	#[must_use]
	pub fn new(mux: Mux) -> Self {
		Self {
			mux,
			next: AtomicU32::new(1),
		}
	}
}

#[async_trait]
impl Broker for MuxBroker {
	fn next_id(&self) -> BrokerId {
		BrokerId(self.next.fetch_add(1, Ordering::Relaxed))
	}

	fn listen(&self, id: BrokerId) -> Result<PendingChannel> {
		self.mux.listen(id)
	}

	async fn dial(&self, id: BrokerId) -> Result<ChannelStream> {
		self.mux.dial(id).await
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;
	use crate::mux::Side;

	#[tokio::test(flavor = "current_thread")]
	async fn ids_start_at_one_and_increase() {
		let (a, _b) = tokio::io::duplex(1024);
		let (read, write) = tokio::io::split(a);
		let (mux, _primary) = Mux::new(read, write, Side::Host);
		let broker = MuxBroker::new(mux);

		let ids: Vec<BrokerId> = (0..100).map(|_| broker.next_id()).collect();
		assert_eq!(ids[0], BrokerId(1));
		assert!(ids.windows(2).all(|w| w[0] < w[1]));
		assert!(!ids.contains(&BrokerId::PRIMARY));
		assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
	}
}
