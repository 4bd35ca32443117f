//! Binding between the pump and a concrete channel format.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use tokio::io::{AsyncBufRead, AsyncWrite};

/// Monotonic source of request ids for one channel. The first id is 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterIdGen {
	issued: u64,
}

impl CounterIdGen {
	/// A fresh counter.
	#[must_use]
	pub const fn new() -> Self {
		Self { issued: 0 }
	}

	/// Hands out the next id.
	pub fn next_id(&mut self) -> u64 {
		let id = self.issued;
		self.issued = self.issued.wrapping_add(1);
		id
	}

	/// How many ids have been handed out.
	#[must_use]
	pub const fn issued(&self) -> u64 {
		self.issued
	}
}

/// An inbound message, sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<Req, Resp> {
	/// The peer is calling us.
	Request(Req),
	/// The peer is answering one of our calls.
	Response(Resp),
}

/// Describes one kind of channel: how its messages are decoded and encoded,
/// and how requests and responses are told apart and matched up.
///
/// A loop clones its binding once; the clone decodes on the reader task.
pub trait Protocol: Clone + Send + 'static {
	/// Correlates a response with its request.
	type Id: Eq + Hash + Clone + Debug + Send + 'static;
	/// Everything that crosses the channel.
	type Message: Send + 'static;
	/// A call, in either direction.
	type Request: Send + 'static;
	/// A reply, in either direction.
	type Response: Send + 'static;
	/// Value of a successful handler.
	type ReqResult: Send + 'static;
	/// Error of a failing handler; sent back to the caller.
	type ReqError: Send + 'static;
	/// Failure of the channel itself.
	type LoopError: From<std::io::Error> + Send + 'static;
	/// Per-loop id state.
	type IdGen: Send + 'static;

	/// Takes an id for an outgoing request.
	fn next_id(id_gen: &mut Self::IdGen) -> Self::Id;

	/// Reads one message.
	fn decode(
		&mut self,
		input: &mut (impl AsyncBufRead + Unpin + Send),
	) -> impl Future<Output = Result<Self::Message, Self::LoopError>> + Send;

	/// Writes one message, flushing it.
	fn encode(
		&mut self,
		output: &mut (impl AsyncWrite + Unpin + Send),
		msg: &Self::Message,
	) -> impl Future<Output = Result<(), Self::LoopError>> + Send;

	/// Sorts an inbound message.
	fn classify(msg: Self::Message) -> Inbound<Self::Request, Self::Response>;

	/// Id carried by `req`.
	fn request_id(req: &Self::Request) -> Self::Id;

	/// Overwrites the id of an outgoing request.
	fn stamp(req: &mut Self::Request, id: Self::Id);

	/// Id of the request `resp` answers.
	fn response_id(resp: &Self::Response) -> Self::Id;

	/// Reply to request `id` carrying the handler's outcome.
	fn reply(id: Self::Id, outcome: Result<Self::ReqResult, Self::ReqError>) -> Self::Response;

	/// Reply to request `id` whose handler panicked or was cancelled.
	fn handler_failed(id: Self::Id) -> Self::Response;

	/// Message carrying a request.
	fn request_message(req: Self::Request) -> Self::Message;

	/// Message carrying a response.
	fn response_message(resp: Self::Response) -> Self::Message;

	/// Whether `err` only means the peer hung up.
	fn is_disconnect(_err: &Self::LoopError) -> bool {
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counter_is_sequential_from_zero() {
		let mut ids = CounterIdGen::new();
		assert_eq!([ids.next_id(), ids.next_id(), ids.next_id()], [0, 1, 2]);
		assert_eq!(ids.issued(), 3);
	}
}
