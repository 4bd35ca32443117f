//! [`Protocol`] binding for postcard-framed channels.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tether_rpc::{CounterIdGen, Error, Inbound, Protocol};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::codec;
use crate::types::{Empty, Frame, KvCall, KvReply, LogRequest, Request, RequestId, Response, RpcStatus};

/// Protocol for a channel that carries calls `C` answered with `R`.
pub struct PostcardProtocol<C, R> {
	_marker: PhantomData<fn() -> (C, R)>,
}

/// The primary channel: host calls, plugin answers.
pub type KvProtocol = PostcardProtocol<KvCall, KvReply>;

/// The reverse channel: plugin logs, host acknowledges.
pub type LogProtocol = PostcardProtocol<LogRequest, Empty>;

impl<C, R> PostcardProtocol<C, R> {
	/// Creates the protocol binding.
	#[must_use]
	pub const fn new() -> Self {
		Self {
			_marker: PhantomData,
		}
	}
}

impl<C, R> Default for PostcardProtocol<C, R> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C, R> Clone for PostcardProtocol<C, R> {
	fn clone(&self) -> Self {
		Self::new()
	}
}

impl<C, R> fmt::Debug for PostcardProtocol<C, R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("PostcardProtocol")
	}
}

impl<C, R> Protocol for PostcardProtocol<C, R>
where
	C: Serialize + DeserializeOwned + Send + Sync + 'static,
	R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
	type Id = RequestId;
	type Message = Frame<C, R>;
	type Request = Request<C>;
	type Response = Response<R>;
	type ReqResult = R;
	type ReqError = RpcStatus;
	type LoopError = Error;
	type IdGen = CounterIdGen;

	fn next_id(id_gen: &mut CounterIdGen) -> RequestId {
		RequestId(id_gen.next_id())
	}

	async fn decode(
		&mut self,
		input: &mut (impl AsyncBufRead + Unpin + Send),
	) -> Result<Frame<C, R>, Error> {
		codec::read_frame(input).await?.ok_or(Error::Eof)
	}

	async fn encode(
		&mut self,
		output: &mut (impl AsyncWrite + Unpin + Send),
		msg: &Frame<C, R>,
	) -> Result<(), Error> {
		codec::write_frame(output, msg).await?;
		Ok(())
	}

	fn classify(msg: Frame<C, R>) -> Inbound<Request<C>, Response<R>> {
		match msg {
			Frame::Request(req) => Inbound::Request(req),
			Frame::Response(resp) => Inbound::Response(resp),
		}
	}

	fn request_id(req: &Request<C>) -> RequestId {
		req.id
	}

	fn stamp(req: &mut Request<C>, id: RequestId) {
		req.id = id;
	}

	fn response_id(resp: &Response<R>) -> RequestId {
		resp.id
	}

	fn reply(id: RequestId, result: Result<R, RpcStatus>) -> Response<R> {
		Response { id, result }
	}

	fn handler_failed(id: RequestId) -> Response<R> {
		Response {
			id,
			result: Err(RpcStatus::internal("request handler failed")),
		}
	}

	fn request_message(req: Request<C>) -> Frame<C, R> {
		Frame::Request(req)
	}

	fn response_message(resp: Response<R>) -> Frame<C, R> {
		Frame::Response(resp)
	}

	fn is_disconnect(err: &Error) -> bool {
		err.is_disconnect()
	}
}

#[cfg(test)]
mod tests {
	use std::future::{Future, Ready, ready};
	use std::pin::Pin;
	use std::task::{Context, Poll};

	use tether_rpc::MainLoop;
	use tokio::io::BufReader;
	use tower_service::Service;

	use super::*;
	use crate::types::GetResponse;

	struct Echo;

	impl Service<Request<KvCall>> for Echo {
		type Response = KvReply;
		type Error = RpcStatus;
		type Future = Ready<Result<KvReply, RpcStatus>>;

		fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), RpcStatus>> {
			Poll::Ready(Ok(()))
		}

		fn call(&mut self, req: Request<KvCall>) -> Self::Future {
			ready(match req.call {
				KvCall::Get(get) => Ok(KvReply::Get(GetResponse {
					value: get.key.into_bytes(),
				})),
				other => Err(RpcStatus::unimplemented(other.method())),
			})
		}
	}

	/// Panics inside every handler future.
	struct Crashing;

	impl Service<Request<KvCall>> for Crashing {
		type Response = KvReply;
		type Error = RpcStatus;
		type Future = Pin<Box<dyn Future<Output = Result<KvReply, RpcStatus>> + Send>>;

		fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), RpcStatus>> {
			Poll::Ready(Ok(()))
		}

		fn call(&mut self, req: Request<KvCall>) -> Self::Future {
			Box::pin(async move {
				let method = req.call.method();
				assert!(method.is_empty(), "cannot serve {method}");
				Err(RpcStatus::unimplemented(method))
			})
		}
	}

	#[tokio::test(flavor = "current_thread")]
	async fn kv_calls_cross_a_pipe() {
		let (a, b) = tokio::io::duplex(4096);
		let (a_read, a_write) = tokio::io::split(a);
		let (b_read, b_write) = tokio::io::split(b);

		let (server, _) = MainLoop::new(|_| Echo, KvProtocol::new(), CounterIdGen::new());
		let (client, socket) = MainLoop::new(|_| Echo, KvProtocol::new(), CounterIdGen::new());
		tokio::spawn(server.run(BufReader::new(a_read), a_write));
		tokio::spawn(client.run(BufReader::new(b_read), b_write));

		let resp = socket
			.request(Request {
				id: RequestId(0),
				call: KvCall::Get(crate::GetRequest { key: "abc".into() }),
			})
			.await
			.expect("loop stopped");
		assert_eq!(
			resp.result,
			Ok(KvReply::Get(GetResponse {
				value: b"abc".to_vec()
			}))
		);

		let resp = socket
			.request(Request {
				id: RequestId(0),
				call: KvCall::Ping(Empty {}),
			})
			.await
			.expect("loop stopped");
		let status = resp.result.unwrap_err();
		assert_eq!(status.code, crate::StatusCode::Unimplemented);
		assert_eq!(status.message, "Ping");
	}

	#[tokio::test(flavor = "current_thread")]
	async fn panicking_handler_answers_internal() {
		let (a, b) = tokio::io::duplex(4096);
		let (a_read, a_write) = tokio::io::split(a);
		let (b_read, b_write) = tokio::io::split(b);

		let (server, _) = MainLoop::new(|_| Crashing, KvProtocol::new(), CounterIdGen::new());
		let (client, socket) = MainLoop::new(|_| Echo, KvProtocol::new(), CounterIdGen::new());
		tokio::spawn(server.run(BufReader::new(a_read), a_write));
		tokio::spawn(client.run(BufReader::new(b_read), b_write));

		let resp = socket
			.request(Request {
				id: RequestId(0),
				call: KvCall::Put(crate::PutRequest {
					key: "k".into(),
					value: b"v".to_vec(),
				}),
			})
			.await
			.expect("loop stopped");
		let status = resp.result.unwrap_err();
		assert_eq!(status.code, crate::StatusCode::Internal);
	}
}
