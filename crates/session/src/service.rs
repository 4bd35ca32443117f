//! Request handler for the calling side of a channel.

use std::fmt;
use std::future::{Ready, ready};
use std::marker::PhantomData;
use std::task::{Context, Poll};

use tether_proto::{Request, RpcStatus};
use tower_service::Service;

/// Handler for a channel end that only issues calls; every inbound request
/// is answered with `Unimplemented`.
pub struct CallerOnly<R> {
	_marker: PhantomData<fn() -> R>,
}

impl<R> Default for CallerOnly<R> {
	fn default() -> Self {
		Self {
			_marker: PhantomData,
		}
	}
}

impl<R> fmt::Debug for CallerOnly<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("CallerOnly")
	}
}

impl<C, R> Service<Request<C>> for CallerOnly<R> {
	type Response = R;
	type Error = RpcStatus;
	type Future = Ready<Result<R, RpcStatus>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, _req: Request<C>) -> Self::Future {
		ready(Err(RpcStatus::unimplemented("this end of the channel serves no calls")))
	}
}
