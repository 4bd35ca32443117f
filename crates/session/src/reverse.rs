//! Host-side service answering the plugin's `Log` calls.

use std::future::{Ready, ready};
use std::task::{Context, Poll};

use tether_log::{LogBridge, LogSource, PluginLevel, to_host_severity};
use tether_proto::{Empty, LogProtocol, LogRequest, Request, RpcStatus};
use tether_rpc::{CounterIdGen, MainLoop};
use tether_transport::PendingChannel;
use tokio::io::BufReader;
use tower_service::Service;
use tracing::{debug, warn};

/// Translates, normalizes and records each entry, then acknowledges it.
///
/// Sink failures are reported as host diagnostics and never fail the call.
#[derive(Debug, Clone)]
pub struct ReverseLogService {
	bridge: LogBridge,
}

impl ReverseLogService {
	/// Service writing through `bridge`.
	#[must_use]
	pub fn new(bridge: LogBridge) -> Self {
		Self { bridge }
	}

	/// Records one entry.
	pub fn log(&self, entry: &LogRequest) {
		let level = to_host_severity(entry.level);
		let hint = PluginLevel::from_wire(entry.level).unwrap_or(PluginLevel::Trace);
		if let Err(error) = self
			.bridge
			.forward(level, hint, &entry.message, LogSource::Reverse)
		{
			warn!(%error, "failed to record plugin log entry");
		}
	}
}

impl Service<Request<LogRequest>> for ReverseLogService {
	type Response = Empty;
	type Error = RpcStatus;
	type Future = Ready<Result<Empty, RpcStatus>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: Request<LogRequest>) -> Self::Future {
		self.log(&req.call);
		ready(Ok(Empty {}))
	}
}

/// Waits for the plugin to dial `pending`, then serves [`ReverseLogService`]
/// on it until the channel closes.
pub async fn serve_reverse_channel(pending: PendingChannel, bridge: LogBridge) {
	let broker_id = pending.id();
	let stream = match pending.accept().await {
		Ok(stream) => stream,
		Err(error) => {
			debug!(%broker_id, %error, "reverse log channel was never dialed");
			return;
		}
	};
	debug!(%broker_id, "reverse log channel accepted");

	let (read, write) = tokio::io::split(stream);
	let (main_loop, _socket) = MainLoop::new(
		|_| ReverseLogService::new(bridge),
		LogProtocol::new(),
		CounterIdGen::new(),
	);
	if let Err(error) = main_loop.run(BufReader::new(read), write).await {
		warn!(%broker_id, %error, "reverse log channel failed");
	}
	debug!(%broker_id, "reverse log channel closed");
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use tether_log::test_helpers::RecordingSink;
	use tether_log::{HostLevel, LogRecord, STREAM_CLOSED_DIAGNOSTIC, render_line};
	use tether_proto::RequestId;

	use super::*;

	fn service() -> (Arc<RecordingSink>, ReverseLogService) {
		let sink = Arc::new(RecordingSink::default());
		(sink.clone(), ReverseLogService::new(LogBridge::new(sink)))
	}

	fn entry(level: i32, message: impl Into<String>) -> Request<LogRequest> {
		Request {
			id: RequestId(1),
			call: LogRequest {
				level,
				message: message.into(),
			},
		}
	}

	#[tokio::test(flavor = "current_thread")]
	async fn entries_are_translated_and_normalized() {
		let (sink, mut service) = service();
		let line = render_line(PluginLevel::Warn, "disk almost full");
		let ack = service
			.call(entry(PluginLevel::Warn.wire(), line))
			.await
			.expect("ack");
		assert_eq!(ack, Empty {});
		assert_eq!(
			sink.records(),
			vec![LogRecord {
				level: HostLevel::Warn,
				source: LogSource::Reverse,
				message: "disk almost full".into(),
			}]
		);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn unknown_levels_are_recorded_at_trace() {
		let (sink, mut service) = service();
		service.call(entry(42, "from the future")).await.expect("ack");
		service.call(entry(-3, "from the past")).await.expect("ack");
		let records = sink.records();
		assert_eq!(records.len(), 2);
		assert!(records.iter().all(|r| r.level == HostLevel::Trace));
		assert_eq!(records[0].message, "from the future");
	}

	#[tokio::test(flavor = "current_thread")]
	async fn unset_level_is_trace_and_off_is_error() {
		let (sink, mut service) = service();
		service.call(entry(0, "unset")).await.expect("ack");
		service.call(entry(6, "off")).await.expect("ack");
		let levels: Vec<HostLevel> = sink.records().iter().map(|r| r.level).collect();
		assert_eq!(levels, [HostLevel::Trace, HostLevel::Error]);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn shutdown_diagnostic_is_acknowledged_but_not_recorded() {
		let (sink, mut service) = service();
		let line = render_line(PluginLevel::Debug, STREAM_CLOSED_DIAGNOSTIC);
		service
			.call(entry(PluginLevel::Debug.wire(), line))
			.await
			.expect("ack");
		assert_eq!(sink.write_calls(), 0);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn sink_failures_still_acknowledge() {
		let (sink, mut service) = service();
		sink.set_failing(true);
		let ack = service.call(entry(3, "lost")).await;
		assert_eq!(ack, Ok(Empty {}));
		assert_eq!(sink.write_calls(), 1);
	}
}
