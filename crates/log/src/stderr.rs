//! Forwarding of a plugin's captured stderr.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::LogBridge;
use crate::level::{HostLevel, PluginLevel, to_host_severity};
use crate::sink::LogSource;

/// Spawns a task that forwards each stderr line through `bridge`.
///
/// Invalid UTF-8 is replaced, never fatal. ANSI escapes are stripped. Lines carrying a recognizable level are
/// normalized and written at the translated level; anything else is written
/// as-is at debug. The task ends at EOF, on a read error or on `cancel`.
pub fn spawn_stderr_forwarder<R>(
	stream: R,
	bridge: LogBridge,
	cancel: CancellationToken,
) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		let mut reader = BufReader::new(stream);
		let mut line = Vec::new();
		loop {
			tokio::select! {
				biased;

				() = cancel.cancelled() => {
					debug!("plugin stderr forwarder cancelled");
					break;
				}

				result = reader.read_until(b'\n', &mut line) => match result {
					Ok(0) => {
						debug!("plugin stderr closed");
						break;
					}
					Ok(_) => {
						forward_line(&bridge, &String::from_utf8_lossy(&line));
						line.clear();
					}
					Err(error) => {
						warn!(%error, "plugin stderr read error");
						break;
					}
				},
			}
		}
	})
}

fn forward_line(bridge: &LogBridge, line: &str) {
	let line = strip_ansi_escapes::strip_str(line);
	let line = line.trim_end();
	if line.is_empty() {
		return;
	}

	let result = match PluginLevel::detect(line) {
		Some(hint) => bridge.forward(to_host_severity(hint.wire()), hint, line, LogSource::Stderr),
		None => bridge.forward_plain(HostLevel::Debug, line, LogSource::Stderr),
	};
	if let Err(error) = result {
		warn!(%error, "dropping plugin stderr line");
	}
}
