#![cfg(unix)]

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tether_log::test_helpers::RecordingSink;
use tether_log::{HostLevel, LogBridge, LogSource, PluginLevel, STREAM_CLOSED_DIAGNOSTIC};
use tether_proto::StatusCode;
use tether_session::{Error, SessionClient, SessionConfig};
use tether_transport::{LaunchConfig, PluginClient};

const PLUGIN: &str = env!("CARGO_BIN_EXE_tether-kv-plugin");

async fn launch(dir: &Path) -> (Arc<RecordingSink>, PluginClient, SessionClient) {
	let sink = Arc::new(RecordingSink::default());
	let mut config = LaunchConfig::new(format!("exec '{PLUGIN}'"));
	config.plugin_level = PluginLevel::Debug;
	config
		.env
		.push(("TETHER_KV_DIR".into(), dir.display().to_string()));

	let (plugin, connection) = PluginClient::launch(config, LogBridge::new(sink.clone()))
		.await
		.expect("launch");
	let session = SessionClient::connect(
		connection.primary,
		connection.broker,
		LogBridge::new(sink.clone()),
		SessionConfig {
			rpc_timeout: Some(Duration::from_secs(10)),
		},
	);
	(sink, plugin, session)
}

fn reverse_messages(sink: &RecordingSink) -> Vec<String> {
	sink.records()
		.into_iter()
		.filter(|r| r.source == LogSource::Reverse)
		.map(|r| r.message)
		.collect()
}

#[tokio::test(flavor = "current_thread")]
async fn put_then_get_through_the_plugin() {
	let dir = tempfile::tempdir().expect("tempdir");
	let (sink, plugin, session) = launch(dir.path()).await;

	session.ping().await.expect("ping");
	session.put("foo", b"bar".to_vec()).await.expect("put");
	let value = session.get("foo").await.expect("get");
	let value = String::from_utf8(value).expect("utf-8");
	assert_eq!(value, "value [bar] in tether-kv-plugin");
	assert!(dir.path().join("kv_foo").exists());

	assert_eq!(
		reverse_messages(&sink),
		[
			"reverse log channel 1 bound",
			"stored foo",
			"read foo (31 bytes)"
		]
	);
	assert!(
		sink.records()
			.iter()
			.filter(|r| r.source == LogSource::Reverse)
			.all(|r| r.level == HostLevel::Info)
	);

	plugin
		.shutdown(Duration::from_secs(5))
		.await
		.expect("shutdown");

	let records = sink.records();
	assert!(records.iter().any(|r| r.source == LogSource::Stderr));
	assert!(records.iter().all(|r| r.message != STREAM_CLOSED_DIAGNOSTIC));
	assert!(records.iter().all(|r| !r.message.contains("[DEBUG]")));
}

#[tokio::test(flavor = "current_thread")]
async fn missing_key_fails_the_call() {
	let dir = tempfile::tempdir().expect("tempdir");
	let (_sink, plugin, session) = launch(dir.path()).await;

	let err = session.get("absent").await.unwrap_err();
	assert!(matches!(err, Error::Remote(ref s) if s.code == StatusCode::NotFound));
	assert!(session.is_initialized().await);

	let err = session.put("../escape", b"x".to_vec()).await.unwrap_err();
	assert!(matches!(err, Error::Remote(ref s) if s.code == StatusCode::InvalidArgument));

	plugin
		.shutdown(Duration::from_secs(5))
		.await
		.expect("shutdown");
}

#[test]
fn refuses_to_run_outside_a_host() {
	let output = Command::new(PLUGIN)
		.env_remove("BASIC_PLUGIN")
		.stdin(Stdio::null())
		.output()
		.expect("run plugin");
	assert_eq!(output.status.code(), Some(1));
	assert!(output.stdout.is_empty());
	let stderr = String::from_utf8_lossy(&output.stderr);
	assert!(stderr.contains("not meant to be executed directly"), "{stderr}");
}

#[test]
fn refuses_unoffered_protocol_versions() {
	let output = Command::new(PLUGIN)
		.env("BASIC_PLUGIN", "hello")
		.env("PLUGIN_PROTOCOL_VERSIONS", "7,8")
		.stdin(Stdio::null())
		.output()
		.expect("run plugin");
	assert_eq!(output.status.code(), Some(1));
	assert!(output.stdout.is_empty());
}
