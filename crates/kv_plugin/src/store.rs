//! Key/value store kept as one file per key.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tether_log::PluginLevel;
use tether_session::{KvStore, PluginLogger, StoreError};
use tracing::debug;

/// Prefix of every value file.
const FILE_PREFIX: &str = "kv_";

/// Stores each key in `<dir>/kv_<key>`.
///
/// Values are wrapped as `value [<value>] in tether-kv-plugin` before being
/// written, so a read returns the decorated text.
#[derive(Debug)]
pub struct FileStore {
	dir: PathBuf,
	logger: PluginLogger,
}

impl FileStore {
	/// Store rooted at `dir`, reporting to the host through `logger`.
	pub fn new(dir: impl Into<PathBuf>, logger: PluginLogger) -> Self {
		Self {
			dir: dir.into(),
			logger,
		}
	}

	/// Directory holding the value files.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path(&self, key: &str) -> Result<PathBuf, StoreError> {
		validate_key(key)?;
		Ok(self.dir.join(format!("{FILE_PREFIX}{key}")))
	}
}

fn validate_key(key: &str) -> Result<(), StoreError> {
	let reason = if key.is_empty() {
		"empty"
	} else if key.contains(['/', '\\', '\0']) {
		"contains a path separator"
	} else if key == "." || key == ".." {
		"reserved"
	} else {
		return Ok(());
	};
	Err(StoreError::InvalidKey {
		key: key.to_owned(),
		reason,
	})
}

/// Decorates a stored value.
fn wrap_value(value: &[u8]) -> Vec<u8> {
	format!(
		"value [{}] in {}",
		String::from_utf8_lossy(value),
		env!("CARGO_PKG_NAME")
	)
	.into_bytes()
}

#[async_trait]
impl KvStore for FileStore {
	async fn ping(&self) -> Result<(), StoreError> {
		debug!("got Ping call");
		Ok(())
	}

	async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
		let path = self.path(key)?;
		debug!(path = %path.display(), "got Get call");
		let value = tokio::fs::read(&path).await.map_err(|err| match err.kind() {
			io::ErrorKind::NotFound => StoreError::NotFound(key.to_owned()),
			_ => StoreError::Io(err),
		})?;
		self.logger
			.log_or_warn(PluginLevel::Info, &format!("read {key} ({} bytes)", value.len()))
			.await;
		Ok(value)
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		let path = self.path(key)?;
		debug!(path = %path.display(), "got Put call");
		tokio::fs::write(&path, wrap_value(&value)).await?;
		self.logger
			.log_or_warn(PluginLevel::Info, &format!("stored {key}"))
			.await;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn store(dir: &Path) -> FileStore {
		FileStore::new(dir, PluginLogger::new())
	}

	#[tokio::test(flavor = "current_thread")]
	async fn put_writes_decorated_file() {
		let dir = tempfile::tempdir().expect("tempdir");
		let store = store(dir.path());

		store.put("foo", b"bar".to_vec()).await.expect("put");

		let on_disk = std::fs::read_to_string(dir.path().join("kv_foo")).expect("value file");
		assert_eq!(on_disk, "value [bar] in tether-kv-plugin");
		assert_eq!(store.get("foo").await.expect("get"), on_disk.as_bytes());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn put_overwrites() {
		let dir = tempfile::tempdir().expect("tempdir");
		let store = store(dir.path());
		store.put("k", b"one".to_vec()).await.expect("put");
		store.put("k", b"two".to_vec()).await.expect("put");
		assert_eq!(
			store.get("k").await.expect("get"),
			b"value [two] in tether-kv-plugin"
		);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn missing_key_is_not_found() {
		let dir = tempfile::tempdir().expect("tempdir");
		let err = store(dir.path()).get("nope").await.unwrap_err();
		assert!(matches!(err, StoreError::NotFound(ref key) if key == "nope"));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn keys_cannot_escape_the_directory() {
		let dir = tempfile::tempdir().expect("tempdir");
		let store = store(dir.path());
		for key in ["", "../x", "a/b", "a\\b", ".", ".."] {
			let err = store.put(key, b"v".to_vec()).await.unwrap_err();
			assert!(matches!(err, StoreError::InvalidKey { .. }), "{key:?}");
		}
		assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn missing_directory_is_an_io_error() {
		let dir = tempfile::tempdir().expect("tempdir");
		let store = store(&dir.path().join("absent"));
		let err = store.put("k", b"v".to_vec()).await.unwrap_err();
		assert!(matches!(err, StoreError::Io(_)));
	}
}
