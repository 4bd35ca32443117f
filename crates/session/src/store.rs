//! Business operations served by a plugin.

use std::io;

use async_trait::async_trait;
use tether_proto::RpcStatus;

/// Key/value storage exposed by the plugin.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
	/// Liveness check.
	async fn ping(&self) -> Result<(), StoreError> {
		Ok(())
	}

	/// Reads `key`.
	async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

	/// Stores `value` under `key`.
	async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
}

/// Failures of store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
	/// No value is stored under the key.
	#[error("key {0:?} not found")]
	NotFound(String),
	/// The key cannot be used.
	#[error("invalid key {key:?}: {reason}")]
	InvalidKey {
		/// Rejected key.
		key: String,
		/// Why it was rejected.
		reason: &'static str,
	},
	/// Storage I/O failed.
	#[error("storage failure: {0}")]
	Io(#[from] io::Error),
}

impl From<StoreError> for RpcStatus {
	fn from(err: StoreError) -> Self {
		match err {
			StoreError::NotFound(_) => Self::not_found(err.to_string()),
			StoreError::InvalidKey { .. } => Self::invalid_argument(err.to_string()),
			StoreError::Io(_) => Self::internal(err.to_string()),
		}
	}
}
