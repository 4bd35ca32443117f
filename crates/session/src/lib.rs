//! Sessions between a tether host and its plugin.
//!
//! The host drives a [`SessionClient`] over the primary channel. On first use
//! it allocates a broker channel, listens on it with the
//! [`ReverseLogService`], and tells the plugin the channel id with an `Init`
//! call. The plugin's [`SessionServer`] dials that channel back and binds the
//! shared [`PluginLogger`], through which plugin code then logs into the
//! host's stream.

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod logger;
pub mod reverse;
pub mod server;
pub mod service;
pub mod store;

use tether_proto::{KvProtocol, LogProtocol};
use tether_rpc::socket::ProtocolSocket;

pub use client::{SessionClient, SessionConfig};
pub use error::{Error, Result};
pub use logger::{Delivery, PluginLogger};
pub use reverse::{ReverseLogService, serve_reverse_channel};
pub use server::SessionServer;
pub use service::CallerOnly;
pub use store::{KvStore, StoreError};

/// Caller handle on the primary channel.
pub type KvSocket = ProtocolSocket<KvProtocol>;

/// Caller handle on the reverse log channel.
pub type LogSocket = ProtocolSocket<LogProtocol>;
