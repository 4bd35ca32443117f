//! Connection layer between a tether host and a plugin process.
//!
//! * [`launcher`]: spawns the plugin, captures its stderr, checks its handshake
//! * [`serve`]: the plugin's half of the handshake
//! * [`Mux`]: independent byte channels over the plugin's stdio
//! * [`Broker`]: allocation and rendezvous of additional channels

#![warn(missing_docs)]

pub mod broker;
pub mod error;
pub mod launcher;
pub mod mux;
pub mod serve;

pub use broker::{Broker, MuxBroker};
pub use error::{Error, Result};
pub use launcher::{LaunchConfig, PluginClient};
pub use mux::{ChannelStream, Connection, Mux, PendingChannel, Side};
pub use serve::{check_environment, serve, serve_stdio};
