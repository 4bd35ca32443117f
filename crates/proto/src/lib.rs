//! Wire protocol shared by the tether host and its plugins.
//!
//! * [`types`]: postcard-encoded messages for the primary and reverse channels
//! * [`codec`]: `u32` little-endian length prefixed frames
//! * [`protocol`]: [`PostcardProtocol`], the [`tether_rpc::Protocol`] binding
//! * [`handshake`]: environment contract and the plugin's first stdout line

#![warn(missing_docs)]

pub mod codec;
pub mod handshake;
pub mod protocol;
pub mod types;

pub use handshake::{HandshakeConfig, HandshakeError, HandshakeLine};
pub use protocol::{KvProtocol, LogProtocol, PostcardProtocol};
pub use types::*;
