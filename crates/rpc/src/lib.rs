//! Generic async request/response pump.
//!
//! Every tether channel (the primary plugin channel and each broker-allocated
//! channel) runs one [`MainLoop`] over its byte stream:
//! * `MainLoop`: a tokio-driven message pump dispatching inbound requests to a
//!   [`tower_service::Service`] and correlating responses to outgoing requests
//! * `PeerSocket`: handle used to issue requests through a running loop
//! * `Protocol`: trait binding the pump to a concrete wire format

#![warn(missing_docs)]

pub mod error;
pub mod mainloop;
pub mod protocol;
pub mod socket;

pub use error::{Error, Result};
pub use mainloop::MainLoop;
pub use protocol::{CounterIdGen, Inbound, Protocol};
pub use socket::{MainLoopEvent, PeerSocket};
