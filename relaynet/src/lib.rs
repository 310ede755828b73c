//! A reliable messaging transport layered over UDP: optional per-message
//! retransmission, optional per-connection strict ordering, and a
//! keepalive/ping loop that tracks latency and notices a dead peer.
//!
//! [`codec`] defines the wire format and the message registry that turns
//! bytes back into typed Rust values. [`connection`] is the per-peer
//! reliability engine. [`endpoint`] wraps a [`std::net::UdpSocket`] around
//! one ([`endpoint::Client`]) or many ([`endpoint::Server`]) connections.

pub mod clock;
pub mod codec;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod logging;
pub mod ping;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Message, MessageRegistry};
pub use config::EndpointConfig;
pub use connection::{Connection, ConnectionEvent};
pub use endpoint::{Client, ClientState, Server, ServerStats};
pub use error::{TransportError, TransportResult};
