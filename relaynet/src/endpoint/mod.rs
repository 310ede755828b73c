//! [`std::net::UdpSocket`] wrappers that drive the per-peer [`crate::connection::Connection`]
//! engine: [`Client`] talks to exactly one server, [`Server`] accepts and
//! multiplexes many clients over a single bound socket.

mod client;
mod server;

pub use client::{Client, ClientState};
pub use server::{Server, ServerStats};
