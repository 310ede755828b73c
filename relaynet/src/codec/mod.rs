//! Wire encoding and the message registry: turning typed Rust structs into
//! the bytes that go out over the socket, and back.

pub mod builtin;
mod macros;
mod registry;
pub mod wire;

pub use registry::MessageRegistry;
pub use wire::{downcast, encode_message, AnyMessage, BoxedMessage, Message, WireField};
pub use wire::{Bool, FixedString, VarString, F64, I32, U16, U8};
