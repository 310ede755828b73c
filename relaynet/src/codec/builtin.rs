//! The nine control messages every connection speaks regardless of what
//! application messages are registered on top: handshake, keepalive,
//! acknowledgement, and the ping/pong pair the latency sampler rides on.

use lazy_static::lazy_static;
use std::sync::RwLock;

use crate::codec::wire::{I32, U16, U8};
use crate::codec::MessageRegistry;
use crate::define_message;

/// Carries the caller's protocol version; the listener accepts or rejects
/// based on whether it matches its own.
pub const PROTOCOL_VERSION: u8 = 4;

define_message! {
    ConnectRequest, id = 1, name = "ConnectRequest" => {
        protocol: U8,
    }
}

define_message! {
    ConnectRequestAccepted, id = 2, name = "ConnectRequestAccepted" => {}
}

define_message! {
    ConnectRequestRejected, id = 3, name = "ConnectRequestRejected" => {}
}

define_message! {
    KeepAliveRequest, id = 4, name = "KeepAliveRequest" => {
        id: U16,
    }
}

define_message! {
    KeepAliveResponse, id = 5, name = "KeepAliveResponse" => {
        id: U16,
    }
}

define_message! {
    Disconnected, id = 6, name = "Disconnected" => {}
}

/// Acknowledges receipt of a reliable message. `message_to_ack` echoes the
/// acknowledged message's id; it is carried as a signed field because the
/// sender's id counter wraps through `u16` and we do not want the ack
/// payload itself to collide with a sentinel value.
define_message! {
    MessageAck, id = 7, name = "MessageAck" => {
        message_to_ack: I32,
    }
}

define_message! {
    Ping, id = 8, name = "Ping" => {
        id: U16,
    }
}

define_message! {
    Pong, id = 9, name = "Pong" => {
        id: U16,
    }
}

/// Builds a fresh [`MessageRegistry`] seeded with just the nine control
/// messages, for callers that want an isolated registry (tests, or an
/// application that does not want to share the process-global one) rather
/// than [`with_global_registry`].
pub fn registry_with_builtins() -> MessageRegistry {
    let mut registry = MessageRegistry::new();
    seed_builtins(&mut registry);
    registry
}

fn seed_builtins(registry: &mut MessageRegistry) {
    registry.add::<ConnectRequest>().expect("built-in registration cannot collide");
    registry.add::<ConnectRequestAccepted>().expect("built-in registration cannot collide");
    registry.add::<ConnectRequestRejected>().expect("built-in registration cannot collide");
    registry.add::<KeepAliveRequest>().expect("built-in registration cannot collide");
    registry.add::<KeepAliveResponse>().expect("built-in registration cannot collide");
    registry.add::<Disconnected>().expect("built-in registration cannot collide");
    registry.add::<MessageAck>().expect("built-in registration cannot collide");
    registry.add::<Ping>().expect("built-in registration cannot collide");
    registry.add::<Pong>().expect("built-in registration cannot collide");
}

lazy_static! {
    /// The process-scoped default registry, seeded with the nine control
    /// messages at first use. Application code registers its own message
    /// types into this registry (or builds an isolated `MessageRegistry`,
    /// e.g. for tests) before bringing up an endpoint.
    static ref GLOBAL_REGISTRY: RwLock<MessageRegistry> = {
        let mut registry = MessageRegistry::new();
        seed_builtins(&mut registry);
        RwLock::new(registry)
    };
}

/// Registers application message type `T` into the process-scoped registry.
pub fn register<T: crate::codec::wire::Message>() -> Result<(), crate::error::TransportError> {
    GLOBAL_REGISTRY.write().expect("registry lock poisoned").add::<T>()
}

/// Runs `f` with read access to the process-scoped registry.
pub fn with_global_registry<R>(f: impl FnOnce(&MessageRegistry) -> R) -> R {
    f(&GLOBAL_REGISTRY.read().expect("registry lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::wire::{encode_message, Message};
    use crate::cursor::ByteCursor;

    #[test]
    fn global_registry_knows_the_builtins() {
        with_global_registry(|registry| {
            assert_eq!(registry.get_by_name("ConnectRequest").unwrap(), ConnectRequest::TYPE_ID);
            assert_eq!(registry.get_by_name("Pong").unwrap(), Pong::TYPE_ID);
        });
    }

    #[test]
    fn connect_request_roundtrips_through_the_registry() {
        let request = ConnectRequest { protocol: PROTOCOL_VERSION };
        let bytes = encode_message(&request).unwrap();

        let mut cursor = ByteCursor::new(bytes);
        let type_id = cursor.read_u8().unwrap();
        let decoded = with_global_registry(|registry| registry.decode(type_id, &mut cursor)).unwrap();

        let decoded = crate::codec::wire::downcast::<ConnectRequest>(decoded.as_ref()).unwrap();
        assert_eq!(decoded.protocol, PROTOCOL_VERSION);
    }

    #[test]
    fn zero_field_messages_encode_to_just_the_type_id() {
        let bytes = encode_message(&ConnectRequestAccepted {}).unwrap();
        assert_eq!(bytes, vec![ConnectRequestAccepted::TYPE_ID]);
    }
}
