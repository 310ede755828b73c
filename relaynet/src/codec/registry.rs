use indexmap::IndexMap;

use crate::codec::wire::{encode_message, BoxedMessage, Message};
use crate::cursor::ByteCursor;
use crate::error::TransportError;

type DecodeFn = fn(&mut ByteCursor) -> Result<BoxedMessage, TransportError>;

#[derive(Debug)]
struct Definition {
    name: &'static str,
    type_id: u8,
    decode: DecodeFn,
}

/// Maps numeric type id <-> message definition <-> symbolic name.
/// Uniqueness is enforced on both axes; `add` rejects duplicates of either.
///
/// A registry is process-scoped by default (see
/// [`crate::codec::builtin::global_registry`]) but may be constructed
/// explicitly, as here, to isolate a namespace (tests, or an application
/// that wants its own id space).
#[derive(Debug)]
pub struct MessageRegistry {
    by_id: IndexMap<u8, Definition>,
    by_name: IndexMap<String, u8>,
}

impl MessageRegistry {
    pub fn new() -> MessageRegistry {
        MessageRegistry { by_id: IndexMap::new(), by_name: IndexMap::new() }
    }

    /// Registers message type `T`. Fails if either its type id or its name
    /// is already present in this registry.
    pub fn add<T: Message>(&mut self) -> Result<(), TransportError> {
        if self.by_id.contains_key(&T::TYPE_ID) {
            return Err(TransportError::Message(format!(
                "a message is already registered with id {}",
                T::TYPE_ID
            )));
        }
        if self.by_name.contains_key(T::NAME) {
            return Err(TransportError::Message(format!("message type {} already in registry", T::NAME)));
        }

        let decode: DecodeFn = |cursor| {
            let message = T::decode_fields(cursor)?;
            Ok(Box::new(message) as BoxedMessage)
        };

        self.by_id.insert(T::TYPE_ID, Definition { name: T::NAME, type_id: T::TYPE_ID, decode });
        self.by_name.insert(T::NAME.to_string(), T::TYPE_ID);
        Ok(())
    }

    pub fn get_by_id(&self, id: u8) -> Result<&'static str, TransportError> {
        self.by_id.get(&id).map(|def| def.name).ok_or_else(|| Self::no_such_id(id))
    }

    pub fn get_by_name(&self, name: &str) -> Result<u8, TransportError> {
        self.by_name.get(name).copied().ok_or_else(|| Self::no_such_name(name))
    }

    /// Decodes a message body (type id already consumed) given its type id.
    pub fn decode(&self, type_id: u8, cursor: &mut ByteCursor) -> Result<BoxedMessage, TransportError> {
        let def = self.by_id.get(&type_id).ok_or_else(|| Self::no_such_id(type_id))?;
        (def.decode)(cursor)
    }

    /// Encodes a fully typed message using this registry's knowledge only
    /// to validate that `T` is registered; the bytes come straight from
    /// `T`'s own field encoder.
    pub fn encode<T: Message>(&self, message: &T) -> Result<Vec<u8>, TransportError> {
        self.get_by_id(T::TYPE_ID)?;
        encode_message(message)
    }

    /// True if `instance` is a registered instance of the message named
    /// `name`.
    pub fn is_a(&self, instance: &dyn crate::codec::wire::AnyMessage, name: &str) -> bool {
        match self.by_name.get(name) {
            Some(&id) => instance.type_id() == id,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn no_such_id(id: u8) -> TransportError {
        TransportError::Message(format!("no message exists with id {id}"))
    }

    fn no_such_name(name: &str) -> TransportError {
        TransportError::Message(format!("no message exists with name {name}"))
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        MessageRegistry::new()
    }
}
