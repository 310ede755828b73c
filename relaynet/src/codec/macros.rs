/// Declares a [`crate::codec::wire::Message`] struct in one place: name,
/// wire type id, wire name, and fields. Mirrors how `legume.udp.messages`
/// declares a `MessageValue` subclass as a flat list of `(name, type)`
/// pairs instead of hand-writing a reader and a writer that have to be kept
/// in sync by hand.
///
/// ```ignore
/// define_message! {
///     ConnectRequest, id = 1, name = "ConnectRequest" => {
///         protocol: U8,
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_message {
    (
        $(#[$meta:meta])*
        $name:ident, id = $id:literal, name = $wire_name:literal => {
            $( $field:ident : $ftype:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $( pub $field: <$ftype as $crate::codec::wire::WireField>::Value ),*
        }

        impl $crate::codec::wire::Message for $name {
            const TYPE_ID: u8 = $id;
            const NAME: &'static str = $wire_name;

            fn encode_fields(&self, out: &mut Vec<u8>) -> Result<(), $crate::error::TransportError> {
                $( <$ftype as $crate::codec::wire::WireField>::write(out, &self.$field)?; )*
                Ok(())
            }

            fn decode_fields(cursor: &mut $crate::cursor::ByteCursor) -> Result<Self, $crate::error::TransportError> {
                Ok($name {
                    $( $field: <$ftype as $crate::codec::wire::WireField>::read(cursor)? ),*
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::codec::wire::{encode_message, Message};
    use crate::cursor::ByteCursor;

    define_message! {
        Probe, id = 250, name = "Probe" => {
            flag: crate::codec::wire::Bool,
            tag: crate::codec::wire::U16,
        }
    }

    #[test]
    fn generated_message_roundtrips_mixed_fields() {
        let probe = Probe { flag: true, tag: 7 };
        let bytes = encode_message(&probe).unwrap();

        let mut cursor = ByteCursor::new(bytes);
        assert_eq!(cursor.read_u8().unwrap(), Probe::TYPE_ID);
        let decoded = Probe::decode_fields(&mut cursor).unwrap();
        assert_eq!(decoded, probe);
    }
}
