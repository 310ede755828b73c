use byteorder::{BigEndian, WriteBytesExt};

use crate::cursor::ByteCursor;
use crate::error::TransportError;

/// Set when a message participates in the ordering sequence; cleared
/// messages are delivered as soon as they arrive.
pub const FLAG_ORDERED: u8 = 0b01;
/// Set when a message must be retransmitted until acknowledged.
pub const FLAG_RELIABLE: u8 = 0b10;

/// The 5-byte header that precedes every encoded message on the wire.
/// Mirrors `legume.udp.connection._getMessageTransportHeader`'s `'!HHB'`
/// struct: big-endian `u16` message id, `u16` ordered sequence, `u8` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub message_id: u16,
    pub ordered_sequence: u16,
    pub flags: u8,
}

impl TransportHeader {
    pub const WIRE_SIZE: usize = 5;

    pub fn new(message_id: u16, ordered_sequence: u16, ordered: bool, reliable: bool) -> TransportHeader {
        let mut flags = 0u8;
        if ordered {
            flags |= FLAG_ORDERED;
        }
        if reliable {
            flags |= FLAG_RELIABLE;
        }
        TransportHeader { message_id, ordered_sequence, flags }
    }

    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.flags & FLAG_ORDERED != 0
    }

    #[inline]
    pub fn is_reliable(&self) -> bool {
        self.flags & FLAG_RELIABLE != 0
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.write_u16::<BigEndian>(self.message_id).expect("writing to a Vec<u8> cannot fail");
        out.write_u16::<BigEndian>(self.ordered_sequence).expect("writing to a Vec<u8> cannot fail");
        out.push(self.flags);
    }

    pub fn decode(cursor: &mut ByteCursor) -> Result<TransportHeader, TransportError> {
        Ok(TransportHeader {
            message_id: cursor.read_u16()?,
            ordered_sequence: cursor.read_u16()?,
            flags: cursor.read_u8()?,
        })
    }
}
