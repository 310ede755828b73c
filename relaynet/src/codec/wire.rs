use byteorder::{BigEndian, WriteBytesExt};
use std::any::Any;
use std::fmt;

use crate::cursor::ByteCursor;
use crate::error::TransportError;

/// A typed, registrable message. Application messages implement this trait
/// directly; the nine built-in control messages in [`crate::codec::builtin`]
/// are ordinary implementors too.
///
/// `TYPE_ID` in `1..=19` is reserved for built-in control messages;
/// `20..=255` is available to applications.
pub trait Message: fmt::Debug + 'static {
    const TYPE_ID: u8;
    const NAME: &'static str;

    /// Writes this message's fields, in declaration order, to `out`. The
    /// leading type-id byte is written by the caller, not here.
    fn encode_fields(&self, out: &mut Vec<u8>) -> Result<(), TransportError>;

    /// Reads this message's fields, in declaration order, from `cursor`.
    /// The type-id byte has already been consumed by the caller.
    fn decode_fields(cursor: &mut ByteCursor) -> Result<Self, TransportError>
    where
        Self: Sized;
}

/// Type-erased view of a [`Message`], used so the connection engine and the
/// application's `on_message` handler can work with any message without
/// knowing its concrete type ahead of time.
pub trait AnyMessage: fmt::Debug {
    fn type_id(&self) -> u8;
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Message> AnyMessage for T {
    #[inline]
    fn type_id(&self) -> u8 {
        T::TYPE_ID
    }

    #[inline]
    fn type_name(&self) -> &'static str {
        T::NAME
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type BoxedMessage = Box<dyn AnyMessage>;

/// Downcasts a boxed, type-erased message back to a concrete [`Message`]
/// type, for callers that know which message they're expecting.
pub fn downcast<T: Message>(message: &dyn AnyMessage) -> Option<&T> {
    message.as_any().downcast_ref::<T>()
}

/// Encodes a full message: the 1-byte type id, followed by its fields.
pub fn encode_message<T: Message>(message: &T) -> Result<Vec<u8>, TransportError> {
    let mut out = Vec::with_capacity(16);
    out.push(T::TYPE_ID);
    message.encode_fields(&mut out)?;
    Ok(out)
}

#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

#[inline]
pub fn write_bool(out: &mut Vec<u8>, value: bool) {
    out.push(value as u8);
}

#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.write_u16::<BigEndian>(value).expect("writing to a Vec<u8> cannot fail");
}

#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.write_i32::<BigEndian>(value).expect("writing to a Vec<u8> cannot fail");
}

#[inline]
pub fn write_f64(out: &mut Vec<u8>, value: f64) {
    out.write_f64::<BigEndian>(value).expect("writing to a Vec<u8> cannot fail");
}

/// Writes exactly `n` bytes: `value`'s UTF-8 bytes, NUL-padded on the right.
/// Rejects values whose encoded length exceeds `n`.
pub fn write_fixed_string(out: &mut Vec<u8>, value: &str, n: usize) -> Result<(), TransportError> {
    let bytes = value.as_bytes();
    if bytes.len() > n {
        return Err(TransportError::Message(format!(
            "fixed string of {} bytes does not fit in {n}-byte field",
            bytes.len()
        )));
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + (n - bytes.len()), 0);
    Ok(())
}

/// Writes a `u16` length prefix followed by `value`'s UTF-8 bytes. Rejects
/// values whose encoded length does not fit in a `u16`.
pub fn write_var_string(out: &mut Vec<u8>, value: &str) -> Result<(), TransportError> {
    let bytes = value.as_bytes();
    let len: u16 = bytes
        .len()
        .try_into()
        .map_err(|_| TransportError::Message(format!("variable string of {} bytes exceeds u16::MAX", bytes.len())))?;
    write_u16(out, len);
    out.extend_from_slice(bytes);
    Ok(())
}

/// A single wire field type, dispatched on at compile time via a marker
/// type rather than a runtime tag. Mirrors how `byteorder::ByteOrder` uses
/// `BigEndian`/`LittleEndian` marker structs to pick an encoding without an
/// enum in the hot path; `define_message!` uses these as the right-hand side
/// of a field declaration.
pub trait WireField {
    type Value: fmt::Debug + Clone + PartialEq;

    fn write(out: &mut Vec<u8>, value: &Self::Value) -> Result<(), TransportError>;
    fn read(cursor: &mut ByteCursor) -> Result<Self::Value, TransportError>;
}

pub struct U8;
pub struct U16;
pub struct I32;
pub struct F64;
pub struct Bool;
pub struct VarString;
/// A NUL-padded string field exactly `N` bytes wide on the wire.
pub struct FixedString<const N: usize>;

impl WireField for U8 {
    type Value = u8;
    fn write(out: &mut Vec<u8>, value: &u8) -> Result<(), TransportError> {
        write_u8(out, *value);
        Ok(())
    }
    fn read(cursor: &mut ByteCursor) -> Result<u8, TransportError> {
        Ok(cursor.read_u8()?)
    }
}

impl WireField for U16 {
    type Value = u16;
    fn write(out: &mut Vec<u8>, value: &u16) -> Result<(), TransportError> {
        write_u16(out, *value);
        Ok(())
    }
    fn read(cursor: &mut ByteCursor) -> Result<u16, TransportError> {
        Ok(cursor.read_u16()?)
    }
}

impl WireField for I32 {
    type Value = i32;
    fn write(out: &mut Vec<u8>, value: &i32) -> Result<(), TransportError> {
        write_i32(out, *value);
        Ok(())
    }
    fn read(cursor: &mut ByteCursor) -> Result<i32, TransportError> {
        Ok(cursor.read_i32()?)
    }
}

impl WireField for F64 {
    type Value = f64;
    fn write(out: &mut Vec<u8>, value: &f64) -> Result<(), TransportError> {
        write_f64(out, *value);
        Ok(())
    }
    fn read(cursor: &mut ByteCursor) -> Result<f64, TransportError> {
        Ok(cursor.read_f64()?)
    }
}

impl WireField for Bool {
    type Value = bool;
    fn write(out: &mut Vec<u8>, value: &bool) -> Result<(), TransportError> {
        write_bool(out, *value);
        Ok(())
    }
    fn read(cursor: &mut ByteCursor) -> Result<bool, TransportError> {
        Ok(cursor.read_bool()?)
    }
}

impl WireField for VarString {
    type Value = String;
    fn write(out: &mut Vec<u8>, value: &String) -> Result<(), TransportError> {
        write_var_string(out, value)
    }
    fn read(cursor: &mut ByteCursor) -> Result<String, TransportError> {
        Ok(cursor.read_var_string()?)
    }
}

impl<const N: usize> WireField for FixedString<N> {
    type Value = String;
    fn write(out: &mut Vec<u8>, value: &String) -> Result<(), TransportError> {
        write_fixed_string(out, value, N)
    }
    fn read(cursor: &mut ByteCursor) -> Result<String, TransportError> {
        Ok(cursor.read_fixed_string(N)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_string_pads_and_rejects_overlong() {
        let mut out = Vec::new();
        write_fixed_string(&mut out, "hi", 5).unwrap();
        assert_eq!(out, vec![b'h', b'i', 0, 0, 0]);

        let mut out = Vec::new();
        let err = write_fixed_string(&mut out, "too long", 3).unwrap_err();
        assert!(matches!(err, TransportError::Message(_)));
    }

    #[test]
    fn var_string_roundtrips() {
        let mut out = Vec::new();
        write_var_string(&mut out, "TEST MESSAGE").unwrap();
        let mut cursor = ByteCursor::new(out);
        assert_eq!(cursor.read_var_string().unwrap(), "TEST MESSAGE");
    }

    #[test]
    fn wire_field_fixed_string_roundtrips() {
        let mut out = Vec::new();
        FixedString::<8>::write(&mut out, &"hi".to_string()).unwrap();
        assert_eq!(out.len(), 8);
        let mut cursor = ByteCursor::new(out);
        assert_eq!(FixedString::<8>::read(&mut cursor).unwrap(), "hi");
    }
}
