use byteorder::{BigEndian, ReadBytesExt};

use crate::error::BufferError;

/// A forward-only cursor over an immutable byte sequence. All multi-byte
/// integers on the wire are big-endian.
///
/// Mirrors `legume.bytebuffer.ByteBuffer`: `read_exact`/`read_struct` consume
/// from the front, `peek` does not, and `push_bytes` appends to the tail
/// (used when a datagram is read in chunks).
#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Vec<u8>,
    pos: usize,
}

impl ByteCursor {
    pub fn new(data: Vec<u8>) -> ByteCursor {
        ByteCursor { data, pos: 0 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.remaining()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Appends more bytes to the tail of the buffer.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Returns the next `n` bytes without advancing the cursor.
    pub fn peek(&self, n: usize) -> Result<&[u8], BufferError> {
        if n > self.remaining() {
            return Err(BufferError::Underflow { attempted: n, remaining: self.remaining() });
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Reads and returns the next `n` bytes, advancing the cursor.
    pub fn read_exact(&mut self, n: usize) -> Result<&[u8], BufferError> {
        if n > self.remaining() {
            return Err(BufferError::Underflow { attempted: n, remaining: self.remaining() });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, BufferError> {
        let mut slice = self.read_exact(2)?;
        slice.read_u16::<BigEndian>().map_err(|_| BufferError::Underflow { attempted: 2, remaining: 0 })
    }

    pub fn read_i32(&mut self) -> Result<i32, BufferError> {
        let mut slice = self.read_exact(4)?;
        slice.read_i32::<BigEndian>().map_err(|_| BufferError::Underflow { attempted: 4, remaining: 0 })
    }

    pub fn read_f64(&mut self) -> Result<f64, BufferError> {
        let mut slice = self.read_exact(8)?;
        slice.read_f64::<BigEndian>().map_err(|_| BufferError::Underflow { attempted: 8, remaining: 0 })
    }

    /// Reads a fixed-width string of exactly `n` bytes, stripping trailing
    /// NUL padding.
    pub fn read_fixed_string(&mut self, n: usize) -> Result<String, BufferError> {
        let bytes = self.read_exact(n)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Reads a variable-length string: a `u16` byte length prefix followed
    /// by that many bytes.
    pub fn read_var_string(&mut self) -> Result<String, BufferError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_exact(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_primitives_big_endian() {
        let mut cursor = ByteCursor::new(vec![0x00, 0x2a, 0xff, 0xff, 0xff, 0xfb, 1]);
        assert_eq!(cursor.read_u16().unwrap(), 42);
        assert_eq!(cursor.read_i32().unwrap(), -5);
        assert!(cursor.read_bool().unwrap());
        assert!(cursor.is_empty());
    }

    #[test]
    fn peek_does_not_advance() {
        let mut cursor = ByteCursor::new(vec![1, 2, 3]);
        assert_eq!(cursor.peek(2).unwrap(), &[1, 2]);
        assert_eq!(cursor.length(), 3);
        assert_eq!(cursor.read_exact(1).unwrap(), &[1]);
        assert_eq!(cursor.length(), 2);
    }

    #[test]
    fn underflow_reports_sizes() {
        let mut cursor = ByteCursor::new(vec![1]);
        let err = cursor.read_u16().unwrap_err();
        assert_eq!(err, BufferError::Underflow { attempted: 2, remaining: 1 });
    }

    #[test]
    fn fixed_string_strips_null_padding() {
        let mut cursor = ByteCursor::new(vec![b'h', b'i', 0, 0, 0]);
        assert_eq!(cursor.read_fixed_string(5).unwrap(), "hi");
    }

    #[test]
    fn var_string_reads_length_prefix() {
        let mut data = vec![0x00, 0x05];
        data.extend_from_slice(b"hello");
        let mut cursor = ByteCursor::new(data);
        assert_eq!(cursor.read_var_string().unwrap(), "hello");
    }

    #[test]
    fn push_bytes_appends_to_tail() {
        let mut cursor = ByteCursor::new(vec![1, 2]);
        cursor.push_bytes(&[3, 4]);
        assert_eq!(cursor.read_exact(4).unwrap(), &[1, 2, 3, 4]);
    }
}
