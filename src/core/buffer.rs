//! Binary Buffers
//!
//! Little-endian writer/reader pair used by the replay codec, the event
//! stream and the level binary cache.
//!
//! Two string encodings coexist on disk:
//! - stream strings (events, moving-block names): `i32` length + bytes,
//!   readable only when `0 < len < 512`;
//! - file strings (replay header, level records): `u8` length + bytes.

use thiserror::Error;

/// Longest stream string a reader accepts (exclusive).
pub const MAX_STREAM_STRING: usize = 512;

/// Longest file string a writer can encode.
pub const MAX_FILE_STRING: usize = u8::MAX as usize;

/// Buffer errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Not enough bytes left.
    #[error("Unable to read the data ({needed} bytes needed, {remaining} left)")]
    Truncated {
        /// Bytes requested
        needed: usize,
        /// Bytes available
        remaining: usize,
    },

    /// Stream string length outside `1..512`.
    #[error("Unable to read the string (length {0})")]
    InvalidStringLength(i32),

    /// File string longer than 255 bytes.
    #[error("String too long to be written ({0} bytes)")]
    StringTooLong(usize),
}

/// Growable little-endian output buffer.
#[derive(Clone, Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with reserved space.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume into the underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop every written byte.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a boolean as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    /// Write a 16-bit count.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a 32-bit signed integer.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a 32-bit unsigned integer (same bytes as `i32`).
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a 32-bit float.
    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a stream string (`i32` length prefix).
    pub fn write_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.write_bytes(s.as_bytes());
    }

    /// Write a file string (`u8` length prefix).
    pub fn write_file_string(&mut self, s: &str) -> Result<(), BufferError> {
        if s.len() > MAX_FILE_STRING {
            return Err(BufferError::StringTooLong(s.len()));
        }
        self.write_u8(s.len() as u8);
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Cursor over a borrowed little-endian byte slice.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], BufferError> {
        if self.remaining() < n {
            return Err(BufferError::Truncated { needed: n, remaining: self.remaining() });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a boolean (any non-zero byte is true).
    pub fn read_bool(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a 16-bit count.
    pub fn read_u16(&mut self) -> Result<u16, BufferError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a 32-bit signed integer.
    pub fn read_i32(&mut self) -> Result<i32, BufferError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read a 32-bit unsigned integer.
    pub fn read_u32(&mut self) -> Result<u32, BufferError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a 32-bit float.
    pub fn read_f32(&mut self) -> Result<f32, BufferError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Read a stream string.
    ///
    /// Empty strings and strings of 512 bytes or more are rejected, which
    /// keeps stream readers compatible with files written by older builds.
    pub fn read_string(&mut self) -> Result<String, BufferError> {
        let n = self.read_i32()?;
        if n <= 0 || n as usize >= MAX_STREAM_STRING {
            return Err(BufferError::InvalidStringLength(n));
        }
        let bytes = self.read_bytes(n as usize)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a file string (`u8` length prefix, may be empty).
    pub fn read_file_string(&mut self) -> Result<String, BufferError> {
        let n = self.read_u8()? as usize;
        let bytes = self.read_bytes(n)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_layout_is_little_endian() {
        let mut w = ByteWriter::new();
        w.write_i32(0x12345678);
        w.write_bool(true);
        w.write_u16(0x0102);
        assert_eq!(w.as_bytes(), &[0x78, 0x56, 0x34, 0x12, 1, 0x02, 0x01]);
    }

    #[test]
    fn test_read_back_mixed_values() {
        let mut w = ByteWriter::new();
        w.write_f32(1.5);
        w.write_string("block7");
        w.write_file_string("level").unwrap();
        w.write_u32(9);

        let mut r = ByteReader::new(w.as_bytes());
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_string().unwrap(), "block7");
        assert_eq!(r.read_file_string().unwrap(), "level");
        assert_eq!(r.read_u32().unwrap(), 9);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_truncated_read() {
        let mut r = ByteReader::new(&[1, 2]);
        assert_eq!(
            r.read_i32(),
            Err(BufferError::Truncated { needed: 4, remaining: 2 })
        );
    }

    #[test]
    fn test_stream_string_limits() {
        let mut w = ByteWriter::new();
        w.write_string("");
        assert_eq!(
            ByteReader::new(w.as_bytes()).read_string(),
            Err(BufferError::InvalidStringLength(0))
        );

        let mut w = ByteWriter::new();
        w.write_string(&"a".repeat(512));
        assert_eq!(
            ByteReader::new(w.as_bytes()).read_string(),
            Err(BufferError::InvalidStringLength(512))
        );
    }

    #[test]
    fn test_file_string_too_long() {
        let mut w = ByteWriter::new();
        assert_eq!(
            w.write_file_string(&"x".repeat(256)),
            Err(BufferError::StringTooLong(256))
        );
        assert!(w.is_empty());
    }
}
