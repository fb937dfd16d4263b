//! Portable binary primitives shared by every [`crate::message`] payload.
//!
//! All multi-byte integers are big-endian. Strings and sequences are
//! length-prefixed with a `u32` checked against [`MAX_LENGTH`]; options are a
//! one-byte tag (`0` = absent, `1` = present) followed by the body.

use crate::WireError;

/// Upper bound on any length prefix this codec will accept, matching the
/// spec's "2^31 - 1 bytes" sanity cap.
pub const MAX_LENGTH: u32 = i32::MAX as u32;

/// An append-only byte buffer with typed write helpers.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer, returning the accumulated bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Writes a single boolean as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Writes an unsigned 16-bit integer, big-endian.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes an unsigned 32-bit integer, big-endian.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes an unsigned 64-bit integer, big-endian.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes a signed 32-bit integer, big-endian.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, v: &str) {
        self.write_u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Appends raw, unprefixed bytes (a fixed-width field like an IP
    /// address octet array, where the length is implied by the caller's
    /// wire layout rather than needing a prefix).
    pub fn buf_extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a one-byte-tagged optional value.
    pub fn write_option<T>(&mut self, v: &Option<T>, write_body: impl FnOnce(&mut Self, &T)) {
        match v {
            None => self.write_bool(false),
            Some(inner) => {
                self.write_bool(true);
                write_body(self, inner);
            }
        }
    }

    /// Writes a length-prefixed sequence, applying `write_item` to each
    /// element in order.
    pub fn write_seq<T>(&mut self, items: &[T], mut write_item: impl FnMut(&mut Self, &T)) {
        self.write_u32(items.len() as u32);
        for item in items {
            write_item(self, item);
        }
    }
}

/// A cursor over a byte slice with typed read helpers that bounds-check
/// every access and report failures via [`WireError::Decode`].
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| WireError::Decode(format!("unexpected end of payload reading {n} bytes")))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads a single boolean byte.
    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::Decode(format!("invalid bool tag {other}"))),
        }
    }

    /// Reads a big-endian unsigned 16-bit integer.
    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().unwrap();
        Ok(u16::from_be_bytes(bytes))
    }

    /// Reads a big-endian unsigned 32-bit integer.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(u32::from_be_bytes(bytes))
    }

    /// Reads a big-endian unsigned 64-bit integer.
    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_be_bytes(bytes))
    }

    /// Reads a big-endian signed 32-bit integer.
    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(i32::from_be_bytes(bytes))
    }

    /// Reads exactly `out.len()` raw, unprefixed bytes into `out` (the
    /// counterpart to [`Writer::buf_extend`]).
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<(), WireError> {
        out.copy_from_slice(self.take(out.len())?);
        Ok(())
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_checked_length()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| WireError::Decode(e.to_string()))
    }

    /// Reads a one-byte-tagged optional value.
    pub fn read_option<T>(
        &mut self,
        read_body: impl FnOnce(&mut Self) -> Result<T, WireError>,
    ) -> Result<Option<T>, WireError> {
        if self.read_bool()? {
            Ok(Some(read_body(self)?))
        } else {
            Ok(None)
        }
    }

    /// Reads a length-prefixed sequence, applying `read_item` to each
    /// element.
    pub fn read_seq<T>(
        &mut self,
        mut read_item: impl FnMut(&mut Self) -> Result<T, WireError>,
    ) -> Result<Vec<T>, WireError> {
        let len = self.read_checked_length()?;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(read_item(self)?);
        }
        Ok(out)
    }

    fn read_checked_length(&mut self) -> Result<usize, WireError> {
        let len = self.read_u32()?;
        if len > MAX_LENGTH {
            return Err(WireError::Decode(format!(
                "length prefix {len} exceeds maximum of {MAX_LENGTH}"
            )));
        }
        Ok(len as usize)
    }
}
