//! The 16-byte transfer-block header that precedes every chunk of file
//! content on a channel connection, and the sentinel value that ends a
//! channel's byte stream.

use std::io::{self, Read, Write};

/// Size in bytes of a [`TransferBlockHeader`] on the wire.
pub const BLOCK_HEADER_LEN: usize = 16;

/// `[offset_high][offset_low][block_size][file_index]`, all `u32`
/// big-endian, followed on the wire by `block_size` bytes of file content.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TransferBlockHeader {
    /// Byte offset into the destination file this block starts at.
    pub offset: u64,
    /// Number of content bytes that follow this header.
    pub block_size: u32,
    /// Index of the file in the transfer's manifest this block belongs to.
    pub file_index: u32,
}

impl TransferBlockHeader {
    /// The per-channel end-of-stream marker: `offset = u64::MAX`,
    /// `block_size = 0`, `file_index = u32::MAX`.
    pub const SENTINEL: Self = Self {
        offset: u64::MAX,
        block_size: 0,
        file_index: u32::MAX,
    };

    /// Returns `true` if this header is the end-of-stream sentinel.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.offset == u64::MAX && self.block_size == 0 && self.file_index == u32::MAX
    }

    /// Encodes the header into its fixed 16-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_LEN] {
        let mut buf = [0u8; BLOCK_HEADER_LEN];
        buf[0..4].copy_from_slice(&((self.offset >> 32) as u32).to_be_bytes());
        buf[4..8].copy_from_slice(&(self.offset as u32).to_be_bytes());
        buf[8..12].copy_from_slice(&self.block_size.to_be_bytes());
        buf[12..16].copy_from_slice(&self.file_index.to_be_bytes());
        buf
    }

    /// Decodes the header from its fixed 16-byte wire form.
    #[must_use]
    pub fn from_bytes(buf: &[u8; BLOCK_HEADER_LEN]) -> Self {
        let offset_high = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as u64;
        let offset_low = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as u64;
        Self {
            offset: (offset_high << 32) | offset_low,
            block_size: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            file_index: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
        }
    }

    /// Writes the header to `w`.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    /// Reads a header from `r`.
    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        let mut buf = [0u8; BLOCK_HEADER_LEN];
        r.read_exact(&mut buf)?;
        Ok(Self::from_bytes(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let hdr = TransferBlockHeader {
            offset: 0x0102_0304_0506_0708,
            block_size: 65536,
            file_index: 7,
        };
        assert_eq!(TransferBlockHeader::from_bytes(&hdr.to_bytes()), hdr);
    }

    #[test]
    fn sentinel_round_trips_and_is_recognized() {
        let bytes = TransferBlockHeader::SENTINEL.to_bytes();
        let decoded = TransferBlockHeader::from_bytes(&bytes);
        assert!(decoded.is_sentinel());
    }

    #[test]
    fn ordinary_header_is_not_sentinel() {
        let hdr = TransferBlockHeader {
            offset: 0,
            block_size: 1,
            file_index: 0,
        };
        assert!(!hdr.is_sentinel());
    }

    #[test]
    fn write_then_read_round_trips_over_a_stream() {
        let hdr = TransferBlockHeader {
            offset: 42,
            block_size: 1024,
            file_index: 3,
        };
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(TransferBlockHeader::read(&mut cursor).unwrap(), hdr);
    }
}
