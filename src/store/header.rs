//! Header of a persisted [`MemoryStore`](super::MemoryStore) file.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Write};

use crate::error::{DecodeError, Result};

/// "GTIX" in ASCII (little-endian)
const MAGIC: u32 = 0x5849_5447;

/// Current format version of the store file
const FORMAT: u8 = 1;

/// Size of the header in bytes
pub const SIZE_HEADER: usize = 32;

/// Fixed-size header preceding the zstd-compressed rows of a store file
///
/// | bytes  | content           |
/// |--------|-------------------|
/// | 0..4   | magic number      |
/// | 4      | format version    |
/// | 5..13  | number of rows    |
/// | 13..32 | reserved          |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub magic: u32,
    pub format: u8,
    pub rows: u64,
    pub reserved: [u8; 19],
}
impl StoreHeader {
    #[must_use]
    pub fn new(rows: u64) -> Self {
        Self {
            magic: MAGIC,
            format: FORMAT,
            rows,
            reserved: [0; 19],
        }
    }

    /// Parses a header from exactly [`SIZE_HEADER`] bytes
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the magic number or format version do not match.
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self> {
        let magic = LittleEndian::read_u32(&buffer[0..4]);
        if magic != MAGIC {
            return Err(DecodeError::InvalidMagicNumber(magic).into());
        }
        let format = buffer[4];
        if format != FORMAT {
            return Err(DecodeError::InvalidFormatVersion(format).into());
        }
        let mut reserved = [0u8; 19];
        reserved.copy_from_slice(&buffer[13..32]);
        Ok(Self {
            magic,
            format,
            rows: LittleEndian::read_u64(&buffer[5..13]),
            reserved,
        })
    }

    /// Parses a header from the start of an arbitrarily sized buffer
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        let Some(bytes) = buffer.first_chunk::<SIZE_HEADER>() else {
            return Err(DecodeError::Truncated {
                offset: 0,
                needed: SIZE_HEADER,
                available: buffer.len(),
            }
            .into());
        };
        Self::from_bytes(bytes)
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_HEADER];
        LittleEndian::write_u32(&mut buffer[0..4], self.magic);
        buffer[4] = self.format;
        LittleEndian::write_u64(&mut buffer[5..13], self.rows);
        buffer[13..32].copy_from_slice(&self.reserved);
        writer.write_all(&buffer)?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        reader.read_exact(&mut buffer)?;
        Self::from_bytes(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Cursor;

    #[test]
    fn test_header_round_trip() -> anyhow::Result<()> {
        let header = StoreHeader::new(1234);
        let mut buffer = Vec::new();
        header.write_bytes(&mut buffer)?;
        assert_eq!(buffer.len(), SIZE_HEADER);
        assert_eq!(StoreHeader::from_reader(&mut Cursor::new(&buffer))?, header);
        assert_eq!(StoreHeader::from_buffer(&buffer)?.rows, 1234);
        Ok(())
    }

    #[test]
    fn test_invalid_header() -> anyhow::Result<()> {
        let mut buffer = Vec::new();
        StoreHeader::new(1).write_bytes(&mut buffer)?;
        buffer[4] = 9;
        assert!(matches!(
            StoreHeader::from_buffer(&buffer),
            Err(Error::DecodeError(DecodeError::InvalidFormatVersion(9)))
        ));
        buffer[0] = 0;
        assert!(matches!(
            StoreHeader::from_buffer(&buffer),
            Err(Error::DecodeError(DecodeError::InvalidMagicNumber(_)))
        ));
        assert!(StoreHeader::from_buffer(&buffer[..10]).is_err());
        Ok(())
    }
}
