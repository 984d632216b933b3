use byteorder::{ByteOrder, LittleEndian};

use super::bits::{bytes_for, mask};
use crate::error::{DecodeError, EncodeError, Result};

/// Size of the length prefix of variable-length fields
pub const SIZE_LENGTH_PREFIX: usize = 2;

/// Largest value a variable-length field can hold
pub const MAX_BYTES_LENGTH: usize = u16::MAX as usize;

/// A single value stored in or read from a [`DataField`]
///
/// Byte values borrow from the buffer they were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Integer(u64),
    Bytes(&'a [u8]),
    Code(u64),
}
impl<'a> FieldValue<'a> {
    #[must_use]
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_code(&self) -> Option<u64> {
        match self {
            Self::Code(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

/// The definition of one field of a [`DataSchema`](super::DataSchema)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataField {
    /// Unsigned little-endian integer of `width` bytes (1 to 8)
    Integer { name: String, width: usize },

    /// Variable-length byte string with a 2 byte length prefix
    Bytes { name: String },

    /// Bit-packed categorical code stored in the fewest whole bytes
    ///
    /// `domain` is the number of valid codes; `None` accepts every code of `bits` bits.
    Categorical {
        name: String,
        bits: u8,
        domain: Option<u64>,
    },
}
impl DataField {
    pub fn integer(name: &str, width: usize) -> Self {
        Self::Integer {
            name: name.to_string(),
            width: width.clamp(1, 8),
        }
    }

    pub fn bytes(name: &str) -> Self {
        Self::Bytes {
            name: name.to_string(),
        }
    }

    pub fn categorical(name: &str, bits: u8, domain: Option<u64>) -> Self {
        Self::Categorical {
            name: name.to_string(),
            bits: bits.min(64),
            domain,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Integer { name, .. } | Self::Bytes { name } | Self::Categorical { name, .. } => {
                name
            }
        }
    }

    /// Encoded width in bytes, or `None` for variable-length fields
    #[must_use]
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::Integer { width, .. } => Some(*width),
            Self::Bytes { .. } => None,
            Self::Categorical { bits, .. } => Some(bytes_for(*bits)),
        }
    }

    /// Whether `code` is a member of the categorical domain
    fn accepts_code(&self, code: u64) -> bool {
        match self {
            Self::Categorical { bits, domain, .. } => {
                code & !mask(*bits) == 0 && domain.is_none_or(|d| code < d)
            }
            _ => false,
        }
    }

    /// Appends the encoded value to `buffer`
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the value kind does not match the field, the integer
    /// does not fit its width, the byte string is too long, or the code is outside the domain.
    /// Nothing is written on error.
    pub fn write(&self, value: FieldValue<'_>, buffer: &mut Vec<u8>) -> Result<()> {
        match (self, value) {
            (Self::Integer { name, width }, FieldValue::Integer(v)) => {
                if *width < 8 && v >> (width * 8) != 0 {
                    return Err(EncodeError::IntegerOverflow {
                        field: name.clone(),
                        value: v,
                        width: *width,
                    }
                    .into());
                }
                let mut bytes = [0u8; 8];
                LittleEndian::write_u64(&mut bytes, v);
                buffer.extend_from_slice(&bytes[..*width]);
            }
            (Self::Bytes { name }, FieldValue::Bytes(v)) => {
                if v.len() > MAX_BYTES_LENGTH {
                    return Err(EncodeError::ValueTooLong {
                        field: name.clone(),
                        len: v.len(),
                    }
                    .into());
                }
                let mut prefix = [0u8; SIZE_LENGTH_PREFIX];
                LittleEndian::write_u16(&mut prefix, v.len() as u16);
                buffer.extend_from_slice(&prefix);
                buffer.extend_from_slice(v);
            }
            (Self::Categorical { name, bits, .. }, FieldValue::Code(code)) => {
                if !self.accepts_code(code) {
                    return Err(EncodeError::CodeOutOfDomain {
                        field: name.clone(),
                        code,
                    }
                    .into());
                }
                let mut bytes = [0u8; 8];
                LittleEndian::write_u64(&mut bytes, code);
                buffer.extend_from_slice(&bytes[..bytes_for(*bits)]);
            }
            _ => return Err(EncodeError::KindMismatch(self.name().to_string()).into()),
        }
        Ok(())
    }

    /// Reads the field starting at `*cursor` and advances the cursor past it
    ///
    /// The cursor is left untouched on error.
    pub fn read<'a>(&self, buffer: &'a [u8], cursor: &mut usize) -> Result<FieldValue<'a>> {
        let start = *cursor;
        let (value, end) = match self {
            Self::Integer { width, .. } => {
                let bytes = take(buffer, start, *width)?;
                (
                    FieldValue::Integer(LittleEndian::read_uint(bytes, *width)),
                    start + width,
                )
            }
            Self::Bytes { .. } => {
                let prefix = take(buffer, start, SIZE_LENGTH_PREFIX)?;
                let len = LittleEndian::read_u16(prefix) as usize;
                let bytes = take(buffer, start + SIZE_LENGTH_PREFIX, len)?;
                (FieldValue::Bytes(bytes), start + SIZE_LENGTH_PREFIX + len)
            }
            Self::Categorical { name, bits, .. } => {
                let width = bytes_for(*bits);
                let code = if width == 0 {
                    0
                } else {
                    LittleEndian::read_uint(take(buffer, start, width)?, width)
                };
                if !self.accepts_code(code) {
                    return Err(DecodeError::InvalidCode {
                        field: name.clone(),
                        code,
                    }
                    .into());
                }
                (FieldValue::Code(code), start + width)
            }
        };
        *cursor = end;
        Ok(value)
    }

    /// Advances the cursor past the field without decoding it
    pub fn skip(&self, buffer: &[u8], cursor: &mut usize) -> Result<()> {
        let len = match self.fixed_width() {
            Some(width) => width,
            None => {
                let prefix = take(buffer, *cursor, SIZE_LENGTH_PREFIX)?;
                SIZE_LENGTH_PREFIX + LittleEndian::read_u16(prefix) as usize
            }
        };
        take(buffer, *cursor, len)?;
        *cursor += len;
        Ok(())
    }
}

/// Borrow `len` bytes at `offset` or report a truncated buffer
pub(crate) fn take(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let available = buffer.len().saturating_sub(offset);
    if available < len {
        return Err(DecodeError::Truncated {
            offset,
            needed: len,
            available,
        }
        .into());
    }
    Ok(&buffer[offset..offset + len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_integer_width() -> anyhow::Result<()> {
        let field = DataField::integer("offset", 3);
        let mut buf = Vec::new();
        field.write(FieldValue::Integer(0x00AB_CDEF), &mut buf)?;
        assert_eq!(buf.len(), 3);

        let mut cursor = 0;
        assert_eq!(
            field.read(&buf, &mut cursor)?,
            FieldValue::Integer(0x00AB_CDEF)
        );
        assert_eq!(cursor, 3);

        let err = field.write(FieldValue::Integer(1 << 24), &mut buf);
        assert!(matches!(
            err,
            Err(Error::EncodeError(EncodeError::IntegerOverflow { .. }))
        ));
        assert_eq!(buf.len(), 3);
        Ok(())
    }

    #[test]
    fn test_categorical_domain() -> anyhow::Result<()> {
        let field = DataField::categorical("snv", 5, Some(17));
        let mut buf = Vec::new();
        field.write(FieldValue::Code(16), &mut buf)?;
        assert!(field.write(FieldValue::Code(17), &mut buf).is_err());
        assert_eq!(buf, vec![16]);

        let corrupt = [20u8];
        let mut cursor = 0;
        assert!(matches!(
            field.read(&corrupt, &mut cursor),
            Err(Error::DecodeError(DecodeError::InvalidCode { code: 20, .. }))
        ));
        assert_eq!(cursor, 0);
        Ok(())
    }

    #[test]
    fn test_zero_bit_categorical() -> anyhow::Result<()> {
        let field = DataField::categorical("empty", 0, None);
        let mut buf = Vec::new();
        field.write(FieldValue::Code(0), &mut buf)?;
        assert!(buf.is_empty());
        let mut cursor = 0;
        assert_eq!(field.read(&buf, &mut cursor)?, FieldValue::Code(0));
        Ok(())
    }

    #[test]
    fn test_truncated_bytes() -> anyhow::Result<()> {
        let field = DataField::bytes("alt");
        let mut buf = Vec::new();
        field.write(FieldValue::Bytes(b"ACGT"), &mut buf)?;
        buf.truncate(4);
        let mut cursor = 0;
        assert!(matches!(
            field.read(&buf, &mut cursor),
            Err(Error::DecodeError(DecodeError::Truncated {
                needed: 4,
                available: 2,
                ..
            }))
        ));
        assert!(field.skip(&buf, &mut cursor).is_err());
        Ok(())
    }

    #[test]
    fn test_kind_mismatch() {
        let field = DataField::bytes("ref");
        let mut buf = Vec::new();
        assert!(field.write(FieldValue::Integer(1), &mut buf).is_err());
    }
}
