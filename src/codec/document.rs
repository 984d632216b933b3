//! Sequences of variable-length documents packed in one contiguous buffer.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! [count: u32][end offset of document 0: u32] ... [end offset of document n-1: u32][data]
//! ```
//!
//! Document `i` spans `data[end(i - 1)..end(i)]`, so any document can be located
//! without scanning the documents before it.

use byteorder::{ByteOrder, LittleEndian};

use super::{field::take, DataSchema, FieldValue};
use crate::error::{DecodeError, EncodeError, Result};

const SIZE_COUNT: usize = 4;
const SIZE_OFFSET: usize = 4;

/// Accumulates documents and produces the packed buffer
#[derive(Debug, Default, Clone)]
pub struct DocumentWriter {
    ends: Vec<u32>,
    data: Vec<u8>,
}
impl DocumentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes one record with `schema` and appends it as a new document
    pub fn write_document(&mut self, schema: &DataSchema, values: &[FieldValue<'_>]) -> Result<()> {
        schema.write(values, &mut self.data)?;
        self.close_document()
    }

    /// Appends an already encoded document
    pub fn write_raw_document(&mut self, document: &[u8]) -> Result<()> {
        self.data.extend_from_slice(document);
        self.close_document()
    }

    fn close_document(&mut self) -> Result<()> {
        let Ok(end) = u32::try_from(self.data.len()) else {
            let len = self.data.len();
            self.data.truncate(self.ends.last().copied().unwrap_or(0) as usize);
            return Err(EncodeError::ValueTooLong {
                field: "documents".to_string(),
                len,
            }
            .into());
        };
        self.ends.push(end);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Consumes the writer and returns the packed buffer
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let mut buffer = vec![0u8; SIZE_COUNT + self.ends.len() * SIZE_OFFSET];
        LittleEndian::write_u32(&mut buffer[..SIZE_COUNT], self.ends.len() as u32);
        LittleEndian::write_u32_into(&self.ends, &mut buffer[SIZE_COUNT..]);
        buffer.extend_from_slice(&self.data);
        buffer
    }
}

/// Read-only view over a packed document buffer
#[derive(Debug, Clone, Copy)]
pub struct DocumentBuffer<'a> {
    table: &'a [u8],
    data: &'a [u8],
    len: usize,
}
impl<'a> DocumentBuffer<'a> {
    /// Validates the offset table and wraps the buffer
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the buffer is shorter than its table or the table is
    /// not ascending within the data section.
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let len = LittleEndian::read_u32(take(buffer, 0, SIZE_COUNT)?) as usize;
        let table_len = len.checked_mul(SIZE_OFFSET).ok_or_else(|| {
            DecodeError::CorruptDocumentTable(format!("document count {len} overflows"))
        })?;
        let table = take(buffer, SIZE_COUNT, table_len)?;
        let data = &buffer[SIZE_COUNT + table_len..];

        let mut previous = 0;
        for chunk in table.chunks_exact(SIZE_OFFSET) {
            let end = LittleEndian::read_u32(chunk) as usize;
            if end < previous || end > data.len() {
                return Err(DecodeError::CorruptDocumentTable(format!(
                    "document end {end} after {previous} in {} data bytes",
                    data.len()
                ))
                .into());
            }
            previous = end;
        }
        if previous != data.len() {
            return Err(DecodeError::CorruptDocumentTable(format!(
                "{} trailing bytes",
                data.len() - previous
            ))
            .into());
        }
        Ok(Self { table, data, len })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn end(&self, index: usize) -> usize {
        LittleEndian::read_u32(&self.table[index * SIZE_OFFSET..]) as usize
    }

    /// Random access to document `index`
    pub fn read_document(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.len {
            return Err(DecodeError::DocumentOutOfRange(index, self.len).into());
        }
        let start = if index == 0 { 0 } else { self.end(index - 1) };
        Ok(&self.data[start..self.end(index)])
    }

    /// Reads the document at `*cursor` and advances the cursor
    ///
    /// Returns `None` once every document was read.
    pub fn read_next_document(&self, cursor: &mut usize) -> Option<&'a [u8]> {
        let document = self.read_document(*cursor).ok()?;
        *cursor += 1;
        Some(document)
    }

    /// Iterates over every document in order
    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        let mut cursor = 0;
        std::iter::from_fn(move || self.read_next_document(&mut cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DataField;
    use crate::Error;

    fn schema() -> DataSchema {
        DataSchema::new(vec![
            DataField::integer("pos", 3),
            DataField::bytes("allele"),
        ])
    }

    #[test]
    fn test_random_access() -> anyhow::Result<()> {
        let schema = schema();
        let mut writer = DocumentWriter::new();
        for (pos, allele) in [(1u64, &b"A"[..]), (20, b"CTTG"), (300, b"")] {
            writer.write_document(&schema, &[FieldValue::Integer(pos), FieldValue::Bytes(allele)])?;
        }
        let buffer = writer.finish();
        let documents = DocumentBuffer::parse(&buffer)?;
        assert_eq!(documents.len(), 3);

        let second = documents.read_document(1)?;
        assert_eq!(schema.read_field(second, 1)?, FieldValue::Bytes(b"CTTG"));
        let third = documents.read_document(2)?;
        assert_eq!(schema.read_field(third, 0)?, FieldValue::Integer(300));
        assert!(matches!(
            documents.read_document(3),
            Err(Error::DecodeError(DecodeError::DocumentOutOfRange(3, 3)))
        ));

        let mut cursor = 0;
        let mut seen = 0;
        while let Some(doc) = documents.read_next_document(&mut cursor) {
            schema.read_all(doc)?;
            seen += 1;
        }
        assert_eq!(seen, 3);
        Ok(())
    }

    #[test]
    fn test_empty_buffer() -> anyhow::Result<()> {
        let buffer = DocumentWriter::new().finish();
        let documents = DocumentBuffer::parse(&buffer)?;
        assert!(documents.is_empty());
        assert_eq!(documents.iter().count(), 0);
        Ok(())
    }

    #[test]
    fn test_corrupt_table() -> anyhow::Result<()> {
        let schema = schema();
        let mut writer = DocumentWriter::new();
        writer.write_document(&schema, &[FieldValue::Integer(5), FieldValue::Bytes(b"GA")])?;
        let mut buffer = writer.finish();

        // truncated data section
        let short = &buffer[..buffer.len() - 1];
        assert!(DocumentBuffer::parse(short).is_err());

        // offset pointing beyond the data
        buffer[4] = 200;
        assert!(matches!(
            DocumentBuffer::parse(&buffer),
            Err(Error::DecodeError(DecodeError::CorruptDocumentTable(_)))
        ));

        // count larger than the table
        assert!(DocumentBuffer::parse(&[9, 0, 0, 0, 1, 0]).is_err());
        Ok(())
    }
}
