//! # codec
//!
//! Binary record codec used for the variant documents of a genotype bucket.
//!
//! A [`DataSchema`] is an ordered list of [`DataField`] definitions. A record is the
//! concatenation of its encoded fields. Fields with a fixed width that are preceded only by
//! fixed-width fields are read through a precomputed direct offset; the remaining fields are
//! reached by skipping forward from the last known offset. Reads never depend on a previous
//! read, so fields can be decoded in any order and the same buffer can be read from several
//! threads at once.
//!
//! Sequences of records are stored with a [`DocumentWriter`] and read back with a
//! [`DocumentBuffer`], which supports random access by document index.

pub mod bits;
mod document;
mod field;

pub use document::{DocumentBuffer, DocumentWriter};
pub use field::{DataField, FieldValue, MAX_BYTES_LENGTH};

use crate::error::{DecodeError, EncodeError, Result};

/// Position of a sequential reader inside one record
///
/// The cursor is a plain value: the record buffer itself is never mutated by reads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordCursor {
    /// Index of the next field to read
    pub field: usize,
    /// Byte offset of the next field
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSchema {
    fields: Vec<DataField>,
    /// Start of each field when every earlier field is fixed-width
    offsets: Vec<Option<usize>>,
    fixed_length: Option<usize>,
}
impl DataSchema {
    pub fn new(fields: Vec<DataField>) -> Self {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut running = Some(0usize);
        for field in &fields {
            offsets.push(running);
            running = match (running, field.fixed_width()) {
                (Some(offset), Some(width)) => Some(offset + width),
                _ => None,
            };
        }
        Self {
            fields,
            offsets,
            fixed_length: running,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[DataField] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical record length if every field is fixed-width
    #[must_use]
    pub fn fixed_length(&self) -> Option<usize> {
        self.fixed_length
    }

    /// Direct byte offset of field `index`, if it does not depend on record content
    #[must_use]
    pub fn direct_offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied().flatten()
    }

    /// Appends one record to `buffer`
    ///
    /// On error the buffer is restored to its previous length.
    pub fn write(&self, values: &[FieldValue<'_>], buffer: &mut Vec<u8>) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(EncodeError::FieldCount {
                expected: self.fields.len(),
                got: values.len(),
            }
            .into());
        }
        let rollback = buffer.len();
        for (field, value) in self.fields.iter().zip(values) {
            if let Err(err) = field.write(*value, buffer) {
                buffer.truncate(rollback);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Decodes field `index` of `record` without decoding the other fields
    pub fn read_field<'a>(&self, record: &'a [u8], index: usize) -> Result<FieldValue<'a>> {
        let field = self
            .fields
            .get(index)
            .ok_or(DecodeError::FieldOutOfRange(index, self.fields.len()))?;

        // closest field at or before `index` with a known start
        let anchor = (0..=index)
            .rev()
            .find(|i| self.offsets[*i].is_some())
            .unwrap_or(0);
        let mut cursor = self.offsets[anchor].unwrap_or(0);
        for skipped in &self.fields[anchor..index] {
            skipped.skip(record, &mut cursor)?;
        }
        field.read(record, &mut cursor)
    }

    /// Decodes the field under `cursor` and advances it
    ///
    /// Returns `None` when every field of the record was read.
    pub fn read_next<'a>(
        &self,
        record: &'a [u8],
        cursor: &mut RecordCursor,
    ) -> Option<Result<FieldValue<'a>>> {
        let field = self.fields.get(cursor.field)?;
        let mut offset = cursor.offset;
        Some(field.read(record, &mut offset).map(|value| {
            cursor.field += 1;
            cursor.offset = offset;
            value
        }))
    }

    /// Decodes every field of `record`
    pub fn read_all<'a>(&self, record: &'a [u8]) -> Result<Vec<FieldValue<'a>>> {
        let mut cursor = RecordCursor::default();
        let mut values = Vec::with_capacity(self.fields.len());
        while let Some(value) = self.read_next(record, &mut cursor) {
            values.push(value?);
        }
        Ok(values)
    }
}
