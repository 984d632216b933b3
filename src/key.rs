//! Row keys of the sample index.
//!
//! A row key addresses one locus chunk:
//!
//! ```text
//! [sample id: u32 BE][chromosome bytes][0x00][chunk start: u32 BE]
//! ```
//!
//! Big-endian integers and the zero separator make the byte order of keys agree with the
//! ([`Variant`](crate::Variant)) ordering of the chunks they hold: by sample, chromosome
//! name, then position.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{DecodeError, Result};
use crate::variant::{Region, Variant};

const SEPARATOR: u8 = 0x00;
const SIZE_SAMPLE: usize = 4;
const SIZE_CHUNK: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub sample_id: u32,
    pub chromosome: String,
    pub chunk_start: u32,
}
impl RowKey {
    pub fn new(sample_id: u32, chromosome: &str, chunk_start: u32) -> Result<Self> {
        Variant::check_chromosome(chromosome)?;
        Ok(Self {
            sample_id,
            chromosome: chromosome.to_string(),
            chunk_start,
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut key = chromosome_prefix(self.sample_id, &self.chromosome);
        key.push(SEPARATOR);
        let mut chunk = [0u8; SIZE_CHUNK];
        BigEndian::write_u32(&mut chunk, self.chunk_start);
        key.extend_from_slice(&chunk);
        key
    }

    /// Parses a key produced by [`Self::to_bytes`]
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidRowKey`] if the key is too short, has no separator
    /// where expected, or the chromosome is not UTF-8.
    pub fn from_bytes(key: &[u8]) -> Result<Self> {
        let invalid = |reason: &str| DecodeError::InvalidRowKey(format!("{reason} ({key:?})"));
        if key.len() < SIZE_SAMPLE + 1 + SIZE_CHUNK + 1 {
            return Err(invalid("too short").into());
        }
        let separator = key.len() - SIZE_CHUNK - 1;
        if key[separator] != SEPARATOR {
            return Err(invalid("missing separator").into());
        }
        let chromosome = std::str::from_utf8(&key[SIZE_SAMPLE..separator])
            .map_err(|_| invalid("chromosome is not UTF-8"))?;
        if chromosome.bytes().any(|b| b == SEPARATOR) {
            return Err(invalid("separator inside chromosome").into());
        }
        Ok(Self {
            sample_id: BigEndian::read_u32(&key[..SIZE_SAMPLE]),
            chromosome: chromosome.to_string(),
            chunk_start: BigEndian::read_u32(&key[separator + 1..]),
        })
    }
}

fn chromosome_prefix(sample_id: u32, chromosome: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(SIZE_SAMPLE + chromosome.len() + 1 + SIZE_CHUNK);
    let mut sample = [0u8; SIZE_SAMPLE];
    BigEndian::write_u32(&mut sample, sample_id);
    key.extend_from_slice(&sample);
    key.extend_from_slice(chromosome.as_bytes());
    key
}

/// Half-open range of row keys; `end: None` is unbounded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Option<Vec<u8>>,
}
impl KeyRange {
    /// Every chunk of a sample
    #[must_use]
    pub fn sample(sample_id: u32) -> Self {
        let mut start = [0u8; SIZE_SAMPLE];
        BigEndian::write_u32(&mut start, sample_id);
        let end = sample_id.checked_add(1).map(|next| {
            let mut end = [0u8; SIZE_SAMPLE];
            BigEndian::write_u32(&mut end, next);
            end.to_vec()
        });
        Self {
            start: start.to_vec(),
            end,
        }
    }

    /// Every chunk of a sample on one chromosome
    pub fn chromosome(sample_id: u32, chromosome: &str) -> Result<Self> {
        Variant::check_chromosome(chromosome)?;
        let mut start = chromosome_prefix(sample_id, chromosome);
        let mut end = start.clone();
        start.push(SEPARATOR);
        end.push(SEPARATOR + 1);
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    /// Chunks of a sample overlapping `region`
    pub fn region(sample_id: u32, region: &Region, chunk_size: u32) -> Result<Self> {
        let first = region.start - region.start % chunk_size;
        let last = region.end - region.end % chunk_size;
        let start = RowKey::new(sample_id, &region.chromosome, first)?.to_bytes();
        let end = match last.checked_add(1) {
            Some(after) => RowKey::new(sample_id, &region.chromosome, after)?.to_bytes(),
            None => Self::chromosome(sample_id, &region.chromosome)?
                .end
                .unwrap_or_default(),
        };
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.end.as_deref().is_none_or(|end| key < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() -> anyhow::Result<()> {
        let key = RowKey::new(7, "chr22", 16_050_000)?;
        assert_eq!(RowKey::from_bytes(&key.to_bytes())?, key);
        assert!(RowKey::new(7, "chr\u{0}1", 0).is_err());
        assert!(RowKey::from_bytes(&[0, 0, 0, 7, 0, 0, 0]).is_err());
        Ok(())
    }

    #[test]
    fn test_byte_order_matches_key_order() -> anyhow::Result<()> {
        let mut keys = vec![
            RowKey::new(1, "2", 0)?,
            RowKey::new(1, "10", 0)?,
            RowKey::new(1, "1", 20_000)?,
            RowKey::new(1, "1", 10_000)?,
            RowKey::new(0, "X", 0)?,
            RowKey::new(256, "1", 0)?,
        ];
        let mut bytes: Vec<Vec<u8>> = keys.iter().map(RowKey::to_bytes).collect();
        keys.sort();
        bytes.sort();
        let parsed = bytes
            .iter()
            .map(|b| RowKey::from_bytes(b))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(parsed, keys);
        Ok(())
    }

    #[test]
    fn test_ranges() -> anyhow::Result<()> {
        let sample = KeyRange::sample(3);
        assert!(sample.contains(&RowKey::new(3, "Y", u32::MAX)?.to_bytes()));
        assert!(!sample.contains(&RowKey::new(4, "1", 0)?.to_bytes()));
        assert!(KeyRange::sample(u32::MAX).end.is_none());

        let chromosome = KeyRange::chromosome(3, "1")?;
        assert!(chromosome.contains(&RowKey::new(3, "1", 50)?.to_bytes()));
        assert!(!chromosome.contains(&RowKey::new(3, "10", 0)?.to_bytes()));

        let region = KeyRange::region(3, &Region::new("1", 15_000, 30_500), 10_000)?;
        assert!(!region.contains(&RowKey::new(3, "1", 0)?.to_bytes()));
        assert!(region.contains(&RowKey::new(3, "1", 10_000)?.to_bytes()));
        assert!(region.contains(&RowKey::new(3, "1", 30_000)?.to_bytes()));
        assert!(!region.contains(&RowKey::new(3, "1", 40_000)?.to_bytes()));

        let tail = KeyRange::region(3, &Region::chromosome("1"), 1)?;
        assert!(tail.contains(&RowKey::new(3, "1", u32::MAX)?.to_bytes()));
        assert!(!tail.contains(&RowKey::new(3, "10", 0)?.to_bytes()));
        Ok(())
    }
}
