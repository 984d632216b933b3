use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::header::{StoreHeader, SIZE_HEADER};
use super::{KeyValueStore, Row, RowScanner};
use crate::error::{DecodeError, Result, StoreError};
use crate::key::KeyRange;

/// Rows fetched per lock acquisition while scanning
pub const DEFAULT_SCAN_BATCH: usize = 64;

/// zstd compression level of persisted stores
const COMPRESSION_LEVEL: i32 = 3;

type Table = BTreeMap<Vec<u8>, Row>;

/// An in-memory [`KeyValueStore`] backed by a sorted map
///
/// Clones share the same table. Scanners read the table in batches and never hold the lock
/// while yielding, so writers are not blocked by slow consumers. A scanner sees every row
/// committed before each batch it fetches.
///
/// The store can be persisted to a single file: a fixed [`StoreHeader`] followed by a zstd
/// stream of length-prefixed rows.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    table: Arc<RwLock<Table>>,
    available: Arc<AtomicBool>,
    batch_size: usize,
}
impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(BTreeMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            batch_size: DEFAULT_SCAN_BATCH,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Simulates an outage: while unavailable every operation fails with
    /// [`StoreError::Unavailable`], including scanners already open.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn check_available(available: &AtomicBool) -> Result<()> {
        if available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()).into())
        }
    }

    /// Writes every row to `path`
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let table = self.table.read();
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        StoreHeader::new(table.len() as u64).write_bytes(&mut writer)?;

        let mut encoder = zstd::Encoder::new(writer, COMPRESSION_LEVEL)?;
        for (key, row) in table.iter() {
            write_block(&mut encoder, key)?;
            encoder.write_u32::<LittleEndian>(row.len() as u32)?;
            for (column, value) in row {
                write_block(&mut encoder, column)?;
                write_block(&mut encoder, value)?;
            }
        }
        encoder.finish()?.flush()?;
        info!(
            path = %path.as_ref().display(),
            rows = table.len(),
            "saved sample index store"
        );
        Ok(())
    }

    /// Loads a store written by [`Self::save_to_path`]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;

        // Safety: the file is only read, and its content is copied out before returning
        let mmap = unsafe { Mmap::map(&file)? };
        let header = StoreHeader::from_buffer(&mmap)?;

        let mut decoder = zstd::Decoder::new(&mmap[SIZE_HEADER..])?;
        let mut table = BTreeMap::new();
        for _ in 0..header.rows {
            let key = read_block(&mut decoder)?;
            let columns = decoder.read_u32::<LittleEndian>()?;
            let mut row = Row::new();
            for _ in 0..columns {
                let column = read_block(&mut decoder)?;
                let value = read_block(&mut decoder)?;
                row.insert(column, value);
            }
            table.insert(key, row);
        }
        debug!(rows = header.rows, "loaded sample index store");

        Ok(Self {
            table: Arc::new(RwLock::new(table)),
            available: Arc::new(AtomicBool::new(true)),
            batch_size: DEFAULT_SCAN_BATCH,
        })
    }
}

fn write_block<W: Write>(writer: &mut W, block: &[u8]) -> Result<()> {
    writer.write_u32::<LittleEndian>(block.len() as u32)?;
    writer.write_all(block)?;
    Ok(())
}

fn read_block<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = LittleEndian::read_u32(&len) as usize;
    let mut block = vec![0u8; len];
    reader.read_exact(&mut block).map_err(|_| DecodeError::Truncated {
        offset: 0,
        needed: len,
        available: 0,
    })?;
    Ok(block)
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Row>> {
        Self::check_available(&self.available)?;
        Ok(self.table.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], row: Row) -> Result<()> {
        Self::check_available(&self.available)?;
        self.table.write().insert(key.to_vec(), row);
        Ok(())
    }

    fn scan(&self, range: &KeyRange) -> Result<Box<dyn RowScanner>> {
        Self::check_available(&self.available)?;
        Ok(Box::new(MemoryScanner {
            table: Arc::clone(&self.table),
            available: Arc::clone(&self.available),
            next: Bound::Included(range.start.clone()),
            end: range.end.clone(),
            batch: VecDeque::new(),
            batch_size: self.batch_size,
            exhausted: false,
            closed: false,
        }))
    }
}

/// Batched scanner over a [`MemoryStore`]
struct MemoryScanner {
    table: Arc<RwLock<Table>>,
    available: Arc<AtomicBool>,
    next: Bound<Vec<u8>>,
    end: Option<Vec<u8>>,
    batch: VecDeque<(Vec<u8>, Row)>,
    batch_size: usize,
    exhausted: bool,
    closed: bool,
}
impl MemoryScanner {
    fn fill(&mut self) {
        let end = match &self.end {
            Some(end) => Bound::Excluded(end.clone()),
            None => Bound::Unbounded,
        };
        if let (Bound::Included(start) | Bound::Excluded(start), Bound::Excluded(end)) =
            (&self.next, &end)
        {
            if start >= end {
                self.exhausted = true;
                return;
            }
        }

        let table = self.table.read();
        self.batch.extend(
            table
                .range((self.next.clone(), end))
                .take(self.batch_size)
                .map(|(key, row)| (key.clone(), row.clone())),
        );
        drop(table);

        match self.batch.back() {
            Some((last, _)) if self.batch.len() == self.batch_size => {
                self.next = Bound::Excluded(last.clone());
            }
            _ => self.exhausted = true,
        }
    }
}
impl Iterator for MemoryScanner {
    type Item = Result<(Vec<u8>, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        if let Err(err) = MemoryStore::check_available(&self.available) {
            return Some(Err(err));
        }
        if self.batch.is_empty() && !self.exhausted {
            self.fill();
        }
        self.batch.pop_front().map(Ok)
    }
}
impl RowScanner for MemoryScanner {
    fn close(&mut self) {
        self.closed = true;
        self.batch.clear();
    }
}
