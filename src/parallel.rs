use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::adaptor::SampleIndex;
use crate::entry::{SampleIndexEntry, SampleIndexEntryBuilder};
use crate::error::Result;
use crate::record::SampleVariantRecord;
use crate::schema::SampleIndexSchema;

/// Number of entries a thread builds between two `on_batch_complete` calls
pub const ENTRY_BATCH_SIZE: usize = 64;

/// The calls of one sample falling in one locus chunk
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub sample_id: u32,
    pub chromosome: String,
    pub chunk_start: u32,
    pub records: Vec<SampleVariantRecord>,
}
impl ChunkTask {
    /// Encodes every record of the task into a finished entry
    pub fn build(&self, schema: &Arc<SampleIndexSchema>) -> Result<SampleIndexEntry> {
        let mut builder = SampleIndexEntryBuilder::new(
            Arc::clone(schema),
            self.sample_id,
            &self.chromosome,
            self.chunk_start,
        )?;
        for record in &self.records {
            builder.add_record(record)?;
        }
        builder.build_entry()
    }
}

/// Groups the calls of a sample by chromosome and chunk, in row key order
pub fn chunk_tasks<I>(schema: &SampleIndexSchema, sample_id: u32, records: I) -> Vec<ChunkTask>
where
    I: IntoIterator<Item = SampleVariantRecord>,
{
    let mut chunks: BTreeMap<(String, u32), Vec<SampleVariantRecord>> = BTreeMap::new();
    for record in records {
        let chunk_start = schema.chunk_start(record.variant.position);
        chunks
            .entry((record.variant.chromosome.clone(), chunk_start))
            .or_default()
            .push(record);
    }
    chunks
        .into_iter()
        .map(|((chromosome, chunk_start), records)| ChunkTask {
            sample_id,
            chromosome,
            chunk_start,
            records,
        })
        .collect()
}

/// Trait for types that consume sample index entries built in parallel
///
/// Each worker thread owns its own clone of the processor.
pub trait EntryProcessor: Send + Clone {
    /// Process a single finished entry
    fn process_entry(&mut self, entry: SampleIndexEntry) -> Result<()>;

    /// Called when a thread finishes a batch of entries
    /// Default implementation does nothing
    fn on_batch_complete(&mut self) -> Result<()> {
        Ok(())
    }

    /// Set the thread ID for this processor
    #[allow(unused_variables)]
    fn set_tid(&mut self, tid: usize) {}

    fn get_tid(&self) -> Option<usize> {
        None
    }
}

/// Builds the entries of `tasks` on `num_threads` threads and hands them to `processor`
///
/// A thread count of zero uses every available core. Tasks are split in contiguous
/// ranges, one per thread.
pub fn build_parallel<P: EntryProcessor + 'static>(
    schema: Arc<SampleIndexSchema>,
    tasks: Vec<ChunkTask>,
    processor: P,
    num_threads: usize,
) -> Result<()> {
    let num_threads = if num_threads == 0 {
        num_cpus::get()
    } else {
        num_threads.min(num_cpus::get())
    };
    if tasks.is_empty() {
        return Ok(());
    }
    let tasks_per_thread = tasks.len().div_ceil(num_threads);
    debug!(
        tasks = tasks.len(),
        threads = num_threads,
        tasks_per_thread,
        "building entries"
    );
    let tasks = Arc::new(tasks);

    let mut handles = Vec::new();
    for tid in 0..num_threads {
        let mut processor = processor.clone();
        let schema = Arc::clone(&schema);
        let tasks = Arc::clone(&tasks);
        processor.set_tid(tid);

        let handle = std::thread::spawn(move || -> Result<()> {
            let start = tid * tasks_per_thread;
            let end = (start + tasks_per_thread).min(tasks.len());
            if start >= end {
                return Ok(());
            }
            for batch in step_ranges(start..end, ENTRY_BATCH_SIZE) {
                for task in &tasks[batch] {
                    processor.process_entry(task.build(&schema)?)?;
                }
                processor.on_batch_complete()?;
            }
            Ok(())
        });
        handles.push(handle);
    }

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("entry builder thread panicked"))??;
    }
    Ok(())
}

fn step_ranges(range: Range<usize>, step: usize) -> impl Iterator<Item = Range<usize>> {
    range
        .clone()
        .step_by(step)
        .map(move |start| start..(start + step).min(range.end))
}

/// An [`EntryProcessor`] that writes entries to a [`SampleIndex`]
///
/// Entries are buffered per thread and written at the end of each batch.
#[derive(Clone)]
pub struct StoreWriter {
    index: SampleIndex,
    buffer: Vec<SampleIndexEntry>,
    local_count: usize,
    written: Arc<Mutex<usize>>,
    tid: Option<usize>,
}
impl StoreWriter {
    #[must_use]
    pub fn new(index: SampleIndex) -> Self {
        Self {
            index,
            buffer: Vec::new(),
            local_count: 0,
            written: Arc::new(Mutex::new(0)),
            tid: None,
        }
    }

    /// Entries written by every clone of this writer
    #[must_use]
    pub fn written(&self) -> usize {
        *self.written.lock()
    }
}
impl EntryProcessor for StoreWriter {
    fn process_entry(&mut self, entry: SampleIndexEntry) -> Result<()> {
        self.buffer.push(entry);
        Ok(())
    }

    fn on_batch_complete(&mut self) -> Result<()> {
        for entry in self.buffer.drain(..) {
            self.index.write_entry(&entry)?;
            self.local_count += 1;
        }
        *self.written.lock() += self.local_count;
        self.local_count = 0;
        Ok(())
    }

    fn set_tid(&mut self, tid: usize) {
        self.tid = Some(tid);
    }

    fn get_tid(&self) -> Option<usize> {
        self.tid
    }
}

impl SampleIndex {
    /// Indexes the calls of `sample_id`, replacing the chunks they fall in
    ///
    /// Returns the number of entries written.
    pub fn index_sample<I>(&self, sample_id: u32, records: I, num_threads: usize) -> Result<usize>
    where
        I: IntoIterator<Item = SampleVariantRecord>,
    {
        let tasks = chunk_tasks(self.schema(), sample_id, records);
        let writer = StoreWriter::new(self.clone());
        build_parallel(Arc::clone(self.schema()), tasks, writer.clone(), num_threads)?;
        let written = writer.written();
        info!(sample = sample_id, entries = written, "sample indexed");
        Ok(written)
    }
}
