//! Fan-out parsing of the dump's lines
//!
//! One producer (the calling thread) reads the inflated entry line by line
//! and pushes each line into a bounded queue. A fixed set of parser threads
//! drains the queue. Each thread collects its records in a private buffer;
//! the buffers are concatenated after every thread has been joined, so the
//! aggregate is never shared while parsing.
//!
//! ```text
//!   reader ──► bounded queue ──┬─► parser 0 ─► Vec ─┐
//!                              ├─► parser 1 ─► Vec ─┼─► aggregate
//!                              └─► parser N ─► Vec ─┘
//! ```
//!
//! A full queue blocks the producer (backpressure). Dropping the sender is
//! what closes the queue; parsers exit once it is closed and empty.

use crossbeam_channel::{bounded, Receiver, Sender};
use geonames_common::config::IngestSettings;
use std::io::BufRead;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::models::LocationRecord;
use crate::parser::parse_line;

/// Log a progress line every this many parsed records
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Characters of a rejected line to include in the warning
const LINE_PREVIEW_CHARS: usize = 80;

/// Result of draining one line stream
#[derive(Debug, Default)]
pub struct PoolOutput {
    /// Parsed records, in no particular order
    pub records: Vec<LocationRecord>,
    pub lines_read: u64,
    pub lines_dropped: u64,
}

impl PoolOutput {
    pub fn lines_parsed(&self) -> u64 {
        self.records.len() as u64
    }
}

#[derive(Debug, Default)]
struct Progress {
    parsed: AtomicU64,
    dropped: AtomicU64,
}

impl Progress {
    fn record_parsed(&self) {
        let parsed = self.parsed.fetch_add(1, Ordering::Relaxed) + 1;
        if parsed % PROGRESS_INTERVAL == 0 {
            info!(processed = parsed, "Parse progress");
        }
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self::new(settings.workers, settings.queue_capacity)
    }

    /// Parse every line of `reader`
    ///
    /// Blocks until the reader is exhausted, the queue is closed and every
    /// parser thread has exited. Run it on a blocking thread when called from
    /// async code.
    pub fn run<R>(&self, reader: &mut R, cancel: &CancellationToken) -> Result<PoolOutput>
    where
        R: BufRead + ?Sized,
    {
        let (sender, receiver) = bounded::<String>(self.queue_capacity);
        let progress = Progress::default();

        info!(
            workers = self.workers,
            queue_capacity = self.queue_capacity,
            "Starting parser pool"
        );

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);
            for worker_id in 0..self.workers {
                let receiver = receiver.clone();
                let progress = &progress;
                let handle = thread::Builder::new()
                    .name(format!("geonames-parser-{worker_id}"))
                    .spawn_scoped(scope, move || parse_worker(worker_id, receiver, progress))
                    .map_err(|e| IngestError::Task(format!("failed to spawn parser thread: {e}")))?;
                handles.push(handle);
            }
            drop(receiver);

            // Consumes the sender, so the queue is closed however this returns.
            let produced = produce_lines(reader, sender, cancel);

            let mut records = Vec::new();
            for handle in handles {
                let local = handle
                    .join()
                    .map_err(|_| IngestError::Task("parser thread panicked".to_string()))?;
                records.extend(local);
            }

            let lines_read = produced?;
            let lines_dropped = progress.dropped.load(Ordering::Relaxed);

            info!(
                lines_read,
                records = records.len(),
                lines_dropped,
                "Parser pool finished"
            );

            Ok(PoolOutput {
                records,
                lines_read,
                lines_dropped,
            })
        })
    }
}

/// Push every line into the queue; returns the number of lines read
fn produce_lines<R>(reader: &mut R, sender: Sender<String>, cancel: &CancellationToken) -> Result<u64>
where
    R: BufRead + ?Sized,
{
    let mut buf = Vec::with_capacity(1024);
    let mut lines_read = 0u64;

    loop {
        if cancel.is_cancelled() {
            warn!(lines_read, "Cancellation requested, closing parse queue");
            return Err(IngestError::Cancelled);
        }

        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).map_err(IngestError::Stream)?;
        if n == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }

        lines_read += 1;
        let line = String::from_utf8_lossy(&buf).into_owned();

        if sender.send(line).is_err() {
            return Err(IngestError::Task(
                "all parser threads exited before the stream ended".to_string(),
            ));
        }
    }

    debug!(lines_read, "Line stream exhausted");
    Ok(lines_read)
}

fn parse_worker(worker_id: usize, receiver: Receiver<String>, progress: &Progress) -> Vec<LocationRecord> {
    let mut local = Vec::new();

    for line in receiver.iter() {
        match parse_line(&line) {
            Ok(record) => {
                local.push(record);
                progress.record_parsed();
            },
            Err(e) => {
                progress.record_dropped();
                let preview: String = line.chars().take(LINE_PREVIEW_CHARS).collect();
                warn!(worker_id, error = %e, line = %preview, "Dropping unparsable line");
            },
        }
    }

    debug!(worker_id, parsed = local.len(), "Parser thread finished");
    local
}
