//! End-to-end ingestion run
//!
//! ```text
//! Idle → Fetching → Parsing → Aggregated → Writing → Done
//!    └──────────┴─────────┴──────────┴─────────┴──→ Failed
//! ```
//!
//! Fetch and archive errors abort before any parsing. Malformed lines never
//! fail a run; they are counted and logged by the worker pool.

use geonames_common::config::IngestSettings;
use sqlx::PgPool;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::archive::ArchiveReader;
use crate::error::{IngestError, Result};
use crate::fetch::SourceFetcher;
use crate::models::LocationRecord;
use crate::pool::{PoolOutput, WorkerPool};
use crate::writer::{BatchSink, BatchUpsertWriter, PgLocationSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Parsing,
    Aggregated,
    Writing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// `Aggregated -> Done` is the end of a parse-only run
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (Idle, Fetching)
            | (Fetching, Parsing)
            | (Parsing, Aggregated)
            | (Aggregated, Writing)
            | (Aggregated, Done)
            | (Writing, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Current state of one run, plus the error that ended it if any
#[derive(Debug, Clone)]
pub struct RunTracker {
    state: RunState,
    failure: Option<String>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            failure: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = ?self.state, to = ?next, "Run state changed");
        self.state = next;
        Ok(())
    }

    /// Move to `Failed`, keeping the first recorded error
    pub fn fail(&mut self, err: &IngestError) {
        if self.state.is_terminal() {
            return;
        }
        self.state = RunState::Failed;
        self.failure = Some(err.to_string());
    }
}

/// Outcome of a full fetch, parse and write run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub lines_read: u64,
    pub lines_dropped: u64,
    pub records_parsed: usize,
    pub batches_committed: usize,
    pub records_written: usize,
    pub elapsed: Duration,
}

pub struct IngestPipeline {
    settings: IngestSettings,
    fetcher: SourceFetcher,
    last_run: Mutex<RunTracker>,
}

impl IngestPipeline {
    pub fn new(settings: IngestSettings) -> Result<Self> {
        settings.validate()?;
        let fetcher = SourceFetcher::new(&settings)?;
        Ok(Self {
            settings,
            fetcher,
            last_run: Mutex::new(RunTracker::new()),
        })
    }

    pub fn with_fetcher(mut self, fetcher: SourceFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Final state of the most recent run, and its error if it failed
    ///
    /// `Idle` until a run has finished.
    pub fn last_run(&self) -> RunTracker {
        self.last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch the archive and parse its entry into memory
    pub async fn parse(&self, cancel: &CancellationToken) -> Result<PoolOutput> {
        let mut tracker = RunTracker::new();
        let result = self.parse_stage(&mut tracker, cancel).await;
        let result = result.and_then(|output| {
            tracker.advance(RunState::Done)?;
            Ok(output)
        });
        self.finish(tracker, result)
    }

    /// Full run against PostgreSQL
    pub async fn run(&self, pool: &PgPool, cancel: &CancellationToken) -> Result<IngestReport> {
        self.run_with_sink(PgLocationSink::new(pool.clone()), cancel).await
    }

    pub async fn run_with_sink<S: BatchSink>(
        &self,
        sink: S,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let mut tracker = RunTracker::new();
        let result = self.run_stages(&mut tracker, sink, cancel).await;
        self.finish(tracker, result)
    }

    fn finish<T>(&self, mut tracker: RunTracker, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!(during = ?tracker.state(), error = %e, "Ingestion run failed");
            tracker.fail(e);
        }
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = tracker;
        result
    }

    async fn run_stages<S: BatchSink>(
        &self,
        tracker: &mut RunTracker,
        sink: S,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        let output = self.parse_stage(tracker, cancel).await?;

        tracker.advance(RunState::Writing)?;
        let writer = BatchUpsertWriter::new(sink, self.settings.batch_size);
        let written = writer.write_all(&output.records, cancel).await?;
        tracker.advance(RunState::Done)?;

        let report = IngestReport {
            lines_read: output.lines_read,
            lines_dropped: output.lines_dropped,
            records_parsed: output.records.len(),
            batches_committed: written.batches_committed,
            records_written: written.records_written,
            elapsed: started.elapsed(),
        };

        info!(
            records = report.records_written,
            batches = report.batches_committed,
            dropped = report.lines_dropped,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Ingestion complete"
        );

        Ok(report)
    }

    async fn parse_stage(
        &self,
        tracker: &mut RunTracker,
        cancel: &CancellationToken,
    ) -> Result<PoolOutput> {
        tracker.advance(RunState::Fetching)?;
        let bytes = self
            .fetcher
            .fetch(&self.settings.cache_path, &self.settings.source_url, cancel)
            .await?;
        let archive = ArchiveReader::open(bytes, &self.settings.entry_name)?;

        tracker.advance(RunState::Parsing)?;
        let pool = WorkerPool::from_settings(&self.settings);
        let cancel = cancel.clone();
        let output = tokio::task::spawn_blocking(move || -> Result<PoolOutput> {
            archive.read_entry(|reader| pool.run(reader, &cancel))?
        })
        .await??;

        tracker.advance(RunState::Aggregated)?;
        info!(
            records = output.records.len(),
            lines_read = output.lines_read,
            lines_dropped = output.lines_dropped,
            "Parsing complete"
        );

        Ok(output)
    }
}

/// Fetch and parse with `settings`, returning the whole aggregate
pub async fn fetch_and_parse(
    settings: &IngestSettings,
    cancel: &CancellationToken,
) -> Result<Vec<LocationRecord>> {
    let pipeline = IngestPipeline::new(settings.clone())?;
    Ok(pipeline.parse(cancel).await?.records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut tracker = RunTracker::new();
        for next in [
            RunState::Fetching,
            RunState::Parsing,
            RunState::Aggregated,
            RunState::Writing,
            RunState::Done,
        ] {
            tracker.advance(next).unwrap();
        }
        assert_eq!(tracker.state(), RunState::Done);
        assert!(tracker.failure().is_none());
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let mut tracker = RunTracker::new();
        let err = tracker.advance(RunState::Writing).unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidTransition {
                from: RunState::Idle,
                to: RunState::Writing
            }
        ));
        assert_eq!(tracker.state(), RunState::Idle);

        assert!(!RunState::Parsing.can_transition_to(RunState::Writing));
        assert!(!RunState::Done.can_transition_to(RunState::Fetching));
        assert!(!RunState::Failed.can_transition_to(RunState::Failed));
    }

    #[test]
    fn test_failed_is_terminal_and_keeps_first_error() {
        let mut tracker = RunTracker::new();
        tracker.advance(RunState::Fetching).unwrap();

        tracker.fail(&IngestError::Cancelled);
        tracker.fail(&IngestError::Task("later".to_string()));

        assert_eq!(tracker.state(), RunState::Failed);
        assert_eq!(tracker.failure(), Some("Ingestion cancelled"));
        assert!(tracker.advance(RunState::Parsing).is_err());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let settings = IngestSettings {
            batch_size: 0,
            ..IngestSettings::default()
        };
        assert!(matches!(IngestPipeline::new(settings), Err(IngestError::Config(_))));
    }
}
