//! Pipeline tests from archive bytes to batches
//!
//! Every test works from a cached archive in a temp dir, so none touch the
//! network or a database.

mod common;

use async_trait::async_trait;
use common::{build_archive, build_archive_with_entry, dump_line, settings_with_cache};
use geonames_ingest::error::{ArchiveError, IngestError, WriteError};
use geonames_ingest::writer::BatchSink;
use geonames_ingest::{fetch_and_parse, IngestPipeline, LocationRecord, RunState};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Collects every batch it receives
#[derive(Clone, Default)]
struct CollectingSink {
    batches: Arc<Mutex<Vec<Vec<i64>>>>,
}

#[async_trait]
impl BatchSink for CollectingSink {
    async fn write_batch(
        &self,
        _batch_start: usize,
        batch: &[LocationRecord],
    ) -> Result<(), WriteError> {
        let ids = batch.iter().map(|r| r.geoname_id).collect();
        self.batches.lock().unwrap().push(ids);
        Ok(())
    }
}

fn cache_archive(dir: &TempDir, archive: &[u8]) -> std::path::PathBuf {
    let cache = dir.path().join("allCountries.zip");
    std::fs::write(&cache, archive).unwrap();
    cache
}

#[tokio::test]
async fn test_malformed_line_is_dropped_not_fatal() {
    let content = format!(
        "{}\n1\t2\t3\t4\t5\t6\t7\t8\n{}\n",
        dump_line(100, "CA", 10),
        dump_line(200, "CA", 20)
    );
    let dir = TempDir::new().unwrap();
    let cache = cache_archive(&dir, &build_archive(&content));

    let records = fetch_and_parse(&settings_with_cache(&cache), &CancellationToken::new())
        .await
        .unwrap();

    let ids: HashSet<i64> = records.iter().map(|r| r.geoname_id).collect();
    assert_eq!(ids, HashSet::from([100, 200]));
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_parse_reports_line_counts() {
    let mut content = String::new();
    for id in 1..=250 {
        content.push_str(&dump_line(id, "FR", id * 3));
        content.push('\n');
    }
    content.push_str("short\tline\n");

    let dir = TempDir::new().unwrap();
    let cache = cache_archive(&dir, &build_archive(&content));
    let pipeline = IngestPipeline::new(settings_with_cache(&cache)).unwrap();

    let output = pipeline.parse(&CancellationToken::new()).await.unwrap();

    assert_eq!(output.lines_read, 251);
    assert_eq!(output.lines_dropped, 1);
    assert_eq!(output.records.len(), 250);
}

#[tokio::test]
async fn test_missing_entry_aborts_before_parsing() {
    let dir = TempDir::new().unwrap();
    let cache = cache_archive(
        &dir,
        &build_archive_with_entry("cities500.txt", &dump_line(1, "US", 1)),
    );

    let err = fetch_and_parse(&settings_with_cache(&cache), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Archive(ArchiveError::MissingEntry { .. })
    ));
}

#[tokio::test]
async fn test_corrupt_cache_is_an_archive_error() {
    let dir = TempDir::new().unwrap();
    let cache = cache_archive(&dir, b"PK but not really");

    let err = fetch_and_parse(&settings_with_cache(&cache), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Archive(ArchiveError::Corrupt(_))));
}

#[tokio::test]
async fn test_run_writes_every_record_in_batches() {
    let content: String = (1..=5)
        .map(|id| format!("{}\n", dump_line(id, "DE", id)))
        .collect();
    let dir = TempDir::new().unwrap();
    let cache = cache_archive(&dir, &build_archive(&content));
    let pipeline = IngestPipeline::new(settings_with_cache(&cache)).unwrap();
    let sink = CollectingSink::default();

    let report = pipeline
        .run_with_sink(sink.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.records_parsed, 5);
    assert_eq!(report.records_written, 5);
    assert_eq!(report.batches_committed, 3);

    let batches = sink.batches.lock().unwrap();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let written: HashSet<i64> = batches.iter().flatten().copied().collect();
    assert_eq!(written, (1..=5).collect::<HashSet<i64>>());

    let last = pipeline.last_run();
    assert_eq!(last.state(), RunState::Done);
    assert!(last.failure().is_none());
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let cache = cache_archive(&dir, &build_archive(&dump_line(1, "US", 1)));
    let pipeline = IngestPipeline::new(settings_with_cache(&cache)).unwrap();
    let sink = CollectingSink::default();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline.run_with_sink(sink.clone(), &cancel).await.unwrap_err();

    assert!(matches!(err, IngestError::Cancelled));
    assert!(sink.batches.lock().unwrap().is_empty());

    let last = pipeline.last_run();
    assert_eq!(last.state(), RunState::Failed);
    assert_eq!(last.failure(), Some("Ingestion cancelled"));
}

#[tokio::test]
async fn test_failed_parse_is_recorded_on_the_pipeline() {
    let dir = TempDir::new().unwrap();
    let cache = cache_archive(&dir, b"PK but not really");
    let pipeline = IngestPipeline::new(settings_with_cache(&cache)).unwrap();
    assert_eq!(pipeline.last_run().state(), RunState::Idle);

    let err = pipeline.parse(&CancellationToken::new()).await.unwrap_err();

    let last = pipeline.last_run();
    assert_eq!(last.state(), RunState::Failed);
    assert_eq!(last.failure(), Some(err.to_string().as_str()));
}
