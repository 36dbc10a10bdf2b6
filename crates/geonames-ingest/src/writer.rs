//! Batched, idempotent persistence of parsed records
//!
//! The aggregate is cut into consecutive batches. Every batch is one
//! transaction holding one multi-row `INSERT ... ON CONFLICT (geoname_id) DO
//! UPDATE`, so replaying the same dump leaves the table unchanged. Batches are
//! written strictly one after another and each commit is durable on its own:
//! a failure stops the run but keeps everything committed before it.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::borrow::Cow;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result, WriteError, WritePhase};
use crate::models::{LocationRecord, LOCATION_COLUMNS};

const UPSERT_CONFLICT_CLAUSE: &str = r#"
    ON CONFLICT (geoname_id)
    DO UPDATE SET
        name = EXCLUDED.name,
        ascii_name = EXCLUDED.ascii_name,
        alternate_names = EXCLUDED.alternate_names,
        latitude = EXCLUDED.latitude,
        longitude = EXCLUDED.longitude,
        feature_class = EXCLUDED.feature_class,
        feature_code = EXCLUDED.feature_code,
        country_code = EXCLUDED.country_code,
        admin1_code = EXCLUDED.admin1_code,
        admin2_code = EXCLUDED.admin2_code,
        population = EXCLUDED.population,
        elevation = EXCLUDED.elevation,
        timezone = EXCLUDED.timezone,
        modification_date = EXCLUDED.modification_date
"#;

/// Destination for one batch of records
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Persist `batch` atomically
    ///
    /// `batch_start` is the offset of the batch's first record in the
    /// aggregate and is only used for error context.
    async fn write_batch(
        &self,
        batch_start: usize,
        batch: &[LocationRecord],
    ) -> std::result::Result<(), WriteError>;
}

/// Upserts into the `locations` table
#[derive(Clone)]
pub struct PgLocationSink {
    pool: PgPool,
}

impl PgLocationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BatchSink for PgLocationSink {
    async fn write_batch(
        &self,
        batch_start: usize,
        batch: &[LocationRecord],
    ) -> std::result::Result<(), WriteError> {
        let rows = dedupe_last_wins(batch);
        if rows.is_empty() {
            return Ok(());
        }

        let failed = |phase, source| WriteError {
            batch_start,
            batch_size: batch.len(),
            phase,
            source,
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| failed(WritePhase::Begin, e))?;

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO locations ({LOCATION_COLUMNS}) "));

        query_builder.push_values(rows.iter(), |mut b, record| {
            b.push_bind(record.geoname_id)
                .push_bind(&record.name)
                .push_bind(&record.ascii_name)
                .push_bind(&record.alternate_names)
                .push_bind(record.latitude)
                .push_bind(record.longitude)
                .push_bind(&record.feature_class)
                .push_bind(&record.feature_code)
                .push_bind(&record.country_code)
                .push_bind(&record.admin1_code)
                .push_bind(&record.admin2_code)
                .push_bind(record.population)
                .push_bind(record.elevation)
                .push_bind(&record.timezone)
                .push_bind(&record.modification_date);
        });

        query_builder.push(UPSERT_CONFLICT_CLAUSE);

        if let Err(e) = query_builder.build().execute(&mut *tx).await {
            if let Err(rollback) = tx.rollback().await {
                warn!(batch_start, error = %rollback, "Rollback after failed upsert also failed");
            }
            return Err(failed(WritePhase::Execute, e));
        }

        tx.commit().await.map_err(|e| failed(WritePhase::Commit, e))?;

        Ok(())
    }
}

/// Drop earlier occurrences of a repeated `geoname_id` within one batch
///
/// PostgreSQL refuses to update the same row twice in one statement. The last
/// occurrence is kept, which matches what sequential upserts would leave.
pub fn dedupe_last_wins(batch: &[LocationRecord]) -> Cow<'_, [LocationRecord]> {
    let mut seen = HashSet::with_capacity(batch.len());
    if batch.iter().all(|r| seen.insert(r.geoname_id)) {
        return Cow::Borrowed(batch);
    }

    seen.clear();
    let mut kept: Vec<LocationRecord> = batch
        .iter()
        .rev()
        .filter(|r| seen.insert(r.geoname_id))
        .cloned()
        .collect();
    kept.reverse();

    debug!(
        batch_size = batch.len(),
        duplicates = batch.len() - kept.len(),
        "Collapsed duplicate ids within batch"
    );
    Cow::Owned(kept)
}

/// Number of batches needed for `records` items
pub fn batch_count(records: usize, batch_size: usize) -> usize {
    records.div_ceil(batch_size.max(1))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub batches_committed: usize,
    pub records_written: usize,
}

pub struct BatchUpsertWriter<S> {
    sink: S,
    batch_size: usize,
}

impl<S: BatchSink> BatchUpsertWriter<S> {
    pub fn new(sink: S, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Write `records` batch by batch, in order
    ///
    /// Stops at the first failing batch. The token is checked before each
    /// batch, never in the middle of one.
    pub async fn write_all(
        &self,
        records: &[LocationRecord],
        cancel: &CancellationToken,
    ) -> Result<WriteReport> {
        let total_batches = batch_count(records.len(), self.batch_size);
        let mut report = WriteReport::default();

        info!(
            records = records.len(),
            batch_size = self.batch_size,
            total_batches,
            "Writing records"
        );

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    batches_committed = report.batches_committed,
                    "Cancellation requested, stopping before next batch"
                );
                return Err(IngestError::Cancelled);
            }

            let batch_start = index * self.batch_size;
            debug!("Storing chunk {} / {}", index + 1, total_batches);

            self.sink.write_batch(batch_start, batch).await?;

            report.batches_committed += 1;
            report.records_written += batch.len();
            info!(batch_start, batch_size = batch.len(), "Batch committed");
        }

        info!(
            batches = report.batches_committed,
            records = report.records_written,
            "All batches committed"
        );

        Ok(report)
    }
}
