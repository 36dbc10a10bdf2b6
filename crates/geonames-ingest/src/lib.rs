//! Geonames Ingest Library
//!
//! Loads the geonames `allCountries` dump into PostgreSQL.
//!
//! # Pipeline
//!
//! - [`fetch`]: archive bytes from the local cache or the network
//! - [`archive`]: locate the text entry inside the zip
//! - [`pool`]: parse lines on a fixed set of threads fed by a bounded queue
//! - [`writer`]: upsert the aggregate in batches, one transaction each
//!
//! [`pipeline`] wires the stages together.
//!
//! # Example
//!
//! ```no_run
//! use geonames_common::config::IngestSettings;
//! use geonames_ingest::fetch_and_parse;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let records = fetch_and_parse(&IngestSettings::default(), &CancellationToken::new()).await?;
//!     println!("{} records", records.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod archive;
pub mod db;
pub mod error;
pub mod fetch;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod pool;
pub mod writer;

pub use error::{IngestError, Result};
pub use models::LocationRecord;
pub use pipeline::{fetch_and_parse, IngestPipeline, IngestReport, RunState};
