//! Shared helpers for ingest integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use geonames_common::config::IngestSettings;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;

pub const ENTRY_NAME: &str = "allCountries.txt";

/// One dump line with 19 fields
pub fn dump_line(id: i64, country: &str, population: i64) -> String {
    format!(
        "{id}\tPlace {id}\tPlace {id}\tAlias {id}\t45.5\t-73.25\tP\tPPL\t{country}\t\t10\t\t\t\t{population}\t30\t32\tAmerica/Toronto\t2024-03-01"
    )
}

/// Zip holding `content` under [`ENTRY_NAME`]
pub fn build_archive(content: &str) -> Vec<u8> {
    build_archive_with_entry(ENTRY_NAME, content)
}

pub fn build_archive_with_entry(entry: &str, content: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    writer.start_file(entry, options).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Settings pointing at `cache_path`, with a source that must never be hit
pub fn settings_with_cache(cache_path: &Path) -> IngestSettings {
    IngestSettings {
        source_url: "http://127.0.0.1:9/unreachable.zip".to_string(),
        cache_path: cache_path.to_path_buf(),
        workers: 4,
        queue_capacity: 64,
        batch_size: 2,
        max_retries: 1,
        timeout_secs: 5,
        ..IngestSettings::default()
    }
}
