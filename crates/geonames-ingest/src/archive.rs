//! Zip archive access
//!
//! The dump is a single zip holding one large text entry. The archive is kept
//! in memory and the entry is inflated lazily as it is read.

use std::io::{BufRead, BufReader, Cursor};
use tracing::info;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::ArchiveError;

/// Read buffer for the inflated entry
const ENTRY_BUFFER_SIZE: usize = 1 << 20;

pub struct ArchiveReader {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    entry_name: String,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("entries", &self.archive.len())
            .field("entry_name", &self.entry_name)
            .finish()
    }
}

impl ArchiveReader {
    /// Open `bytes` as a zip archive and check that `entry_name` exists
    pub fn open(bytes: Vec<u8>, entry_name: &str) -> Result<Self, ArchiveError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let size = match archive.by_name(entry_name) {
            Ok(entry) => entry.size(),
            Err(ZipError::FileNotFound) => {
                return Err(ArchiveError::MissingEntry {
                    name: entry_name.to_string(),
                })
            },
            Err(e) => return Err(ArchiveError::Corrupt(e)),
        };

        info!(
            entry = entry_name,
            entries = archive.len(),
            uncompressed_bytes = size,
            "Opened archive"
        );

        Ok(Self {
            archive,
            entry_name: entry_name.to_string(),
        })
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    /// Hand the inflated entry to `consume` as a buffered reader
    ///
    /// Takes `self`: the entry can be streamed exactly once.
    pub fn read_entry<T>(
        mut self,
        consume: impl FnOnce(&mut dyn BufRead) -> T,
    ) -> Result<T, ArchiveError> {
        let entry = self.archive.by_name(&self.entry_name)?;
        let mut reader = BufReader::with_capacity(ENTRY_BUFFER_SIZE, entry);
        Ok(consume(&mut reader))
    }
}
