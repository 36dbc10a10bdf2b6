//! Archive retrieval with a local file cache
//!
//! The cache is consulted first and, when present, is the only source: no
//! request is made. Otherwise the archive is downloaded and written back to
//! the cache on a best-effort basis.

use futures::StreamExt;
use geonames_common::config::IngestSettings;
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{FetchError, IngestError, Result};

const USER_AGENT: &str = concat!("geonames-ingest/", env!("CARGO_PKG_VERSION"));

/// Upper bound on the buffer reserved from a `Content-Length` header
const MAX_PREALLOCATION: u64 = 64 << 20;

/// Upper bound on the wait between two download attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct SourceFetcher {
    client: reqwest::Client,
    max_retries: u32,
    backoff_base: Duration,
}

impl SourceFetcher {
    pub fn new(settings: &IngestSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            max_retries: settings.max_retries.max(1),
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the retry backoff unit (attempt `n` waits `base * 2^n`)
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Return the archive bytes from `cache_path`, or download them from `url`
    pub async fn fetch(
        &self,
        cache_path: &Path,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if tokio::fs::metadata(cache_path).await.is_ok() {
            info!(path = %cache_path.display(), "Using cached archive");
            let bytes = tokio::fs::read(cache_path).await.map_err(|source| {
                FetchError::CacheRead {
                    path: cache_path.to_path_buf(),
                    source,
                }
            })?;
            info!(bytes = bytes.len(), "Loaded cached archive");
            return Ok(bytes);
        }

        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            result = self.download_with_retry(url) => result?,
        };

        write_cache(cache_path, &bytes).await;

        Ok(bytes)
    }

    async fn download_with_retry(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let mut attempt = 1;

        loop {
            match self.download(url, attempt).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.max_retries => {
                    let backoff = retry_backoff(self.backoff_base, attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Download attempt failed, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn download(&self, url: &str, attempt: u32) -> std::result::Result<Vec<u8>, FetchError> {
        let network = |source| FetchError::Network {
            url: url.to_string(),
            attempts: attempt,
            source,
        };

        info!(url, attempt, "Downloading archive");
        let response = self.client.get(url).send().await.map_err(network)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total_size = response.content_length();
        let progress = download_progress(total_size);

        let reserve = total_size.map_or(0, |n| n.min(MAX_PREALLOCATION));
        let mut bytes = Vec::with_capacity(reserve as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(network)?;
            bytes.extend_from_slice(&chunk);
            progress.set_position(bytes.len() as u64);
        }

        progress.finish_and_clear();
        info!(bytes = bytes.len(), "Archive downloaded");

        Ok(bytes)
    }
}

/// Wait before the attempt after `attempt`: `base * 2^attempt`, capped at [`MAX_BACKOFF`]
pub fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |backoff| backoff.min(MAX_BACKOFF))
}

fn download_progress(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
            );
            bar
        },
        None => ProgressBar::new_spinner(),
    }
}

/// Persist downloaded bytes; failures are logged and otherwise ignored
async fn write_cache(cache_path: &Path, bytes: &[u8]) {
    if let Some(parent) = cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), error = %e, "Failed to create cache directory");
            return;
        }
    }

    // Only a complete file may ever appear at the cache path.
    let partial = partial_path(cache_path);
    let written = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, cache_path).await,
        Err(e) => Err(e),
    };

    match written {
        Ok(()) => info!(path = %cache_path.display(), "Archive cached"),
        Err(e) => {
            warn!(path = %cache_path.display(), error = %e, "Failed to write cache file");
            if let Err(e) = tokio::fs::remove_file(&partial).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %e, "Failed to remove partial cache file");
                }
            }
        },
    }
}

/// Sibling of `cache_path` the download is written to before the rename
fn partial_path(cache_path: &Path) -> PathBuf {
    let mut name = cache_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    cache_path.with_file_name(name)
}
