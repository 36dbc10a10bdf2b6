//! In-process guard against concurrent ingestion runs
//!
//! Only one run may write to `locations` at a time. The flag is held by a
//! [`RunGuard`] for the lifetime of the background task and released on drop,
//! including when the task fails or panics.

use geonames_common::config::IngestSettings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct IngestTrigger {
    running: Arc<AtomicBool>,
    settings: Arc<IngestSettings>,
    shutdown: CancellationToken,
}

impl IngestTrigger {
    /// `shutdown` is cancelled when the server stops; runs observe a child of it
    pub fn new(settings: IngestSettings, shutdown: CancellationToken) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            settings: Arc::new(settings),
            shutdown,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the run slot, or `None` when a run is already in progress
    pub fn try_start(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                running: Arc::clone(&self.running),
            })
    }

    pub fn run_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

#[derive(Debug)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
