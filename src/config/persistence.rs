//! Debounced configuration persistence.
//!
//! Handlers mutate the runtime and then mark the touched `(section, key)`
//! dirty through [`PersistenceHandle`]. The background service coalesces
//! rapid writes (the dirty set holds at most one entry per key) and saves a
//! full snapshot after the debounce delay. Shutdown flushes anything still
//! pending.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use super::runtime::ConfigRuntime;
use super::storage::ConfigStorage;

/// Default debounce delay before a save hits the flash.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(500);

const CHANNEL_CAPACITY: usize = 64;

/// Handle for marking configuration entries dirty. Cloneable, non-blocking.
#[derive(Clone)]
pub struct PersistenceHandle {
    dirty_tx: mpsc::Sender<(String, String)>,
}

impl PersistenceHandle {
    /// Mark `(section, key)` as needing persistence.
    ///
    /// Never blocks; if the channel is full a save is already pending and
    /// the full-snapshot write covers this entry anyway.
    pub fn mark_dirty(&self, section: &str, key: &str) {
        let _ = self
            .dirty_tx
            .try_send((section.to_string(), key.to_string()));
    }

    /// A handle whose marks go nowhere, for tests and tools.
    pub fn disconnected() -> Self {
        let (dirty_tx, _rx) = mpsc::channel(1);
        Self { dirty_tx }
    }
}

/// Background persistence service.
pub struct PersistenceService {
    runtime: Arc<ConfigRuntime>,
    storage: ConfigStorage,
    delay: Duration,
    dirty_rx: mpsc::Receiver<(String, String)>,
}

impl PersistenceService {
    /// Create the service and its handle.
    pub fn new(
        runtime: Arc<ConfigRuntime>,
        storage: ConfigStorage,
        delay: Duration,
    ) -> (Self, PersistenceHandle) {
        let (dirty_tx, dirty_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                runtime,
                storage,
                delay,
                dirty_rx,
            },
            PersistenceHandle { dirty_tx },
        )
    }

    /// Run until the handle side is dropped, then flush and exit.
    pub async fn run(mut self) {
        // One pending entry per (section, key); repeated marks coalesce.
        let mut dirty: HashSet<(String, String)> = HashSet::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let flush_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                entry = self.dirty_rx.recv() => {
                    match entry {
                        Some(entry) => {
                            dirty.insert(entry);
                            deadline.get_or_insert_with(|| Instant::now() + self.delay);
                        }
                        None => break,
                    }
                }
                _ = sleep_until(flush_at), if deadline.is_some() => {
                    self.flush(&mut dirty);
                    deadline = None;
                }
            }
        }

        if !dirty.is_empty() {
            self.flush(&mut dirty);
        }
    }

    fn flush(&self, dirty: &mut HashSet<(String, String)>) {
        if dirty.is_empty() {
            return;
        }

        let snapshot = self.runtime.snapshot();
        let values = snapshot
            .entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        match self.storage.save(&values) {
            Ok(()) => {
                tracing::debug!(
                    entries = dirty.len(),
                    generation = snapshot.generation(),
                    "configuration saved"
                );
                dirty.clear();
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.storage.path().display(), "configuration save failed");
                // Keep the dirty set; the next mark retries the write.
            }
        }
    }
}
