//! Two-phase mark-sweep over the blob store.
//!
//! Each cycle scans every blob id and records the unreferenced set `U`.
//! Only blobs in `U` that were also unreferenced in the previous cycle are
//! deleted; the rest are deferred to the next cycle. A blob that gains a
//! reference between cycles therefore survives.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dhub_element::ElementStore;
use dhub_store::BlobStore;
use dhub_types::BlobId;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::GcConfig;
use crate::error::{GcError, GcResult};
use crate::signal::StopSignal;

/// What the collector is doing right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GcState {
    Idle,
    Scanning,
    Sweeping,
    Stopped,
}

/// Outcome of one collection cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Blob ids examined during the scan.
    pub scanned: usize,
    /// Blobs found unreferenced in this cycle.
    pub unreferenced: usize,
    /// Unreferenced blobs seen for the first time, kept for the next cycle.
    pub deferred: usize,
    /// Blobs removed from the store.
    pub deleted: usize,
    /// Blobs whose deletion failed; they are retried next cycle.
    pub failed: usize,
    /// Bytes released by the deletions.
    pub bytes_freed: u64,
    /// The cycle ended early because of a stop request.
    pub interrupted: bool,
}

#[derive(Debug)]
struct Inner {
    state: GcState,
    /// Unreferenced set carried over from the previous cycle.
    previous: HashSet<BlobId>,
    last_report: Option<GcReport>,
}

/// Deletes blobs that no element references.
pub struct GarbageCollector {
    blobs: Arc<dyn BlobStore>,
    elements: Arc<dyn ElementStore>,
    config: GcConfig,
    signal: StopSignal,
    inner: Mutex<Inner>,
    /// Serializes whole cycles.
    cycle: Mutex<()>,
}

impl GarbageCollector {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        elements: Arc<dyn ElementStore>,
        config: GcConfig,
    ) -> Self {
        Self {
            blobs,
            elements,
            config,
            signal: StopSignal::new(),
            inner: Mutex::new(Inner {
                state: GcState::Idle,
                previous: HashSet::new(),
                last_report: None,
            }),
            cycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// A handle that stops this collector when raised.
    pub fn stop_signal(&self) -> StopSignal {
        self.signal.clone()
    }

    /// Request a stop. A running cycle finishes its current batch and
    /// returns; later calls to [`collect`](Self::collect) fail.
    pub fn stop(&self) {
        self.signal.stop();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state == GcState::Idle {
            inner.state = GcState::Stopped;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }

    pub fn state(&self) -> GcState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Blobs seen unreferenced once and awaiting confirmation, sorted.
    pub fn deferred_ids(&self) -> Vec<BlobId> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = inner.previous.iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn last_report(&self) -> Option<GcReport> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_report
            .clone()
    }

    /// Run one full cycle.
    pub fn collect(&self) -> GcResult<GcReport> {
        if self.signal.is_stopped() {
            self.lock_inner()?.state = GcState::Stopped;
            return Err(GcError::Stopped);
        }
        let _cycle = self
            .cycle
            .lock()
            .map_err(|e| GcError::Backend(format!("gc cycle lock poisoned: {e}")))?;

        self.lock_inner()?.state = GcState::Scanning;
        let result = self.run_cycle();

        let mut inner = self.lock_inner()?;
        inner.state = if self.signal.is_stopped() {
            GcState::Stopped
        } else {
            GcState::Idle
        };
        if let Ok(report) = &result {
            inner.last_report = Some(report.clone());
        }
        result
    }

    fn run_cycle(&self) -> GcResult<GcReport> {
        let mut report = GcReport::default();

        let Some(unreferenced) = self.scan(&mut report)? else {
            info!(scanned = report.scanned, "gc scan interrupted");
            report.interrupted = true;
            return Ok(report);
        };
        report.unreferenced = unreferenced.len();

        let mut candidates: Vec<BlobId> = {
            let inner = self.lock_inner()?;
            unreferenced.intersection(&inner.previous).copied().collect()
        };
        candidates.sort();
        report.deferred = unreferenced.len() - candidates.len();

        self.lock_inner()?.state = GcState::Sweeping;
        let leftover = self.sweep(&candidates, &mut report);

        let candidate_set: HashSet<_> = candidates.iter().copied().collect();
        let next: HashSet<BlobId> = unreferenced
            .difference(&candidate_set)
            .copied()
            .chain(leftover)
            .collect();
        self.lock_inner()?.previous = next;

        info!(
            scanned = report.scanned,
            unreferenced = report.unreferenced,
            deferred = report.deferred,
            deleted = report.deleted,
            failed = report.failed,
            bytes_freed = report.bytes_freed,
            interrupted = report.interrupted,
            "gc cycle complete"
        );
        Ok(report)
    }

    /// Mark phase. Returns `None` if a stop request interrupted the scan.
    fn scan(&self, report: &mut GcReport) -> GcResult<Option<HashSet<BlobId>>> {
        let scan_batch = self.config.scan_batch.max(1);
        let mut unreferenced = HashSet::new();

        for (i, id) in self.blobs.enumerate()?.enumerate() {
            if i > 0 && i % scan_batch == 0 && self.pause(self.config.scan_pause) {
                return Ok(None);
            }
            report.scanned += 1;
            if !self.elements.references_blob(&id)? {
                unreferenced.insert(id);
            }
        }
        Ok(Some(unreferenced))
    }

    /// Sweep phase. Returns candidates left in the store, either because the
    /// sweep was interrupted or because their deletion failed.
    fn sweep(&self, candidates: &[BlobId], report: &mut GcReport) -> Vec<BlobId> {
        let batch_size = self.config.batch_size.max(1);
        let mut leftover = Vec::new();

        for (n, chunk) in candidates.chunks(batch_size).enumerate() {
            let stopped = if n > 0 {
                self.pause(self.config.batch_pause)
            } else {
                self.signal.is_stopped()
            };
            if stopped {
                report.interrupted = true;
                leftover.extend_from_slice(&candidates[n * batch_size..]);
                break;
            }

            let bytes = self.blobs.size_of(chunk).unwrap_or_else(|e| {
                warn!(error = %e, "gc could not size batch");
                0
            });
            match self.blobs.delete_batch(chunk) {
                Ok(removed) => {
                    debug!(batch = n, removed, "gc batch deleted");
                    report.deleted += removed;
                    report.bytes_freed += bytes;
                }
                Err(e) => {
                    warn!(batch = n, error = %e, "gc batch delete failed, retrying one by one");
                    self.delete_each(chunk, report, &mut leftover);
                }
            }
        }
        leftover
    }

    fn delete_each(&self, ids: &[BlobId], report: &mut GcReport, leftover: &mut Vec<BlobId>) {
        for id in ids {
            let bytes = self.blobs.size_of(std::slice::from_ref(id)).unwrap_or(0);
            match self.blobs.delete(id) {
                Ok(true) => {
                    report.deleted += 1;
                    report.bytes_freed += bytes;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(blob = %id.short_hex(), error = %e, "gc could not delete blob");
                    report.failed += 1;
                    leftover.push(*id);
                }
            }
        }
    }

    /// Sleep between batches. Returns `true` if a stop was requested.
    fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            self.signal.is_stopped()
        } else {
            self.signal.wait_timeout(duration)
        }
    }

    fn lock_inner(&self) -> GcResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| GcError::Backend(format!("gc state lock poisoned: {e}")))
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("state", &self.state())
            .field("deferred", &self.deferred_ids().len())
            .field("config", &self.config)
            .finish()
    }
}
