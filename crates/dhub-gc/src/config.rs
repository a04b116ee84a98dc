use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pacing of the garbage collector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcConfig {
    /// Time between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Blob ids deleted per batch.
    pub batch_size: usize,
    /// Pause between delete batches.
    pub batch_pause: Duration,
    /// Blobs checked between scan pauses.
    pub scan_batch: usize,
    /// Pause taken every `scan_batch` blobs while scanning.
    pub scan_pause: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            batch_size: 50,
            batch_pause: Duration::from_millis(100),
            scan_batch: 50,
            scan_pause: Duration::from_millis(100),
        }
    }
}

impl GcConfig {
    /// No pauses at all; cycles run back to back with `interval` between them.
    pub fn unpaced(interval: Duration) -> Self {
        Self {
            interval,
            batch_pause: Duration::ZERO,
            scan_pause: Duration::ZERO,
            ..Self::default()
        }
    }
}
