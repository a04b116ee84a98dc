//! Background thread that runs collection cycles on an interval.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::collector::GarbageCollector;
use crate::error::{GcError, GcResult};

/// Owns the collector thread. Dropping the worker stops and joins it.
#[derive(Debug)]
pub struct GcWorker {
    collector: Arc<GarbageCollector>,
    handle: Option<JoinHandle<()>>,
}

impl GcWorker {
    /// Start the thread. The first cycle runs immediately; later cycles
    /// start `interval` after the previous one finished.
    pub fn spawn(collector: Arc<GarbageCollector>) -> GcResult<Self> {
        let runner = Arc::clone(&collector);
        let handle = thread::Builder::new()
            .name("dhub-gc".into())
            .spawn(move || run(&runner))?;
        info!(
            interval_secs = collector.config().interval.as_secs(),
            "gc worker started"
        );
        Ok(Self {
            collector,
            handle: Some(handle),
        })
    }

    pub fn collector(&self) -> &Arc<GarbageCollector> {
        &self.collector
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread to stop. With `wait`, block until it has exited.
    pub fn stop(&mut self, wait: bool) -> GcResult<()> {
        self.collector.stop();
        if !wait {
            return Ok(());
        }
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| GcError::Backend("gc worker panicked".into()))?;
            info!("gc worker stopped");
        }
        Ok(())
    }
}

impl Drop for GcWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop(true) {
                warn!(error = %e, "gc worker did not shut down cleanly");
            }
        }
    }
}

fn run(collector: &GarbageCollector) {
    let signal = collector.stop_signal();
    loop {
        match collector.collect() {
            Ok(_) => {}
            Err(GcError::Stopped) => break,
            Err(e) => error!(error = %e, "gc cycle failed"),
        }
        if signal.wait_timeout(collector.config().interval) {
            break;
        }
    }
    collector.stop();
}
