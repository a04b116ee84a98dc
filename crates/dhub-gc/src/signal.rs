use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cooperative, one-way stop flag shared between a collector, its worker
/// and whoever wants to stop them.
///
/// Pauses are taken with [`wait_timeout`](Self::wait_timeout) so that a stop
/// request wakes a sleeping collector immediately.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn stop(&self) {
        let (flag, cond) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`. Returns `true` if the flag is raised.
    ///
    /// A timeout too large to express as a deadline waits for the flag alone.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cond) = &*self.inner;
        let deadline = Instant::now().checked_add(timeout);
        let mut stopped = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let Some(deadline) = deadline else {
                stopped = cond.wait(stopped).unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = cond
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_clear() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
        assert!(!signal.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn clones_share_the_flag() {
        let signal = StopSignal::new();
        signal.clone().stop();
        assert!(signal.is_stopped());
        assert!(signal.wait_timeout(Duration::from_secs(60)));
    }

    #[test]
    fn unbounded_timeout_returns_once_stopped() {
        let signal = StopSignal::new();
        signal.stop();
        assert!(signal.wait_timeout(Duration::MAX));
    }

    #[test]
    fn unbounded_wait_wakes_on_stop() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_timeout(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(20));
        signal.stop();
        assert!(waiter.join().expect("waiter should not panic"));
    }

    #[test]
    fn stop_wakes_a_long_wait() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let stopped = signal.wait_timeout(Duration::from_secs(600));
                (stopped, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        signal.stop();
        let (stopped, waited) = waiter.join().expect("waiter should not panic");
        assert!(stopped);
        assert!(waited < Duration::from_secs(60));
    }
}
