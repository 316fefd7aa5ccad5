/*!
 * Graceful shutdown and cancellation.
 *
 * One process-wide token carries a cancel flag and a pause flag. Every
 * worker loop and every sleep checks the token at bounded intervals
 * (100 ms or less); long HTTP calls keep their own deadlines rather than
 * being force-killed. Threads register for observability so shutdown can
 * wait for in-flight work.
 */

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::info;
use parking_lot::Mutex;

/// Polling granularity for pause/cancel checks
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Process-wide cancellation token. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    paused: AtomicBool,
    active_workers: Mutex<HashSet<u64>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of all operations
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        info!("Cancellation requested");
    }

    /// Request that workers pause at their next checkpoint
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    /// Resume paused workers
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
    }

    /// Reset for a new run
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
        self.inner.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Register a worker for shutdown accounting
    pub fn register_worker(&self, id: u64) {
        self.inner.active_workers.lock().insert(id);
    }

    /// Unregister a worker on exit
    pub fn unregister_worker(&self, id: u64) {
        self.inner.active_workers.lock().remove(&id);
    }

    /// Number of currently registered workers
    pub fn active_worker_count(&self) -> usize {
        self.inner.active_workers.lock().len()
    }

    /// Sleep that wakes early on cancellation and blocks while paused.
    /// Returns false if cancelled.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            if Instant::now() >= deadline && !self.is_paused() {
                return true;
            }
            tokio::time::sleep(CHECK_INTERVAL.min(duration)).await;
        }
    }

    /// Block while paused, checking every interval. Returns false if
    /// cancelled while waiting.
    pub async fn wait_if_paused(&self) -> bool {
        while self.is_paused() {
            if self.is_cancelled() {
                return false;
            }
            tokio::time::sleep(CHECK_INTERVAL).await;
        }
        !self.is_cancelled()
    }

    /// Wait up to `timeout` for all registered workers to unregister.
    /// Returns true when the registry drained in time.
    pub async fn wait_for_workers(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_worker_count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(CHECK_INTERVAL).await;
        }
        true
    }
}

/// RAII registration of a worker against the token
pub struct WorkerGuard {
    token: CancellationToken,
    id: u64,
}

impl WorkerGuard {
    pub fn new(token: &CancellationToken, id: u64) -> Self {
        token.register_worker(id);
        Self { token: token.clone(), id }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.token.unregister_worker(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_shouldPropagateToClones() {
        let token = CancellationToken::new();
        let clone = token.clone();

        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());

        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_pauseAndResume() {
        let token = CancellationToken::new();

        token.pause();
        assert!(token.is_paused());
        token.resume();
        assert!(!token.is_paused());
    }

    #[test]
    fn test_workerGuard_shouldUnregisterOnDrop() {
        let token = CancellationToken::new();

        {
            let _guard = WorkerGuard::new(&token, 1);
            let _other = WorkerGuard::new(&token, 2);
            assert_eq!(token.active_worker_count(), 2);
        }

        assert_eq!(token.active_worker_count(), 0);
    }

    #[test]
    fn test_sleep_shouldReturnFalseWhenCancelled() {
        let token = CancellationToken::new();
        token.cancel();

        assert!(!tokio_test::block_on(token.sleep(Duration::from_secs(10))));
    }

    #[tokio::test]
    async fn test_sleep_shouldCompleteWhenNotCancelled() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_waitForWorkers_shouldTimeOutWhileRegistered() {
        let token = CancellationToken::new();
        token.register_worker(7);

        assert!(!token.wait_for_workers(Duration::from_millis(150)).await);

        token.unregister_worker(7);
        assert!(token.wait_for_workers(Duration::from_millis(150)).await);
    }
}
