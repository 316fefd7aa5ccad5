/*!
 * Bounded concurrency control for translation work.
 *
 * Parallelism is clamped to one or two workers (local GPUs thrash beyond
 * that). The scheduler also owns the per-backend warmup guard - the first
 * successful contact with a backend must complete before any parallel
 * work - plus the batch-mode circuit breaker and the per-run quota ledger.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::app_config::{ASS_BATCH_SIZES, SRT_BATCH_SIZES};
use crate::backends::TranslationBackend;
use crate::errors::BackendError;
use crate::subtitle::SubtitleFormat;

/// Batch mode disables itself after this many failures with zero successes
const BATCH_FAILURE_LIMIT: u32 = 3;

/// Concurrency controller shared by a run
pub struct Scheduler {
    permits: Arc<Semaphore>,
    max_parallelism: usize,
    /// One warmup cell per backend name
    warmups: Mutex<HashMap<&'static str, Arc<tokio::sync::OnceCell<Result<(), String>>>>>,
    batch_failures: AtomicU32,
    batch_successes: AtomicU32,
    batch_disabled: AtomicBool,
    backend_unavailable: AtomicBool,
    srt_batch_size: usize,
    ass_batch_size: usize,
}

impl Scheduler {
    /// Build a scheduler; parallelism is clamped to 1..=2 and batch sizes
    /// snap to the nearest allowed value.
    pub fn new(max_parallelism: usize, srt_batch_size: usize, ass_batch_size: usize) -> Self {
        let max_parallelism = max_parallelism.clamp(1, 2);

        let srt_batch_size = if SRT_BATCH_SIZES.contains(&srt_batch_size) {
            srt_batch_size
        } else {
            0
        };
        let ass_batch_size = if ASS_BATCH_SIZES.contains(&ass_batch_size) {
            ass_batch_size
        } else {
            2
        };

        Self {
            permits: Arc::new(Semaphore::new(max_parallelism)),
            max_parallelism,
            warmups: Mutex::new(HashMap::new()),
            batch_failures: AtomicU32::new(0),
            batch_successes: AtomicU32::new(0),
            batch_disabled: AtomicBool::new(false),
            backend_unavailable: AtomicBool::new(false),
            srt_batch_size,
            ass_batch_size,
        }
    }

    /// Worker cap for this run
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Acquire a worker permit; held for the duration of one file
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("scheduler semaphore never closes")
    }

    /// Run the backend's readiness check and warmup exactly once per
    /// backend per process. Concurrent callers wait for the first one, so
    /// no parallel work starts before the backend answered successfully.
    pub async fn ensure_warm(&self, backend: &Arc<dyn TranslationBackend>) -> Result<(), BackendError> {
        let cell = {
            let mut warmups = self.warmups.lock();
            warmups
                .entry(backend.name())
                .or_insert_with(|| Arc::new(tokio::sync::OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_init(|| async {
                backend.ensure_ready().await.map_err(|e| e.to_string())?;
                backend.warmup().await.map_err(|e| e.to_string())?;
                info!("Backend {} ready", backend.name());
                Ok(())
            })
            .await;

        result
            .clone()
            .map_err(|message| BackendError::Unavailable(message))
    }

    /// Effective batch size for a subtitle format; 0 or 1 means
    /// line-by-line, 2 is the ASS micro-batch pair.
    pub fn batch_size_for(&self, format: SubtitleFormat) -> usize {
        match format {
            SubtitleFormat::Srt => self.srt_batch_size,
            SubtitleFormat::Ass => self.ass_batch_size,
        }
    }

    /// Whether batch requests should still be attempted
    pub fn batch_enabled(&self) -> bool {
        !self.batch_disabled.load(Ordering::SeqCst)
    }

    pub fn record_batch_success(&self) {
        self.batch_successes.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a failed batch; with zero successes after the limit, batch
    /// mode shuts off for the rest of the run.
    pub fn record_batch_failure(&self) {
        let failures = self.batch_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= BATCH_FAILURE_LIMIT
            && self.batch_successes.load(Ordering::SeqCst) == 0
            && !self.batch_disabled.swap(true, Ordering::SeqCst)
        {
            warn!(
                "Batch mode disabled after {} consecutive failures; falling back to line-by-line",
                failures
            );
        }
    }

    /// Batch telemetry: (successes, failures)
    pub fn batch_counters(&self) -> (u32, u32) {
        (
            self.batch_successes.load(Ordering::SeqCst),
            self.batch_failures.load(Ordering::SeqCst),
        )
    }

    /// Bench the backend for the rest of the run (quota exhaustion)
    pub fn mark_backend_unavailable(&self) {
        if !self.backend_unavailable.swap(true, Ordering::SeqCst) {
            warn!("Backend marked unavailable for the remainder of this run");
        }
    }

    pub fn backend_available(&self) -> bool {
        !self.backend_unavailable.load(Ordering::SeqCst)
    }
}
