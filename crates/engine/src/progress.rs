//! Progress reporting: a rate-limited, coalescing callback invoked from
//! whichever channel thread happens to be free, per spec §5.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Minimum gap between two reports, once warmed up.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);
/// No reports are emitted until this much time has passed since the
/// reporter was created.
const WARMUP: Duration = Duration::from_secs(3);

/// `(bytes_transferred, total_bytes)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Coalesces progress updates from many channel threads into at most one
/// callback invocation per second, and none before a 3-second warmup.
///
/// Any number of threads may call [`ProgressReporter::report`]
/// concurrently; a single atomic "busy" flag means only one thread at a
/// time ever executes the callback, and every other concurrent call drops
/// its update rather than queuing or blocking.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    busy: AtomicBool,
    created_at: Instant,
    last_report: Mutex<Option<Instant>>,
}

impl ProgressReporter {
    /// Creates a reporter. `callback` being `None` makes every
    /// [`ProgressReporter::report`] call a no-op.
    #[must_use]
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            busy: AtomicBool::new(false),
            created_at: Instant::now(),
            last_report: Mutex::new(None),
        }
    }

    /// Reports `transferred` out of `total` bytes, subject to the busy
    /// flag, warmup, and rate limit described on [`ProgressReporter`].
    pub fn report(&self, transferred: u64, total: u64) {
        let Some(callback) = self.callback.as_ref() else {
            return;
        };
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let now = Instant::now();
        let should_call = {
            let mut last = self.last_report.lock().unwrap_or_else(|e| e.into_inner());
            let warmed_up = now.duration_since(self.created_at) >= WARMUP;
            let due = last.map_or(true, |t| now.duration_since(t) >= REPORT_INTERVAL);
            if warmed_up && due {
                *last = Some(now);
                true
            } else {
                false
            }
        };

        if should_call {
            callback(transferred, total);
        }
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn no_callback_is_a_silent_no_op() {
        let reporter = ProgressReporter::new(None);
        reporter.report(10, 100);
    }

    #[test]
    fn reports_are_suppressed_during_warmup() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let reporter = ProgressReporter::new(Some(Arc::new(move |_, _| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })));
        reporter.report(1, 100);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn busy_flag_drops_concurrent_reports() {
        // A report already "in flight" (busy = true) causes a concurrent
        // call to drop rather than block.
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let reporter = ProgressReporter::new(Some(Arc::new(move |_, _| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })));
        reporter.busy.store(true, Ordering::SeqCst);
        reporter.report(1, 100);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        reporter.busy.store(false, Ordering::SeqCst);
    }
}
