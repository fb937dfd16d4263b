#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_rundown` provides the small set of teardown primitives the daemon
//! and client session state machines use to shut a transfer down cleanly
//! from any thread without racing the threads still using it.
//!
//! # Design
//!
//! The original source modeled this with a hand-rolled three-state
//! `NORMAL → DISPOSING → DISPOSED` atomic plus a separate reader/writer
//! "rundown protection" gate. In a language with destructors and
//! ownership, that dance collapses to two primitives:
//!
//! - [`Disposer`]: a one-shot, thread-safe "has teardown run" latch
//!   (built on [`std::sync::Once`]) that lets any number of callers invoke
//!   `dispose()` concurrently or repeatedly while the actual teardown body
//!   runs exactly once, and later callers block until it has finished.
//! - [`Rundown`]: guards a collection (a client's channel-thread list, the
//!   server portal's identity map) that is read during normal operation and
//!   drained during teardown. `acquire_shared`/`acquire_unique` hand out a
//!   guard unless rundown has already been requested, in which case the
//!   caller gets `None` and must abort whatever it was about to do.
//! - [`CountGate`]: a one-shot counting barrier (a "gate guard") —
//!   `signal()` increments a counter, crossing the configured target wakes
//!   every waiter; `force_signal_all()` jumps straight to the target so
//!   teardown can release threads blocked in [`CountGate::wait`].
//!
//! # Invariants
//!
//! - [`Disposer::dispose`] runs its teardown closure at most once, no
//!   matter how many threads call it concurrently.
//! - Once [`Rundown::begin`] has been called, every subsequent
//!   `acquire_shared`/`acquire_unique` call returns `None`.
//! - [`CountGate::wait`] never blocks past `force_signal_all` having been
//!   called, even if `signal` is never called enough times to reach the
//!   target on its own.

use std::sync::{Condvar, Mutex, Once, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A one-shot, thread-safe teardown latch.
///
/// Any number of threads may call [`Disposer::dispose`] concurrently; the
/// supplied closure runs exactly once, and every caller — including ones
/// that arrive after teardown has already finished — only returns once it
/// has completed.
#[derive(Debug, Default)]
pub struct Disposer {
    once: Once,
}

impl Disposer {
    /// Creates a fresh, not-yet-disposed latch.
    #[must_use]
    pub const fn new() -> Self {
        Self { once: Once::new() }
    }

    /// Runs `teardown` the first time this is called; every call, from any
    /// thread, blocks until teardown has completed.
    pub fn dispose(&self, teardown: impl FnOnce()) {
        self.once.call_once(teardown);
    }

    /// Returns `true` if [`Disposer::dispose`] has completed at least once.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.once.is_completed()
    }
}

/// Guards a collection that is mutated during normal operation and drained
/// during teardown, refusing new shared or exclusive access once rundown
/// has begun.
pub struct Rundown<T> {
    requested: Mutex<bool>,
    inner: RwLock<T>,
}

impl<T> Rundown<T> {
    /// Wraps `value` with rundown protection.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            requested: Mutex::new(false),
            inner: RwLock::new(value),
        }
    }

    /// Acquires a shared (read) guard, or `None` if rundown has begun.
    ///
    /// The check-and-lock happens under an inner serializing mutex so a
    /// concurrent [`Rundown::begin`] cannot race between the flag check and
    /// the reader acquiring `inner`.
    #[must_use]
    pub fn acquire_shared(&self) -> Option<RwLockReadGuard<'_, T>> {
        let requested = self.requested.lock().unwrap_or_else(|e| e.into_inner());
        if *requested {
            return None;
        }
        Some(self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Acquires an exclusive (write) guard, or `None` if rundown has begun.
    #[must_use]
    pub fn acquire_unique(&self) -> Option<RwLockWriteGuard<'_, T>> {
        let requested = self.requested.lock().unwrap_or_else(|e| e.into_inner());
        if *requested {
            return None;
        }
        Some(self.inner.write().unwrap_or_else(|e| e.into_inner()))
    }

    /// Sets the rundown-requested flag and returns a final exclusive guard
    /// so the caller can drain/close whatever `T` holds. Idempotent: later
    /// callers still get a guard (ordinary `RwLock` exclusion applies), but
    /// the flag is only ever set once.
    pub fn begin(&self) -> RwLockWriteGuard<'_, T> {
        let mut requested = self.requested.lock().unwrap_or_else(|e| e.into_inner());
        *requested = true;
        drop(requested);
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns `true` if [`Rundown::begin`] has been called.
    #[must_use]
    pub fn is_rundown(&self) -> bool {
        *self.requested.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A one-shot counting barrier: waiters block until `signal` has been
/// called `target` times, or until `force_signal_all` short-circuits that.
pub struct CountGate {
    state: Mutex<GateState>,
    condvar: Condvar,
    target: u64,
}

struct GateState {
    count: u64,
    released: bool,
}

impl CountGate {
    /// Creates a gate that releases its waiters once `signal` has been
    /// called `target` times (or immediately, if `target == 0`).
    #[must_use]
    pub fn new(target: u64) -> Self {
        let released = target == 0;
        Self {
            state: Mutex::new(GateState { count: 0, released }),
            condvar: Condvar::new(),
            target,
        }
    }

    /// Records one signal; wakes every waiter once the target is reached.
    pub fn signal(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.released {
            return;
        }
        state.count += 1;
        if state.count >= self.target {
            state.released = true;
            self.condvar.notify_all();
        }
    }

    /// Forces the gate open immediately, releasing every current and future
    /// waiter regardless of how many `signal` calls were made. Used by
    /// teardown paths to unblock threads that would otherwise wait forever
    /// because a peer disappeared mid-transfer.
    pub fn force_signal_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.released {
            state.released = true;
            self.condvar.notify_all();
        }
    }

    /// Blocks the calling thread until the gate is released.
    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while !state.released {
            state = self.condvar.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Returns `true` if the gate has already released its waiters.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).released
    }
}

/// A [`CountGate`] that is only constructed once its target multiplicity is
/// known, letting teardown paths skip signaling a gate that was never set
/// up (an `initialized()` check before touching the inner gate).
#[derive(Default)]
pub struct LazyGate {
    inner: OnceLock<CountGate>,
}

impl LazyGate {
    /// Creates an uninitialized gate.
    #[must_use]
    pub const fn uninit() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Returns `true` once [`LazyGate::init`] has been called.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Sets the target multiplicity. Calling this more than once is a bug
    /// in the caller (a transfer is constructed exactly once); subsequent
    /// calls are ignored rather than panicking, matching the teardown-safe
    /// spirit of the rest of this crate.
    pub fn init(&self, target: u64) {
        let _ = self.inner.set(CountGate::new(target));
    }

    /// Signals the gate if initialized; a no-op otherwise.
    pub fn signal(&self) {
        if let Some(gate) = self.inner.get() {
            gate.signal();
        }
    }

    /// Forces the gate open if initialized; a no-op otherwise.
    pub fn force_signal_all(&self) {
        if let Some(gate) = self.inner.get() {
            gate.force_signal_all();
        }
    }

    /// Waits on the gate if initialized; returns immediately otherwise.
    pub fn wait(&self) {
        if let Some(gate) = self.inner.get() {
            gate.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn disposer_runs_teardown_exactly_once_under_contention() {
        let disposer = Arc::new(Disposer::new());
        let runs = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let disposer = Arc::clone(&disposer);
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    disposer.dispose(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(disposer.is_disposed());
    }

    #[test]
    fn rundown_refuses_access_after_begin() {
        let rundown = Rundown::new(Vec::<i32>::new());
        assert!(rundown.acquire_shared().is_some());
        {
            let mut guard = rundown.begin();
            guard.push(1);
        }
        assert!(rundown.acquire_shared().is_none());
        assert!(rundown.acquire_unique().is_none());
        assert!(rundown.is_rundown());
    }

    #[test]
    fn count_gate_releases_at_target() {
        let gate = Arc::new(CountGate::new(3));
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait())
        };
        gate.signal();
        gate.signal();
        assert!(!gate.is_released());
        gate.signal();
        waiter.join().unwrap();
        assert!(gate.is_released());
    }

    #[test]
    fn count_gate_force_signal_releases_early() {
        let gate = CountGate::new(100);
        gate.signal();
        assert!(!gate.is_released());
        gate.force_signal_all();
        assert!(gate.is_released());
        gate.wait();
    }

    #[test]
    fn zero_target_gate_is_released_immediately() {
        let gate = CountGate::new(0);
        assert!(gate.is_released());
        gate.wait();
    }

    #[test]
    fn lazy_gate_no_ops_before_init() {
        let gate = LazyGate::uninit();
        assert!(!gate.initialized());
        gate.signal();
        gate.force_signal_all();
        gate.wait();
        assert!(!gate.initialized());
    }

    #[test]
    fn lazy_gate_behaves_once_initialized() {
        let gate = LazyGate::uninit();
        gate.init(1);
        assert!(gate.initialized());
        gate.signal();
        gate.wait();
    }
}
