//! Writer-preferring reader-writer latch.
//!
//! [`RwLatch`] admits any number of concurrent readers or a single
//! exclusive writer. It differs from [`std::sync::RwLock`] in one
//! deliberate way: once a writer starts waiting, no newly-arriving
//! reader is admitted until that writer has run. A continuous stream of
//! readers therefore cannot starve a writer.
//!
//! The inverse trade-off is accepted: a continuous stream of writers
//! can starve readers indefinitely.
//!
//! # Protocol
//!
//! Internal state is a small state machine guarded by one mutex, with
//! two condition variables (one per waiter class):
//!
//! 1. `read()`: waits while a writer is active *or waiting*, then
//!    joins the reading phase.
//! 2. [`ReadGuard`] drop: leaves the reading phase; the last reader
//!    out signals one waiting writer.
//! 3. `write()`: registers as waiting, waits for the idle phase, then
//!    claims the writing phase.
//! 4. [`WriteGuard`] drop: returns to idle; hands off to one waiting
//!    writer if any, otherwise wakes every waiting reader.
//!
//! Wakeup order among waiters of the same class is whatever the
//! underlying condition variable provides; FIFO is not promised.
//!
//! # Panic Safety
//!
//! Both guards release on drop, including during unwinding, so a panic
//! inside a latched section cannot leave the latch held.

use parking_lot::{Condvar, Mutex};
use std::fmt;

/// Occupancy of the latch: idle, shared by `n` readers, or claimed by
/// one writer. Readers and a writer are never active together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nobody holds the latch.
    Idle,

    /// Held by this many readers (always at least one).
    Reading(usize),

    /// Held by a single writer.
    Writing,
}

/// State behind the internal mutex.
#[derive(Debug)]
struct LatchState {
    phase: Phase,

    /// Writers currently blocked in [`RwLatch::write`]. While this is
    /// non-zero, new readers are turned away.
    waiting_writers: usize,
}

/// A writer-preferring reader-writer latch.
///
/// # Example
///
/// ```rust
/// use latchtree::latch::RwLatch;
///
/// let latch = RwLatch::new();
///
/// // Readers share the latch.
/// let r1 = latch.read();
/// let r2 = latch.read();
/// drop((r1, r2));
///
/// // A writer has it alone.
/// let w = latch.write();
/// drop(w);
/// ```
pub struct RwLatch {
    state: Mutex<LatchState>,

    /// Signaled when readers may retry admission.
    readers: Condvar,

    /// Signaled when one waiting writer may retry admission.
    writers: Condvar,
}

impl RwLatch {
    /// Creates an idle latch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(LatchState {
                phase: Phase::Idle,
                waiting_writers: 0,
            }),
            readers: Condvar::new(),
            writers: Condvar::new(),
        }
    }

    /// Acquires the latch in shared mode, blocking while a writer is
    /// active or waiting.
    #[must_use = "the latch is released as soon as the guard is dropped"]
    pub fn read(&self) -> ReadGuard<'_> {
        let mut state = self.state.lock();
        while state.phase == Phase::Writing || state.waiting_writers > 0 {
            self.readers.wait(&mut state);
        }

        state.phase = match state.phase {
            Phase::Idle => Phase::Reading(1),
            Phase::Reading(n) => Phase::Reading(n + 1),
            Phase::Writing => unreachable!("reader admitted while a writer is active"),
        };

        ReadGuard { latch: self }
    }

    /// Acquires the latch in exclusive mode, blocking while any reader
    /// or writer is active.
    ///
    /// While this call is blocked the latch turns new readers away, so
    /// a steady reader stream cannot postpone the acquisition forever.
    #[must_use = "the latch is released as soon as the guard is dropped"]
    pub fn write(&self) -> WriteGuard<'_> {
        let mut state = self.state.lock();
        state.waiting_writers += 1;
        while state.phase != Phase::Idle {
            self.writers.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.phase = Phase::Writing;

        WriteGuard { latch: self }
    }

    /// Number of writers currently blocked in [`RwLatch::write`].
    ///
    /// Diagnostic snapshot only; the value may be stale by the time the
    /// caller looks at it.
    #[must_use]
    pub fn waiting_writers(&self) -> usize {
        self.state.lock().waiting_writers
    }
}

impl Default for RwLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RwLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RwLatch")
            .field("phase", &state.phase)
            .field("waiting_writers", &state.waiting_writers)
            .finish()
    }
}

/// Shared-mode hold on an [`RwLatch`]. Released on drop.
#[must_use = "the latch is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    latch: &'a RwLatch,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.latch.state.lock();
        state.phase = match state.phase {
            Phase::Reading(1) => {
                // Last reader out: give a waiting writer the first shot.
                self.latch.writers.notify_one();
                Phase::Idle
            }
            Phase::Reading(n) => Phase::Reading(n - 1),
            Phase::Idle | Phase::Writing => {
                unreachable!("read guard dropped outside the reading phase")
            }
        };
    }
}

/// Exclusive-mode hold on an [`RwLatch`]. Released on drop.
#[must_use = "the latch is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    latch: &'a RwLatch,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.latch.state.lock();
        debug_assert_eq!(state.phase, Phase::Writing);
        state.phase = Phase::Idle;

        if state.waiting_writers > 0 {
            self.latch.writers.notify_one();
        } else {
            self.latch.readers.notify_all();
        }
    }
}
