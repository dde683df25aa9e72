//! # Condition Variable.
//!
//! A **Condition Variable** allows a thread to efficiently block until a
//! certain condition is met, without consuming CPU cycles. It is always used
//! in conjunction with a [`Lock`] that guards access to shared data. One
//! thread waits for a *specific state* of the shared data, and another thread
//! *notifies* it when that state changes.
//!
//! Each waiter sleeps on its own semaphore. That lets
//! [`ConditionVariable::signal`] choose the waiter to wake: the one whose
//! thread has the highest priority at the time of the signal, the earliest
//! among equals.
//!
//! Signaling follows Mesa semantics. The signaled thread does not run
//! right away; it has to re-acquire the lock first, and by then the state
//! may have changed again. A waiter therefore re-checks its condition in a
//! loop:
//!
//! ```no_run
//! # use tickos::sync::{ConditionVariable, Lock};
//! # fn ready() -> bool { true }
//! # let (lock, condvar) = (Lock::new(), ConditionVariable::new());
//! lock.acquire();
//! while !ready() {
//!     condvar.wait(&lock);
//! }
//! lock.release();
//! ```
//!
//! [`ConditionVariable::wait_while`] does the same over a [`Mutex`]:
//!
//! ```rust,ignore
//! let guard = condvar.wait_while(&mutex, |state| state.is_empty());
//! ```
use super::{
    lock::Lock,
    mutex::{Mutex, MutexGuard},
    semaphore::{Semaphore, insert_by_priority},
};
use crate::{
    kernel::kernel,
    sync::SpinLock,
    thread::scheduler::highest,
};
use std::{collections::VecDeque, sync::Arc};

struct Waiter {
    tid: u64,
    sema: Arc<Semaphore>,
}

/// A Condition Variable
///
/// Condition variables represent the ability to block a thread such that it
/// consumes no CPU time while waiting for an event to occur. Condition
/// variables are typically associated with a boolean predicate (a condition)
/// and a lock. The predicate is always verified inside of the lock before
/// determining that a thread must block.
///
/// Every method panics unless the caller holds the lock it passes.
#[derive(Default)]
pub struct ConditionVariable {
    waiters: SpinLock<VecDeque<Waiter>>,
}

impl ConditionVariable {
    /// Creates a new condition variable which is ready to be waited on and
    /// signaled.
    pub fn new() -> Self {
        Self {
            waiters: SpinLock::new(VecDeque::new()),
        }
    }

    /// Atomically releases `lock` and waits to be signaled, then re-acquires
    /// `lock` before returning.
    pub fn wait(&self, lock: &Lock) {
        assert!(
            lock.held_by_current(),
            "ConditionVariable::wait() without holding the lock."
        );
        assert!(
            !abyss::interrupt::in_handler(),
            "ConditionVariable::wait() in an interrupt handler."
        );
        let sema = Arc::new(Semaphore::new(0));
        let mut waiters = self.waiters.lock();
        let ctx = kernel().sched.lock();
        let waiter = Waiter {
            tid: ctx.current,
            sema: sema.clone(),
        };
        insert_by_priority(&mut waiters, waiter, |w| ctx.thread(w.tid).priority);
        ctx.unlock();
        waiters.unlock();

        lock.release();
        sema.down();
        lock.acquire();
    }

    /// Wakes up one thread waiting on this condition variable, if any.
    ///
    /// Calls to `signal` are not buffered in any way.
    pub fn signal(&self, lock: &Lock) {
        assert!(
            lock.held_by_current(),
            "ConditionVariable::signal() without holding the lock."
        );
        let mut waiters = self.waiters.lock();
        let ctx = kernel().sched.lock();
        let idx = highest(waiters.iter().map(|w| &w.tid), &ctx.threads).map(|(idx, _)| idx);
        ctx.unlock();
        let waiter = idx.and_then(|idx| waiters.remove(idx));
        waiters.unlock();

        if let Some(waiter) = waiter {
            waiter.sema.up();
        }
    }

    /// Wakes up all threads waiting on this condition variable.
    pub fn broadcast(&self, lock: &Lock) {
        while self.len() > 0 {
            self.signal(lock);
        }
    }

    /// Number of waiting threads.
    pub fn len(&self) -> usize {
        let waiters = self.waiters.lock();
        let len = waiters.len();
        waiters.unlock();
        len
    }

    /// Returns true if no thread waits.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks the current thread while `predicate` returns `true`.
    ///
    /// This function takes reference of a [`Mutex`] and checks the
    /// predicate. If it returns `true`, the thread is blocked and the mutex is
    /// temporarily released. When the thread is signaled and wakes up, it
    /// reacquires the mutex and re-evaluates the predicate. This loop continues
    /// until the predicate returns `false`.
    ///
    /// There is **no need to check the predicate before calling** `wait_while`.
    /// It performs the entire check-and-sleep logic internally.
    pub fn wait_while<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        mut predicate: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        let mut guard = mutex.lock();
        while predicate(&mut guard) {
            guard = self.wait_guard(guard);
        }
        guard
    }

    /// Releases the mutex of `guard`, waits to be signaled, and returns the
    /// re-acquired guard.
    pub fn wait_guard<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex();
        // `wait` releases and re-acquires the lock itself.
        core::mem::forget(guard);
        self.wait(mutex.raw());
        mutex.lock_held()
    }

    /// Wakes up one blocked thread and unlocks `guard`.
    pub fn signal_guard<T>(&self, guard: MutexGuard<'_, T>) {
        self.signal(guard.mutex().raw());
        guard.unlock();
    }

    /// Wakes up all blocked threads and unlocks `guard`.
    pub fn broadcast_guard<T>(&self, guard: MutexGuard<'_, T>) {
        self.broadcast(guard.mutex().raw());
        guard.unlock();
    }
}
