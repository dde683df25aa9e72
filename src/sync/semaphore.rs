//! # Semaphore.
//!
//! A **semaphore** is a fundamental synchronization primitive: a
//! nonnegative counter together with two atomic operations.
//!
//! - [`Semaphore::down`]: waits for the value to become positive, then
//!   decrements it.
//! - [`Semaphore::up`]: increments the value and wakes up one waiting
//!   thread, if any.
//!
//! A semaphore initialized to 0 signals an event that will happen exactly
//! once; a semaphore initialized to 1 guards a resource that only one thread
//! may use at a time; larger values count interchangeable resources.
//!
//! ## Wake order
//!
//! Waiters are kept in descending order of effective priority, FIFO among
//! equals. Priority donation can raise a waiter after it queued, so
//! [`Semaphore::up`] does not trust the order and picks the waiter with the
//! highest priority at the moment of the wake-up. If the woken thread
//! outranks the running one, the running thread yields: immediately in
//! thread context, or when the interrupt handler returns.
//!
//! #### Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tickos::sync::Semaphore;
//! use tickos::thread::ThreadBuilder;
//!
//! let done = Arc::new(Semaphore::new(0));
//! let signal = done.clone();
//! ThreadBuilder::new("worker").spawn(move || {
//!     // ... work ...
//!     signal.up();
//! });
//! // Blocks until the worker signals.
//! done.down();
//! ```
use crate::{
    kernel::{kernel, try_kernel},
    sync::WouldBlock,
    thread::scheduler::{self, Context, highest},
};
use abyss::interrupt::InterruptGuard;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};

/// State of a semaphore, owned by the scheduler context.
#[derive(Debug, Default)]
pub(crate) struct SemaphoreState {
    pub(crate) value: usize,
    /// Blocked threads, in descending order of the priority they had when
    /// they queued.
    pub(crate) waiters: VecDeque<u64>,
}

/// Insert `item` before the first entry of a lower priority.
pub(crate) fn insert_by_priority<T>(
    queue: &mut VecDeque<T>,
    item: T,
    priority_of: impl Fn(&T) -> i32,
) {
    let priority = priority_of(&item);
    let idx = queue
        .iter()
        .position(|other| priority_of(other) < priority)
        .unwrap_or(queue.len());
    queue.insert(idx, item);
}

impl Context {
    fn sema(&mut self, id: u64) -> &mut SemaphoreState {
        self.semaphores
            .get_mut(&id)
            .unwrap_or_else(|| panic!("Semaphore #{id} is not registered."))
    }

    /// Take a unit of the semaphore `id` if one is available.
    pub(crate) fn sema_try_down(&mut self, id: u64) -> bool {
        let sema = self.sema(id);
        if sema.value > 0 {
            sema.value -= 1;
            true
        } else {
            false
        }
    }

    /// Queue the running thread on the semaphore `id`.
    fn sema_wait(&mut self, id: u64) {
        let current = self.current;
        let Self {
            threads,
            semaphores,
            ..
        } = self;
        let Some(sema) = semaphores.get_mut(&id) else {
            panic!("Semaphore #{id} is not registered.");
        };
        insert_by_priority(&mut sema.waiters, current, |tid| {
            threads.get(tid).map_or(0, |th| th.priority)
        });
    }

    /// Release a unit of the semaphore `id`, waking the waiter of the highest
    /// priority. Returns the woken thread.
    pub(crate) fn sema_up(&mut self, id: u64) -> Option<u64> {
        let Self {
            threads,
            semaphores,
            ..
        } = self;
        let Some(sema) = semaphores.get_mut(&id) else {
            panic!("Semaphore #{id} is not registered.");
        };
        sema.value += 1;
        let woken = highest(&sema.waiters, threads).and_then(|(idx, _)| sema.waiters.remove(idx));
        if let Some(tid) = woken {
            self.unblock(tid);
        }
        woken
    }

    /// The highest priority among the waiters of the semaphore `id`.
    pub(crate) fn max_waiter_priority(&self, id: u64) -> Option<i32> {
        self.semaphores
            .get(&id)
            .and_then(|sema| highest(&sema.waiters, &self.threads))
            .map(|(_, priority)| priority)
    }
}

/// Counting semaphore.
///
/// A semaphore maintains a set of permits. Permits are used to synchronize
/// access to a shared resource. A semaphore differs from a lock in that it
/// can allow more than one concurrent caller to access the shared resource at
/// a time, and that any thread may `up` it.
///
/// Dropping a semaphore that threads still wait on is a kernel bug.
#[derive(Debug)]
pub struct Semaphore {
    id: u64,
}

impl Semaphore {
    /// Creates a new semaphore initialized with `value` permits.
    pub fn new(value: usize) -> Self {
        static ID: AtomicU64 = AtomicU64::new(1);
        let id = ID.fetch_add(1, Ordering::SeqCst);
        let mut ctx = kernel().sched.lock();
        ctx.semaphores.insert(
            id,
            SemaphoreState {
                value,
                waiters: VecDeque::new(),
            },
        );
        ctx.unlock();
        Self { id }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Waits until the value is positive and then decrements it.
    ///
    /// Panics if called from an interrupt handler.
    pub fn down(&self) {
        assert!(
            !abyss::interrupt::in_handler(),
            "Semaphore::down() in an interrupt handler."
        );
        let _cli = InterruptGuard::new();
        loop {
            let mut ctx = kernel().sched.lock();
            if ctx.sema_try_down(self.id) {
                ctx.unlock();
                break;
            }
            ctx.sema_wait(self.id);
            scheduler::block(ctx);
        }
    }

    /// Decrements the value if it is positive.
    ///
    /// This function does not block, and may be called from an interrupt
    /// handler.
    ///
    /// # Errors
    ///
    /// Returns [`WouldBlock`] if the value is 0.
    pub fn try_down(&self) -> Result<(), WouldBlock> {
        let mut ctx = kernel().sched.lock();
        let taken = ctx.sema_try_down(self.id);
        ctx.unlock();
        if taken { Ok(()) } else { Err(WouldBlock) }
    }

    /// Increments the value and wakes up the waiter of the highest priority,
    /// if any.
    ///
    /// May be called from an interrupt handler.
    pub fn up(&self) {
        let mut ctx = kernel().sched.lock();
        let woken = ctx.sema_up(self.id);
        let preempt = woken.is_some_and(|tid| ctx.outranks_current(tid));
        ctx.unlock();
        if preempt {
            scheduler::preempt_current();
        }
    }

    /// The current value.
    pub fn value(&self) -> usize {
        let mut ctx = kernel().sched.lock();
        let value = ctx.sema(self.id).value;
        ctx.unlock();
        value
    }

    /// Number of threads waiting on this semaphore.
    pub fn waiters(&self) -> usize {
        let mut ctx = kernel().sched.lock();
        let waiters = ctx.sema(self.id).waiters.len();
        ctx.unlock();
        waiters
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        let Some(kernel) = try_kernel() else {
            return;
        };
        let mut ctx = kernel.sched.lock();
        let state = ctx.semaphores.remove(&self.id);
        ctx.unlock();
        if let Some(state) = state {
            assert!(
                state.waiters.is_empty(),
                "Semaphore #{} dropped while {} threads wait on it.",
                self.id,
                state.waiters.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::insert_by_priority;
    use std::collections::VecDeque;

    #[test]
    fn insertion_keeps_descending_priority() {
        let mut queue = VecDeque::new();
        for (tid, priority) in [(1, 10), (2, 30), (3, 20), (4, 30), (5, 10)] {
            insert_by_priority(&mut queue, (tid, priority), |&(_, priority)| priority);
        }
        let tids: Vec<u64> = queue.iter().map(|&(tid, _)| tid).collect();
        assert_eq!(tids, [2, 4, 3, 1, 5]);
    }
}
