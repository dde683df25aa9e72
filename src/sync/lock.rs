//! # Lock with priority donation.
//!
//! A [`Lock`] is a binary semaphore with an owner: only the thread that
//! acquired it may release it, and a thread may not acquire a lock it
//! already holds.
//!
//! ## Priority donation
//!
//! Consider a high priority thread H waiting for a lock held by a low
//! priority thread L. While a medium priority thread M is ready, L never
//! runs, so H waits for M even though H outranks M. This is *priority
//! inversion*.
//!
//! To prevent it, a thread that blocks on a lock *donates* its priority to
//! the holder. Donation is transitive: if the holder itself waits on another
//! lock, the priority flows on to that lock's holder, and so on.
//!
//! ```text
//!   H (63) --waits--> lock A --held by--> M (31) --waits--> lock B --held by--> L (10)
//!                                          ^ raised to 63                        ^ raised to 63
//! ```
//!
//! The chain is walked iteratively. The walk stops at a holder whose
//! priority is already high enough, at a holder that does not wait, or
//! after [`MAX_DONATION_DEPTH`] holders. Meeting a thread twice means the
//! threads wait on each other, which is a deadlock and panics.
//!
//! When a thread releases a lock, it gives back what was donated through
//! that lock. Its priority becomes the highest priority among the waiters of
//! the locks it still holds, and never less than its base priority.
//!
//! Donation is disabled when the MLFQS scheduler is active; it computes
//! priorities by itself.
use super::semaphore::Semaphore;
use crate::{
    kernel::{kernel, try_kernel},
    sync::WouldBlock,
    thread::scheduler::Context,
};
use abyss::interrupt::InterruptGuard;
use arrayvec::ArrayVec;
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of holders a donation propagates through.
pub const MAX_DONATION_DEPTH: usize = 16;

/// State of a lock, owned by the scheduler context.
#[derive(Debug)]
pub(crate) struct LockState {
    pub(crate) holder: Option<u64>,
    /// Id of the backing semaphore.
    pub(crate) sema: u64,
}

impl Context {
    fn lock_state(&mut self, id: u64) -> &mut LockState {
        self.locks
            .get_mut(&id)
            .unwrap_or_else(|| panic!("Lock #{id} is not registered."))
    }

    /// Donate the priority of the running thread along the chain of holders
    /// starting at the lock `id`.
    fn donate_priority(&mut self, id: u64) {
        let donor = self.current;
        let mut level = self.current().priority;
        let mut lock = id;
        let mut visited = ArrayVec::<u64, MAX_DONATION_DEPTH>::new();

        while let Some(holder) = self.locks.get(&lock).and_then(|state| state.holder) {
            if holder == donor || visited.contains(&holder) {
                panic!("Deadlock: thread #{holder} waits on itself through lock #{lock}.");
            }
            if visited.try_push(holder).is_err() {
                break;
            }
            let th = self.thread_mut(holder);
            if th.priority >= level {
                break;
            }
            th.priority = level;
            let Some(next) = th.waiting_on_lock else {
                break;
            };
            lock = next;
            let sema = self.lock_state(lock).sema;
            level = self.max_waiter_priority(sema).map_or(level, |p| p.max(level));
        }
    }

    /// The highest priority donated to `tid` through the locks it holds.
    pub(crate) fn donated_priority(&self, tid: u64) -> Option<i32> {
        self.thread(tid)
            .held_locks
            .iter()
            .filter_map(|id| self.locks.get(id))
            .filter_map(|state| self.max_waiter_priority(state.sema))
            .max()
    }

    /// Recompute the priority of `tid` after it released a lock.
    fn refresh_priority(&mut self, tid: u64) {
        let donated = self.donated_priority(tid);
        let th = self.thread_mut(tid);
        th.priority = match donated {
            Some(donated) if th.priority != th.base_priority => donated.max(th.base_priority),
            _ => th.base_priority,
        };
    }

    fn take_lock(&mut self, id: u64) {
        let current = self.current;
        self.lock_state(id).holder = Some(current);
        let th = self.current_mut();
        th.waiting_on_lock = None;
        th.held_locks.push(id);
    }
}

/// A lock.
///
/// Unlike the [`Mutex`], the lock does not carry data; it only provides the
/// mutual exclusion.
///
/// [`Mutex`]: crate::sync::Mutex
#[derive(Debug)]
pub struct Lock {
    id: u64,
    sema: Semaphore,
}

impl Lock {
    /// Create a new, unheld lock.
    pub fn new() -> Self {
        static ID: AtomicU64 = AtomicU64::new(1);
        let id = ID.fetch_add(1, Ordering::SeqCst);
        let sema = Semaphore::new(1);
        let mut ctx = kernel().sched.lock();
        ctx.locks.insert(
            id,
            LockState {
                holder: None,
                sema: sema.id(),
            },
        );
        ctx.unlock();
        Self { id, sema }
    }

    /// Acquire the lock, sleeping until it becomes available if necessary.
    ///
    /// While it sleeps, the caller donates its priority to the holder.
    ///
    /// Panics if the caller already holds the lock or if called from an
    /// interrupt handler.
    pub fn acquire(&self) {
        assert!(
            !abyss::interrupt::in_handler(),
            "Lock::acquire() in an interrupt handler."
        );
        let _cli = InterruptGuard::new();
        let mut ctx = kernel().sched.lock();
        let me = ctx.current;
        if ctx.lock_state(self.id).holder == Some(me) {
            panic!("Thread #{me} acquires lock #{}, which it already holds.", self.id);
        }
        ctx.current_mut().waiting_on_lock = Some(self.id);
        if !ctx.mlfqs {
            ctx.donate_priority(self.id);
        }
        ctx.unlock();

        self.sema.down();

        let mut ctx = kernel().sched.lock();
        ctx.take_lock(self.id);
        ctx.unlock();
    }

    /// Try to acquire the lock without sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`WouldBlock`] if another thread holds the lock.
    pub fn try_acquire(&self) -> Result<(), WouldBlock> {
        let mut ctx = kernel().sched.lock();
        let me = ctx.current;
        if ctx.lock_state(self.id).holder == Some(me) {
            panic!("Thread #{me} acquires lock #{}, which it already holds.", self.id);
        }
        let taken = ctx.sema_try_down(self.sema.id());
        if taken {
            ctx.take_lock(self.id);
        }
        ctx.unlock();
        if taken { Ok(()) } else { Err(WouldBlock) }
    }

    /// Release the lock, which the caller must hold.
    ///
    /// The caller gives back the priority donated through this lock, and
    /// yields if the thread that gets the lock outranks it.
    pub fn release(&self) {
        // No tick may land between clearing the holder and the `up`.
        let _cli = InterruptGuard::new();
        let mut ctx = kernel().sched.lock();
        let me = ctx.current;
        let state = ctx.lock_state(self.id);
        if state.holder != Some(me) {
            panic!(
                "Thread #{me} releases lock #{}, which is held by {:?}.",
                self.id, state.holder
            );
        }
        state.holder = None;
        ctx.current_mut().held_locks.retain(|&id| id != self.id);
        if !ctx.mlfqs {
            ctx.refresh_priority(me);
        }
        ctx.unlock();

        self.sema.up();
    }

    /// Returns true if the running thread holds the lock.
    pub fn held_by_current(&self) -> bool {
        let mut ctx = kernel().sched.lock();
        let me = ctx.current;
        let held = ctx.lock_state(self.id).holder == Some(me);
        ctx.unlock();
        held
    }

    /// The thread that holds the lock.
    pub fn holder(&self) -> Option<u64> {
        let mut ctx = kernel().sched.lock();
        let holder = ctx.lock_state(self.id).holder;
        ctx.unlock();
        holder
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let Some(kernel) = try_kernel() else {
            return;
        };
        let mut ctx = kernel.sched.lock();
        if let Some(LockState {
            holder: Some(holder),
            ..
        }) = ctx.locks.remove(&self.id)
            && let Some(th) = ctx.threads.get_mut(&holder)
        {
            th.held_locks.retain(|&id| id != self.id);
        }
        ctx.unlock();
    }
}
