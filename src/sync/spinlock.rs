//! Uniprocessor spinlock.
//!
//! The implementing unicore spinlock is simple; it just requires preventing
//! thread preemption while holding a lock. By disabling interrupts on the
//! lock-holding thread, other threads cannot access shared resource as they
//! can't be scheduled.
//!
//! The machine runs the cpu on host threads, so the lock word is still
//! updated with an atomic read-modify-write; a thread that finds it set
//! backs off and polls for interrupts.
//!
//! Holding a spinlock means interrupts are disabled. Never block, sleep or
//! yield while holding one.

pub use abyss::spinlock::WouldBlock;

/// A mutual exclusion primitive useful for protecting shared data
///
/// This spinlock will block threads waiting for the lock to become available.
/// The spinlock can be created via a [`new`] constructor. Each spinlock has a
/// type parameter which represents the data that it is protecting. The data can
/// only be accessed through the guards returned from [`lock`] and
/// [`try_lock`], which guarantees that the data is only ever accessed when the
/// spinlock is locked.
///
/// [`new`]: Self::new
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tickos::sync::SpinLock;
/// use tickos::thread;
///
/// const N: usize = 10;
///
/// // Spawn a few threads to increment a shared variable (non-atomically).
/// //
/// // Here we're using an Arc to share memory among threads, and the data inside
/// // the Arc is protected with a spinlock.
/// let data = Arc::new(SpinLock::new(0));
///
/// for _ in 0..N {
///     let data = Arc::clone(&data);
///     thread::ThreadBuilder::new("work").spawn(move || {
///         // The shared state can only be accessed once the lock is held.
///         let mut data = data.lock();
///         *data += 1;
///         // the lock must be "explicitly" unlocked.
///         data.unlock();
///     });
/// }
/// ```
pub use abyss::spinlock::SpinLock;
pub use abyss::spinlock::SpinLockGuard;
