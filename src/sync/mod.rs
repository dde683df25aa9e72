//! # Synchronization Primitives.
//!
//! An operating system kernel must coordinate access to shared resources among
//! multiple threads of execution. This coordination is vital to ensure data
//! consistency, prevent race conditions, and maintain overall system stability.
//!
//! Every primitive here, except the [`SpinLock`], puts a waiting thread to
//! sleep instead of spinning. They share one discipline: a sleeping waiter
//! is recorded by thread id, and the waker picks the waiter with the highest
//! *current* effective priority, the earliest one among equals.
//!
//! | Primitive             | Blocks Thread? | Wake order                  | Typical Use Case                                   |
//! |-----------------------|----------------|-----------------------------|----------------------------------------------------|
//! | [`SpinLock`]          | No (busy wait) | None                        | Short, uncontended critical sections in the kernel |
//! | [`Semaphore`]         | Yes            | Priority, then FIFO         | Counting resources, signaling events               |
//! | [`Lock`]              | Yes            | Priority, with donation     | Mutual exclusion between threads                   |
//! | [`Mutex`]             | Yes            | Same as [`Lock`]            | Exclusive access to shared data                    |
//! | [`ConditionVariable`] | Yes            | Priority, then FIFO         | Waiting for a condition to become true             |
//!
//! - **Semaphore** is the base primitive. [`Lock`] and [`ConditionVariable`]
//!   are built on it.
//! - **Lock** is a binary semaphore with an owner. A thread blocked on a lock
//!   donates its priority to the owner, and through the owner to the owners
//!   of the locks the owner waits for.
//! - **Mutex** is a [`Lock`] that carries the data it protects.
//! - **ConditionVariable** gives every waiter its own semaphore, so that
//!   [`ConditionVariable::signal`] can choose whom to wake. Signaling
//!   follows Mesa semantics: a woken waiter re-acquires the lock and must
//!   re-check its condition.
//!
//! Misuse of a primitive, such as releasing a lock that the caller does not
//! hold or blocking inside an interrupt handler, is a kernel bug and panics.
//!
//! [`SpinLock`]: crate::sync::SpinLock

pub mod condition_variable;
pub mod lock;
pub mod mutex;
pub mod semaphore;
pub mod spinlock;

pub use condition_variable::*;
pub use lock::Lock;
pub use mutex::*;
pub use semaphore::Semaphore;
pub use spinlock::*;
