//! Misuses of the primitives that bring the machine down.
//!
//! Each case ends in a kernel panic, so none of them runs unless the command
//! line names it.
use tickos::{
    sync::{ConditionVariable, Lock, Semaphore},
    thread::{PRI_DEFAULT, ThreadBuilder, ThreadState},
    timer,
};

pub fn recursive_acquire() {
    let lock = Lock::new();
    lock.acquire();
    lock.acquire();
    unreachable!("a lock was acquired twice by its holder");
}

pub fn release_unowned() {
    let lock = Lock::new();
    lock.release();
    unreachable!("a lock was released by a thread that does not hold it");
}

pub fn release_by_other() {
    let lock = std::sync::Arc::new(Lock::new());
    let holder = {
        let lock = lock.clone();
        ThreadBuilder::new("holder").spawn(move || lock.acquire())
    };
    assert_eq!(holder.join(), 0);
    lock.release();
    unreachable!("a lock was released by a thread that does not hold it");
}

pub fn wait_without_lock() {
    let lock = Lock::new();
    let cond = ConditionVariable::new();
    cond.wait(&lock);
    unreachable!("a condition variable was waited on without its lock");
}

pub fn drop_waited_semaphore() {
    // The waiter borrows the semaphore while it sleeps, which safe code
    // cannot outlive.
    let sema = Box::into_raw(Box::new(Semaphore::new(0)));
    let addr = sema as usize;
    let waiter = ThreadBuilder::new("waiter")
        .priority(PRI_DEFAULT + 1)
        .spawn(move || unsafe { &*(addr as *const Semaphore) }.down());
    while tickos::thread::get_state_by_tid(waiter.tid) != Ok(ThreadState::Blocked) {
        timer::sleep(1);
    }
    assert_eq!(unsafe { &*sema }.waiters(), 1);
    drop(unsafe { Box::from_raw(sema) });
    unreachable!("a semaphore was dropped under its waiter");
}
