use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tickos::{
    sync::{ConditionVariable, Lock, Semaphore, SpinLock},
    thread::{Current, PRI_DEFAULT, PRI_MIN, ThreadBuilder},
};

type Log<T> = Arc<SpinLock<Vec<T>>>;

fn push<T>(log: &Log<T>, item: T) {
    let mut guard = log.lock();
    guard.push(item);
    guard.unlock();
}

fn take<T>(log: &Log<T>) -> Vec<T> {
    let mut guard = log.lock();
    let items = core::mem::take(&mut *guard);
    guard.unlock();
    items
}

/// A thread of a higher priority runs as soon as it is created.
pub fn preempt() {
    let ran = Arc::new(AtomicBool::new(false));
    let handle = {
        let ran = ran.clone();
        ThreadBuilder::new("high")
            .priority(PRI_DEFAULT + 1)
            .spawn(move || ran.store(true, Ordering::SeqCst))
    };
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(handle.join(), 0);
}

/// Lowering the priority below a ready thread yields to it.
pub fn change() {
    let log: Log<&'static str> = Arc::new(SpinLock::new(Vec::new()));
    let handle = {
        let log = log.clone();
        ThreadBuilder::new("thread 2")
            .priority(PRI_DEFAULT + 1)
            .spawn(move || {
                push(&log, "thread 2 running");
                Current::set_priority(PRI_DEFAULT - 1);
                push(&log, "thread 2 exiting");
            })
    };
    push(&log, "main running");
    Current::set_priority(PRI_DEFAULT - 2);
    push(&log, "main exiting");
    assert_eq!(handle.join(), 0);
    assert_eq!(
        take(&log),
        [
            "thread 2 running",
            "main running",
            "thread 2 exiting",
            "main exiting"
        ]
    );
    assert_eq!(Current::get_priority(), PRI_DEFAULT - 2);
}

/// Threads of the same priority take turns in FIFO order.
pub fn fifo() {
    const THREADS: usize = 8;
    const ITERS: usize = 5;

    let log: Log<usize> = Arc::new(SpinLock::new(Vec::new()));
    Current::set_priority(PRI_DEFAULT + 2);
    let handles = (0..THREADS)
        .map(|i| {
            let log = log.clone();
            ThreadBuilder::new(format!("fifo{i}"))
                .priority(PRI_DEFAULT + 1)
                .spawn(move || {
                    for _ in 0..ITERS {
                        push(&log, i);
                        Current::yield_now();
                    }
                })
        })
        .collect::<Vec<_>>();
    // Let them run.
    Current::set_priority(PRI_DEFAULT);
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }

    let log = take(&log);
    assert_eq!(log.len(), THREADS * ITERS);
    // The first round follows the creation order.
    assert_eq!(log[..THREADS], (0..THREADS).collect::<Vec<_>>());
    let mut counts = [0usize; THREADS];
    for i in log {
        counts[i] += 1;
        let (min, max) = (counts.iter().min(), counts.iter().max());
        assert!(
            max.zip(min).is_some_and(|(max, min)| max - min <= 2),
            "Unfair turns: {counts:?}"
        );
    }
    assert!(counts.iter().all(|c| *c == ITERS));
}

/// The highest priority waiter of a semaphore wakes first.
#[grading::priority(0)]
pub fn sema() {
    let sema = Arc::new(Semaphore::new(0));
    let log: Log<i32> = Arc::new(SpinLock::new(Vec::new()));
    let handles = (0..10)
        .map(|i| {
            let (sema, log) = (sema.clone(), log.clone());
            let priority = PRI_DEFAULT - (i + 3) % 10 - 1;
            ThreadBuilder::new(format!("priority {priority}"))
                .priority(priority)
                .spawn(move || {
                    sema.down();
                    push(&log, priority);
                })
        })
        .collect::<Vec<_>>();
    assert_eq!(sema.waiters(), 10);
    for _ in 0..10 {
        sema.up();
    }
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }
    assert_eq!(
        take(&log),
        (PRI_DEFAULT - 10..PRI_DEFAULT).rev().collect::<Vec<_>>()
    );
    assert_eq!(Current::get_priority(), PRI_MIN);
}

/// The highest priority waiter of a condition variable wakes first.
#[grading::priority(0)]
pub fn condvar() {
    let lock = Arc::new(Lock::new());
    let condvar = Arc::new(ConditionVariable::new());
    let log: Log<i32> = Arc::new(SpinLock::new(Vec::new()));
    let handles = (0..10)
        .map(|i| {
            let (lock, condvar, log) = (lock.clone(), condvar.clone(), log.clone());
            let priority = PRI_DEFAULT - (i + 7) % 10 - 1;
            ThreadBuilder::new(format!("priority {priority}"))
                .priority(priority)
                .spawn(move || {
                    lock.acquire();
                    condvar.wait(&lock);
                    push(&log, priority);
                    lock.release();
                })
        })
        .collect::<Vec<_>>();
    assert_eq!(condvar.len(), 10);
    for _ in 0..10 {
        lock.acquire();
        condvar.signal(&lock);
        lock.release();
    }
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }
    assert_eq!(
        take(&log),
        (PRI_DEFAULT - 10..PRI_DEFAULT).rev().collect::<Vec<_>>()
    );
    assert_eq!(Current::get_priority(), PRI_MIN);
}
