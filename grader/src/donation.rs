use grading::spin_for;
use std::sync::Arc;
use tickos::{
    sync::{Lock, SpinLock, WouldBlock},
    thread::{Current, PRI_DEFAULT, ThreadBuilder, info_by_tid},
    timer,
};

type Log = Arc<SpinLock<Vec<&'static str>>>;

fn push(log: &Log, item: &'static str) {
    let mut guard = log.lock();
    guard.push(item);
    guard.unlock();
}

fn take(log: &Log) -> Vec<&'static str> {
    let mut guard = log.lock();
    let items = core::mem::take(&mut *guard);
    guard.unlock();
    items
}

fn new_log() -> Log {
    Arc::new(SpinLock::new(Vec::new()))
}

/// Spawn a thread of `priority` that acquires and releases `lock`.
fn contender(name: &'static str, priority: i32, lock: &Arc<Lock>, log: &Log) -> u64 {
    let (lock, log) = (lock.clone(), log.clone());
    ThreadBuilder::new(name)
        .priority(priority)
        .spawn(move || {
            lock.acquire();
            push(&log, name);
            lock.release();
        })
        .tid
}

/// A waiter donates its priority to the holder of the lock.
pub fn donate_one() {
    let lock = Arc::new(Lock::new());
    let log = new_log();

    lock.acquire();
    contender("acquire1", PRI_DEFAULT + 1, &lock, &log);
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 1);
    contender("acquire2", PRI_DEFAULT + 2, &lock, &log);
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 2);
    assert!(take(&log).is_empty());

    lock.release();
    // Both contenders outrank us and ran to completion.
    assert_eq!(take(&log), ["acquire2", "acquire1"]);
    assert_eq!(Current::get_priority(), PRI_DEFAULT);
}

/// Donations through different locks are returned one lock at a time.
pub fn donate_multiple() {
    let (a, b) = (Arc::new(Lock::new()), Arc::new(Lock::new()));
    let log = new_log();

    a.acquire();
    b.acquire();
    contender("a", PRI_DEFAULT + 1, &a, &log);
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 1);
    contender("b", PRI_DEFAULT + 2, &b, &log);
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 2);

    b.release();
    assert_eq!(take(&log), ["b"]);
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 1);

    a.release();
    assert_eq!(take(&log), ["a"]);
    assert_eq!(Current::get_priority(), PRI_DEFAULT);
}

/// A donation passes through a holder that waits on another lock.
pub fn donate_nest() {
    let (a, b) = (Arc::new(Lock::new()), Arc::new(Lock::new()));
    let log = new_log();

    a.acquire();
    let medium = {
        let (a, b, log) = (a.clone(), b.clone(), log.clone());
        ThreadBuilder::new("medium")
            .priority(PRI_DEFAULT + 1)
            .spawn(move || {
                b.acquire();
                a.acquire();
                push(&log, "medium got a");
                a.release();
                b.release();
                push(&log, "medium done");
            })
    };
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 1);

    let high = {
        let (b, log) = (b.clone(), log.clone());
        ThreadBuilder::new("high")
            .priority(PRI_DEFAULT + 2)
            .spawn(move || {
                b.acquire();
                push(&log, "high got b");
                b.release();
            })
    };
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 2);
    let info = info_by_tid(medium.tid).unwrap();
    assert_eq!(info.priority, PRI_DEFAULT + 2);
    assert_eq!(info.base_priority, PRI_DEFAULT + 1);
    assert!(info.waiting_on_lock);
    assert_eq!(info.held_locks, 1);

    a.release();
    assert_eq!(take(&log), ["medium got a", "high got b", "medium done"]);
    assert_eq!(Current::get_priority(), PRI_DEFAULT);
    assert_eq!(high.join(), 0);
    assert_eq!(medium.join(), 0);
}

/// A donation propagates along a chain of seven holders.
pub fn donate_chain() {
    const DEPTH: usize = 7;

    let locks = (0..DEPTH).map(|_| Arc::new(Lock::new())).collect::<Vec<_>>();
    let log: Arc<SpinLock<Vec<usize>>> = Arc::new(SpinLock::new(Vec::new()));

    locks[0].acquire();
    let handles = (1..DEPTH)
        .map(|i| {
            let (mine, next, log) = (locks[i].clone(), locks[i - 1].clone(), log.clone());
            ThreadBuilder::new(format!("chain{i}"))
                .priority(PRI_DEFAULT + i as i32)
                .spawn(move || {
                    mine.acquire();
                    next.acquire();
                    let mut guard = log.lock();
                    guard.push(i);
                    guard.unlock();
                    next.release();
                    mine.release();
                })
        })
        .collect::<Vec<_>>();

    let top = PRI_DEFAULT + DEPTH as i32 - 1;
    assert_eq!(Current::get_priority(), top);
    for handle in handles.iter() {
        let info = info_by_tid(handle.tid).unwrap();
        assert_eq!(info.priority, top, "{} was not raised", info.name);
    }

    locks[0].release();
    let mut guard = log.lock();
    let order = core::mem::take(&mut *guard);
    guard.unlock();
    assert_eq!(order, (1..DEPTH).collect::<Vec<_>>());
    assert_eq!(Current::get_priority(), PRI_DEFAULT);
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }
}

/// Lowering the base priority keeps the donation in effect.
pub fn donate_lower() {
    let lock = Arc::new(Lock::new());
    let log = new_log();

    lock.acquire();
    contender("acquire", PRI_DEFAULT + 10, &lock, &log);
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 10);

    Current::set_priority(PRI_DEFAULT - 10);
    assert_eq!(Current::get_priority(), PRI_DEFAULT + 10);
    let info = info_by_tid(Current::get_tid()).unwrap();
    assert_eq!(info.base_priority, PRI_DEFAULT - 10);

    lock.release();
    assert_eq!(take(&log), ["acquire"]);
    assert_eq!(Current::get_priority(), PRI_DEFAULT - 10);
}

/// A failed `try_acquire` does not wait, so it donates nothing.
pub fn try_acquire() {
    let lock = Arc::new(Lock::new());
    let log = new_log();

    lock.acquire();
    let handle = {
        let (lock, log) = (lock.clone(), log.clone());
        ThreadBuilder::new("try")
            .priority(PRI_DEFAULT + 1)
            .spawn(move || {
                assert_eq!(lock.try_acquire(), Err(WouldBlock));
                push(&log, "failed");
            })
    };
    assert_eq!(take(&log), ["failed"]);
    assert_eq!(Current::get_priority(), PRI_DEFAULT);
    assert_eq!(handle.join(), 0);
    assert_eq!(lock.holder(), Some(Current::get_tid()));
    lock.release();

    let handle = {
        let lock = lock.clone();
        ThreadBuilder::new("try").spawn(move || {
            assert_eq!(lock.try_acquire(), Ok(()));
            assert!(lock.held_by_current());
            lock.release();
        })
    };
    assert_eq!(handle.join(), 0);
    assert_eq!(lock.holder(), None);
}

/// A release interrupted by the timer never leaves a waiter of high priority
/// behind a thread of middle priority.
pub fn release_under_ticks() {
    let lock = Arc::new(Lock::new());
    let start = timer::ticks();

    let high = {
        let lock = lock.clone();
        ThreadBuilder::new("high")
            .priority(PRI_DEFAULT + 3)
            .spawn(move || {
                for _ in 0..10 {
                    timer::sleep(1);
                    let asked = timer::ticks();
                    lock.acquire();
                    let waited = timer::elapsed(asked);
                    lock.release();
                    assert!(waited <= 2, "waited {waited} ticks for a free lock");
                }
            })
    };
    let medium = ThreadBuilder::new("medium")
        .priority(PRI_DEFAULT + 2)
        .spawn(|| {
            timer::sleep(2);
            spin_for(20);
        });
    let low = {
        let lock = lock.clone();
        ThreadBuilder::new("low")
            .priority(PRI_DEFAULT + 1)
            .spawn(move || {
                while timer::elapsed(start) < 40 {
                    lock.acquire();
                    lock.release();
                }
            })
    };

    assert_eq!(high.join(), 0);
    assert_eq!(medium.join(), 0);
    assert_eq!(low.join(), 0);
    assert_eq!(lock.holder(), None);
}
