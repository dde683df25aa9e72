use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tickos::{
    sync::{Semaphore, WouldBlock},
    thread::{PRI_DEFAULT, ThreadBuilder},
    timer,
};

pub fn sema_0() {
    let sema = Semaphore::new(0);
    assert_eq!(sema.value(), 0);
    sema.up();
    assert_eq!(sema.value(), 1);
    sema.down();
    assert_eq!(sema.value(), 0);
    assert_eq!(sema.waiters(), 0);
}

/// Two threads ping-pong through a pair of semaphores.
pub fn sema_1() {
    let ping = Arc::new(Semaphore::new(0));
    let pong = Arc::new(Semaphore::new(0));
    let count = Arc::new(AtomicUsize::new(0));

    let handle = {
        let (ping, pong, count) = (ping.clone(), pong.clone(), count.clone());
        ThreadBuilder::new("pong").spawn(move || {
            for _ in 0..10 {
                ping.down();
                count.fetch_add(1, Ordering::SeqCst);
                pong.up();
            }
        })
    };
    for i in 0..10 {
        ping.up();
        pong.down();
        assert_eq!(count.load(Ordering::SeqCst), i + 1);
    }
    assert_eq!(handle.join(), 0);
}

pub fn try_down() {
    let sema = Semaphore::new(1);
    assert_eq!(sema.try_down(), Ok(()));
    assert_eq!(sema.try_down(), Err(WouldBlock));
    sema.up();
    assert_eq!(sema.try_down(), Ok(()));
    assert_eq!(sema.value(), 0);
}

/// At most N threads are in the section guarded by a semaphore of N.
pub fn n_permits() {
    const PERMITS: usize = 3;
    let sema = Arc::new(Semaphore::new(PERMITS));
    let inside = Arc::new(AtomicUsize::new(0));
    let max = Arc::new(AtomicUsize::new(0));

    let handles = (0..PERMITS * 2)
        .map(|i| {
            let (sema, inside, max) = (sema.clone(), inside.clone(), max.clone());
            ThreadBuilder::new(format!("permit{i}")).spawn(move || {
                sema.down();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                timer::sleep(2);
                inside.fetch_sub(1, Ordering::SeqCst);
                sema.up();
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }
    assert_eq!(max.load(Ordering::SeqCst), PERMITS);
    assert_eq!(sema.value(), PERMITS);
}

/// Each `up` wakes one waiter.
pub fn counting() {
    let sema = Arc::new(Semaphore::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let handles = (0..3)
        .map(|i| {
            let (sema, done) = (sema.clone(), done.clone());
            ThreadBuilder::new(format!("waiter{i}"))
                .priority(PRI_DEFAULT + 1)
                .spawn(move || {
                    sema.down();
                    done.fetch_add(1, Ordering::SeqCst);
                })
        })
        .collect::<Vec<_>>();

    // The waiters outrank us: they are all blocked by now.
    assert_eq!(sema.waiters(), 3);
    for i in 0..3 {
        sema.up();
        // The woken waiter ran before `up` returned.
        assert_eq!(done.load(Ordering::SeqCst), i + 1);
        assert_eq!(sema.waiters(), 2 - i);
    }
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }
    assert_eq!(sema.value(), 0);
}
