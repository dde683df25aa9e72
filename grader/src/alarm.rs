use grading::timeout_ticks;
use std::sync::Arc;
use tickos::{
    sync::SpinLock,
    thread::{Current, PRI_DEFAULT, ThreadBuilder, ThreadState},
    timer,
};

/// Sleep until `wake_at`.
fn sleep_until(wake_at: i64) {
    timer::sleep(wake_at - timer::ticks());
}

pub fn single() {
    let start = timer::ticks();
    timer::sleep(5);
    assert!(timer::elapsed(start) >= 5);
}

/// Five threads sleep 10, 20, .. 50 ticks, three times each. They must wake
/// in the order of their wake-up times.
pub fn multiple() {
    const THREADS: i64 = 5;
    const ITERS: i64 = 3;

    let log = Arc::new(SpinLock::new(Vec::new()));
    let start = timer::ticks() + 10;
    let handles = (0..THREADS)
        .map(|i| {
            let log = log.clone();
            let duration = (i + 1) * 10;
            ThreadBuilder::new(format!("sleeper{i}")).spawn(move || {
                for iter in 1..=ITERS {
                    sleep_until(start + iter * duration);
                    let mut guard = log.lock();
                    guard.push((iter * duration, i));
                    guard.unlock();
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }

    let guard = log.lock();
    let log = guard.clone();
    guard.unlock();
    assert_eq!(log.len(), (THREADS * ITERS) as usize);
    for pair in log.windows(2) {
        assert!(
            pair[0].0 <= pair[1].0,
            "Woke up out of order: {:?} before {:?}",
            pair[0],
            pair[1]
        );
    }
}

/// Threads sleeping until the same tick wake up on that tick.
pub fn simultaneous() {
    let log = Arc::new(SpinLock::new(Vec::new()));
    let wake_at = timer::ticks() + 10;
    let handles = (0..3)
        .map(|_| {
            let log = log.clone();
            ThreadBuilder::new("simultaneous").spawn(move || {
                sleep_until(wake_at);
                let now = timer::ticks();
                let mut guard = log.lock();
                guard.push(now);
                guard.unlock();
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }

    let guard = log.lock();
    let log = guard.clone();
    guard.unlock();
    assert_eq!(log.len(), 3);
    for now in log.iter() {
        assert!(*now >= wake_at);
        assert!(*now - log[0] <= 1, "Woke up apart: {log:?}");
    }
}

/// Threads woken on the same tick run in the order of their priorities.
#[grading::priority(0)]
pub fn priority() {
    let log = Arc::new(SpinLock::new(Vec::new()));
    let wake_at = timer::ticks() + 10;
    let handles = (0..10)
        .map(|i| {
            let log = log.clone();
            let priority = PRI_DEFAULT - (i + 5) % 10 - 1;
            ThreadBuilder::new(format!("priority {priority}"))
                .priority(priority)
                .spawn(move || {
                    sleep_until(wake_at);
                    let mut guard = log.lock();
                    guard.push(priority);
                    guard.unlock();
                })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }

    let guard = log.lock();
    let log = guard.clone();
    guard.unlock();
    let expected = (PRI_DEFAULT - 10..PRI_DEFAULT).rev().collect::<Vec<_>>();
    assert_eq!(log, expected);
}

#[timeout_ticks(1)]
pub fn zero() {
    timer::sleep(0);
    timer::msleep(0);
}

#[timeout_ticks(1)]
pub fn negative() {
    timer::sleep(-100);
    timer::usleep(-1);
}

/// Sleeps shorter than a tick busy-wait instead of blocking.
pub fn sub_tick() {
    let start = timer::ticks();
    timer::usleep(100);
    timer::nsleep(10_000);
    assert!(timer::elapsed(start) <= 1);
    assert!(timer::loops_per_tick() > 0);

    let freq = timer::frequency() as i64;
    let start = timer::ticks();
    timer::msleep(50);
    assert!(timer::elapsed(start) >= 50 * freq / 1000);
}

/// A sleeping thread is blocked on the sleep queue.
pub fn sleeping_state() {
    let sleeper = ThreadBuilder::new("sleeper")
        .priority(PRI_DEFAULT + 1)
        .spawn(|| timer::sleep(20));

    // The sleeper outranks us, so it sleeps by now.
    let info = tickos::thread::info_by_tid(sleeper.tid).unwrap();
    assert_eq!(info.state, ThreadState::Blocked);
    assert!(info.wake_at.is_some_and(|at| at > timer::ticks()));
    assert_eq!(timer::sleepers(), 1);

    assert_eq!(sleeper.join(), 0);
    assert_eq!(timer::sleepers(), 0);
    assert_eq!(Current::get_priority(), PRI_DEFAULT);
}

/// Sleeps that never end do not overflow or stop the machine.
pub fn far_future() {
    let sleepers = timer::sleepers();
    let handles = [
        ThreadBuilder::new("msleep")
            .priority(PRI_DEFAULT + 1)
            .spawn(|| timer::msleep(i64::MAX / 10)),
        ThreadBuilder::new("usleep")
            .priority(PRI_DEFAULT + 1)
            .spawn(|| timer::usleep(i64::MAX)),
        ThreadBuilder::new("sleep")
            .priority(PRI_DEFAULT + 1)
            .spawn(|| timer::sleep(i64::MAX)),
    ];
    let until = |tid| tickos::thread::info_by_tid(tid).unwrap().wake_at;
    let [msleep, usleep, sleep] = handles.map(|handle| handle.tid);
    let state = |tid| tickos::thread::get_state_by_tid(tid);
    while [msleep, usleep, sleep]
        .iter()
        .any(|&tid| state(tid) != Ok(ThreadState::Blocked))
    {
        timer::sleep(1);
    }
    assert!(until(msleep).is_some_and(|at| at > timer::ticks() + i64::MAX / 1000));
    assert!(until(usleep).is_some());
    assert_eq!(until(sleep), Some(i64::MAX));
    assert_eq!(timer::sleepers(), sleepers + 3);

    // The machine keeps ticking.
    let start = timer::ticks();
    timer::sleep(2);
    assert!(timer::elapsed(start) >= 2);
}
