use grading::spin_for;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tickos::{
    thread::{Current, NICE_MAX, NICE_MIN, PRI_MAX, PRI_MIN, ThreadBuilder, get_load_avg, info_by_tid},
    timer,
};

/// The priority is computed by the scheduler; setting it is ignored.
pub fn set_priority_ignored() {
    Current::set_priority(PRI_MIN);
    let info = info_by_tid(Current::get_tid()).unwrap();
    assert_eq!(info.priority, info.base_priority);
    assert_ne!(info.priority, PRI_MIN);
}

pub fn nice() {
    Current::set_nice(5);
    assert_eq!(Current::get_nice(), 5);
    Current::set_nice(NICE_MAX + 100);
    assert_eq!(Current::get_nice(), NICE_MAX);
    // Each nice point costs two priority levels.
    assert!(Current::get_priority() <= PRI_MAX - 2 * NICE_MAX);
    Current::set_nice(NICE_MIN - 100);
    assert_eq!(Current::get_nice(), NICE_MIN);
    Current::set_nice(0);
}

/// A thread starts with the niceness of its creator.
pub fn inherit_nice() {
    Current::set_nice(7);
    let child = ThreadBuilder::new("child").spawn(|| {
        assert_eq!(Current::get_nice(), 7);
    });
    assert_eq!(child.join(), 0);
    Current::set_nice(0);
}

/// A spinning thread accumulates recent cpu.
pub fn recent_cpu() {
    let freq = timer::frequency() as i64;
    // Spin past a second boundary into the middle of the next second, so
    // the decay on the boundary is followed by half a second of running.
    let second = timer::ticks() / freq;
    loop {
        spin_for(1);
        let now = timer::ticks();
        if now / freq > second && now % freq >= freq / 2 {
            break;
        }
    }
    assert!(Current::get_recent_cpu() > 0);
    let info = info_by_tid(Current::get_tid()).unwrap();
    assert!(info.recent_cpu > 0);
}

/// The load average rises while a thread is running.
pub fn load_avg() {
    spin_for(timer::frequency() as i64 + 1);
    assert!(get_load_avg() > 0);
}

/// A nicer thread gets less cpu time.
pub fn fair() {
    let deadline = timer::ticks() + 3 * timer::frequency() as i64;
    let counters = [0, 10].map(|nice| {
        let counter = Arc::new(AtomicU64::new(0));
        let handle = {
            let counter = counter.clone();
            ThreadBuilder::new(format!("nice {nice}")).spawn(move || {
                Current::set_nice(nice);
                while timer::ticks() < deadline {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        (counter, handle)
    });

    let [(nice0, h0), (nice10, h10)] = counters;
    assert_eq!(h0.join(), 0);
    assert_eq!(h10.join(), 0);
    let (nice0, nice10) = (nice0.load(Ordering::SeqCst), nice10.load(Ordering::SeqCst));
    assert!(
        nice0 > nice10,
        "nice 0 counted {nice0} times, nice 10 counted {nice10} times"
    );
}
