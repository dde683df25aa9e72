use grading::assert_exit_code;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tickos::{
    KernelError,
    sync::SpinLock,
    thread::{Current, PRI_DEFAULT, ParkHandle, ThreadBuilder, ThreadState},
};

/// A thread exits with the code given to `Current::exit`.
#[assert_exit_code(3)]
pub fn exit_code() {
    Current::exit(3);
}

/// `join` waits for the thread and returns its exit code.
pub fn join() {
    let handles = (0..8)
        .map(|i| {
            ThreadBuilder::new(format!("exiter{i}")).spawn(move || {
                tickos::timer::sleep(i);
                Current::exit(i as i32);
            })
        })
        .collect::<Vec<_>>();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join(), i as i32);
    }

    // Returning from the thread function exits with 0.
    assert_eq!(ThreadBuilder::new("returner").spawn(|| {}).join(), 0);
}

/// A parked thread sleeps until its handle is unparked.
pub fn park() {
    let slot: Arc<SpinLock<Option<ParkHandle>>> = Arc::new(SpinLock::new(None));
    let woken = Arc::new(AtomicBool::new(false));

    let handle = {
        let (slot, woken) = (slot.clone(), woken.clone());
        ThreadBuilder::new("parkee")
            .priority(PRI_DEFAULT + 1)
            .spawn(move || {
                Current::park_with(|handle| {
                    let mut guard = slot.lock();
                    *guard = Some(handle);
                    guard.unlock();
                });
                woken.store(true, Ordering::SeqCst);
            })
    };

    let parked = loop {
        let mut guard = slot.lock();
        let parked = guard.take();
        guard.unlock();
        match parked {
            Some(parked) => break parked,
            None => Current::yield_now(),
        }
    };
    assert_eq!(parked.tid(), handle.tid);
    assert_eq!(
        tickos::thread::get_state_by_tid(handle.tid),
        Ok(ThreadState::Blocked)
    );
    assert!(!woken.load(Ordering::SeqCst));

    parked.unpark();
    assert_eq!(handle.join(), 0);
    assert!(woken.load(Ordering::SeqCst));
}

/// Thread states and snapshots.
pub fn states() {
    let me = Current::get_tid();
    assert_eq!(
        tickos::thread::get_state_by_tid(me),
        Ok(ThreadState::Running)
    );
    let info = tickos::thread::info_by_tid(me).unwrap();
    assert_eq!(info.name, Current::name());
    assert_eq!(info.held_locks, 0);
    assert!(!info.waiting_on_lock);
    assert_eq!(info.wake_at, None);

    let lower = ThreadBuilder::new("lower")
        .priority(PRI_DEFAULT - 1)
        .spawn(|| {});
    if !tickos::config::booted().unwrap().mlfqs {
        // Created ready, but it does not run while we are ready.
        assert_eq!(
            tickos::thread::get_state_by_tid(lower.tid),
            Ok(ThreadState::Ready)
        );
    }
    let tid = lower.tid;
    assert_eq!(lower.join(), 0);
    // The exit code is published before the thread dies. Sleeping lets it
    // finish, and its control block is reclaimed.
    tickos::timer::sleep(1);
    assert_eq!(
        tickos::thread::get_state_by_tid(tid),
        Err(KernelError::InvalidArgument)
    );
    assert_eq!(
        tickos::thread::info_by_tid(u64::MAX),
        Err(KernelError::InvalidArgument)
    );
}
