pub mod mutex {
    use std::sync::Arc;
    use tickos::{
        sync::Mutex,
        thread::{Current, ThreadBuilder},
    };

    /// Threads increment a shared counter under the mutex.
    pub fn smoke() {
        const THREADS: usize = 4;
        const ITERS: usize = 100;

        let counter = Arc::new(Mutex::new(0));
        let handles = (0..THREADS)
            .map(|i| {
                let counter = counter.clone();
                ThreadBuilder::new(format!("adder{i}")).spawn(move || {
                    for _ in 0..ITERS {
                        let mut guard = counter.lock();
                        let v = *guard;
                        // Let the others run while the mutex is held.
                        Current::yield_now();
                        *guard = v + 1;
                        guard.unlock();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }

        let guard = counter.lock();
        assert_eq!(*guard, THREADS * ITERS);
        guard.unlock();
    }

    pub fn try_lock() {
        let mutex = Arc::new(Mutex::new(0));
        let guard = mutex.lock();
        assert!(mutex.raw().held_by_current());

        let handle = {
            let mutex = mutex.clone();
            ThreadBuilder::new("try_lock").spawn(move || {
                assert!(mutex.try_lock().is_err());
                assert!(!mutex.raw().held_by_current());
            })
        };
        assert_eq!(handle.join(), 0);
        guard.unlock();
        assert_eq!(mutex.raw().holder(), None);

        let handle = {
            let mutex = mutex.clone();
            ThreadBuilder::new("try_lock").spawn(move || match mutex.try_lock() {
                Ok(mut guard) => {
                    *guard += 1;
                    guard.unlock();
                }
                Err(_) => panic!("The mutex is not held."),
            })
        };
        assert_eq!(handle.join(), 0);

        let guard = mutex.lock();
        assert_eq!(*guard, 1);
        guard.unlock();
    }
}

pub mod condition_variable {
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
    };
    use tickos::{
        sync::{ConditionVariable, Lock, Mutex},
        thread::{ThreadBuilder, ThreadState},
        timer,
    };

    /// A waiter releases the lock while it waits.
    pub fn wait_releases_lock() {
        let lock = Arc::new(Lock::new());
        let condvar = Arc::new(ConditionVariable::new());
        let ready = Arc::new(AtomicBool::new(false));

        let handle = {
            let (lock, condvar, ready) = (lock.clone(), condvar.clone(), ready.clone());
            ThreadBuilder::new("waiter").spawn(move || {
                lock.acquire();
                while !ready.load(Ordering::SeqCst) {
                    condvar.wait(&lock);
                }
                assert!(lock.held_by_current());
                lock.release();
            })
        };

        while condvar.is_empty()
            || tickos::thread::get_state_by_tid(handle.tid) != Ok(ThreadState::Blocked)
        {
            timer::sleep(1);
        }
        // The waiter holds nothing while it waits.
        assert_eq!(lock.holder(), None);
        lock.acquire();
        ready.store(true, Ordering::SeqCst);
        condvar.signal(&lock);
        assert_eq!(condvar.len(), 0);
        lock.release();
        assert_eq!(handle.join(), 0);
    }

    /// A producer and a consumer share a bounded buffer.
    pub fn bounded_buffer() {
        const CAPACITY: usize = 2;
        const ITEMS: usize = 20;

        let buffer = Arc::new(Mutex::new(VecDeque::new()));
        let not_full = Arc::new(ConditionVariable::new());
        let not_empty = Arc::new(ConditionVariable::new());

        let producer = {
            let (buffer, not_full, not_empty) =
                (buffer.clone(), not_full.clone(), not_empty.clone());
            ThreadBuilder::new("producer").spawn(move || {
                for item in 0..ITEMS {
                    let mut guard =
                        not_full.wait_while(&buffer, |buffer| buffer.len() == CAPACITY);
                    guard.push_back(item);
                    not_empty.signal_guard(guard);
                }
            })
        };
        let consumer = {
            let (buffer, not_full, not_empty) =
                (buffer.clone(), not_full.clone(), not_empty.clone());
            ThreadBuilder::new("consumer").spawn(move || {
                let mut received = Vec::new();
                while received.len() < ITEMS {
                    let mut guard = not_empty.wait_while(&buffer, |buffer| buffer.is_empty());
                    assert!(guard.len() <= CAPACITY);
                    if let Some(item) = guard.pop_front() {
                        received.push(item);
                    }
                    not_full.signal_guard(guard);
                }
                assert_eq!(received, (0..ITEMS).collect::<Vec<_>>());
            })
        };
        assert_eq!(producer.join(), 0);
        assert_eq!(consumer.join(), 0);
    }

    /// A broadcast wakes every waiter.
    pub fn broadcast() {
        const WAITERS: usize = 4;

        let go = Arc::new(Mutex::new(false));
        let condvar = Arc::new(ConditionVariable::new());
        let woken = Arc::new(AtomicUsize::new(0));
        let handles = (0..WAITERS)
            .map(|i| {
                let (go, condvar, woken) = (go.clone(), condvar.clone(), woken.clone());
                ThreadBuilder::new(format!("waiter{i}")).spawn(move || {
                    let guard = condvar.wait_while(&go, |go| !*go);
                    woken.fetch_add(1, Ordering::SeqCst);
                    guard.unlock();
                })
            })
            .collect::<Vec<_>>();

        while condvar.len() < WAITERS {
            timer::sleep(1);
        }
        assert_eq!(woken.load(Ordering::SeqCst), 0);
        let mut guard = go.lock();
        *guard = true;
        condvar.broadcast_guard(guard);
        assert!(condvar.is_empty());
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
        assert_eq!(woken.load(Ordering::SeqCst), WAITERS);
    }
}
