//! Timer and sleep.
//!
//! The 8254 programmable interval timer interrupts the cpu
//! [`frequency`] times per second. Each interrupt is a *tick*: the tick
//! counter advances by one, sleeping threads whose wake-up tick has come are
//! woken, and the scheduler accounts the tick to the running thread.
//!
//! A thread sleeps for whole ticks with [`sleep`]. Requests shorter than a
//! tick cannot be served by the scheduler; [`msleep`], [`usleep`] and
//! [`nsleep`] spin for them instead, using the number of loop iterations per
//! tick measured by [`calibrate`] at boot.
use crate::{
    KernelError,
    kernel::kernel,
    sync::SpinLock,
    thread::scheduler,
};
use abyss::{
    dev::pic::Vector,
    interrupt::{InterruptGuard, InterruptState},
};
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
};

/// Lowest supported timer frequency. Below it the 16-bit divisor of the
/// 8254 overflows.
pub const MIN_TIMER_FREQ: u32 = 19;
/// Highest supported timer frequency.
pub const MAX_TIMER_FREQ: u32 = 1000;
/// Timer frequency used unless configured otherwise.
pub const DEFAULT_TIMER_FREQ: u32 = 100;

/// Threads sleeping until a tick, soonest first.
///
/// Threads that wake on the same tick keep the order they went to sleep in.
#[derive(Default, Debug)]
pub(crate) struct SleepQueue {
    sleepers: VecDeque<(i64, u64)>,
}

impl SleepQueue {
    pub(crate) const fn new() -> Self {
        Self {
            sleepers: VecDeque::new(),
        }
    }

    /// Insert `tid`, waking at `wake_at`.
    pub(crate) fn insert(&mut self, wake_at: i64, tid: u64) {
        let idx = self.sleepers.partition_point(|&(at, _)| at <= wake_at);
        self.sleepers.insert(idx, (wake_at, tid));
    }

    /// Pop the next sleeper if it wakes at or before `now`.
    pub(crate) fn pop_due(&mut self, now: i64) -> Option<u64> {
        match self.sleepers.front() {
            Some(&(wake_at, _)) if wake_at <= now => self.sleepers.pop_front().map(|(_, tid)| tid),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sleepers.len()
    }
}

/// The tick source.
pub(crate) struct Timer {
    ticks: AtomicI64,
    freq: u32,
    loops_per_tick: AtomicU64,
    sleepers: SpinLock<SleepQueue>,
}

impl Timer {
    pub(crate) const fn new(freq: u32) -> Self {
        Self {
            ticks: AtomicI64::new(0),
            freq,
            loops_per_tick: AtomicU64::new(0),
            sleepers: SpinLock::new(SleepQueue::new()),
        }
    }
}

/// Program the PIT and install the timer interrupt handler.
pub(crate) fn init() -> Result<(), KernelError> {
    let freq = kernel().timer.freq;
    if !(MIN_TIMER_FREQ..=MAX_TIMER_FREQ).contains(&freq) {
        return Err(KernelError::InvalidArgument);
    }
    crate::interrupt::register(Vector::Timer.into(), timer_interrupt);
    let divisor = abyss::dev::pit::program(freq)?;
    info!("Timer: {freq} Hz (divisor {divisor}).");
    Ok(())
}

fn timer_interrupt() {
    let kernel = kernel();
    let now = kernel.timer.ticks.fetch_add(1, Ordering::SeqCst) + 1;

    let mut ctx = kernel.sched.lock();
    let mut sleepers = kernel.timer.sleepers.lock();
    while let Some(tid) = sleepers.pop_due(now) {
        ctx.thread_mut(tid).wake_at = None;
        ctx.unblock(tid);
    }
    sleepers.unlock();
    let preempt = ctx.tick(now, kernel.timer.freq);
    ctx.unlock();

    if preempt {
        abyss::interrupt::yield_on_return();
    }
}

/// Measure the number of busy-wait iterations in one tick.
///
/// Interrupts must be enabled.
pub(crate) fn calibrate() {
    assert_eq!(
        InterruptState::current(),
        InterruptState::On,
        "Calibrating the timer with interrupts disabled."
    );
    info!("Calibrating timer...");

    // The largest power of two still less than one tick.
    let mut loops_per_tick: u64 = 1 << 10;
    while !too_many_loops(loops_per_tick << 1) {
        loops_per_tick <<= 1;
        assert_ne!(loops_per_tick, 0);
    }

    // Refine the next 8 bits.
    let high_bit = loops_per_tick;
    let mut test_bit = high_bit >> 1;
    while test_bit != high_bit >> 10 {
        if !too_many_loops(high_bit | test_bit) {
            loops_per_tick |= test_bit;
        }
        test_bit >>= 1;
    }

    let timer = &kernel().timer;
    timer.loops_per_tick.store(loops_per_tick, Ordering::SeqCst);
    info!("Timer: {} loops/s.", loops_per_tick * timer.freq as u64);
}

/// Returns true if `loops` iterations take longer than one tick.
fn too_many_loops(loops: u64) -> bool {
    let ticks = &kernel().timer.ticks;
    // Wait for a tick boundary.
    let start = ticks.load(Ordering::SeqCst);
    while ticks.load(Ordering::SeqCst) == start {
        abyss::cpu::relax();
    }

    let start = ticks.load(Ordering::SeqCst);
    busy_wait(loops);
    start != ticks.load(Ordering::SeqCst)
}

/// Spin for `loops` iterations.
///
/// Pending interrupts are delivered on every iteration.
#[inline(never)]
pub fn busy_wait(loops: u64) {
    for _ in 0..loops {
        abyss::cpu::relax();
    }
}

/// Number of ticks since the kernel booted.
///
/// Reading the counter is an interrupt delivery point.
pub fn ticks() -> i64 {
    let _cli = InterruptGuard::new();
    kernel().timer.ticks.load(Ordering::SeqCst)
}

/// Number of ticks elapsed since `then`, a value once returned by
/// [`ticks`].
pub fn elapsed(then: i64) -> i64 {
    ticks() - then
}

/// Ticks per second.
pub fn frequency() -> u32 {
    kernel().timer.freq
}

/// Busy-wait iterations per tick, as measured at boot.
pub fn loops_per_tick() -> u64 {
    kernel().timer.loops_per_tick.load(Ordering::SeqCst)
}

/// Number of threads sleeping on the timer.
pub fn sleepers() -> usize {
    let sleepers = kernel().timer.sleepers.lock();
    let len = sleepers.len();
    sleepers.unlock();
    len
}

/// Suspend the current thread for approximately `ticks` ticks.
///
/// Returns immediately if `ticks` is not positive. Must be called with
/// interrupts enabled and outside of an interrupt handler.
pub fn sleep(ticks: i64) {
    if ticks <= 0 {
        return;
    }
    assert!(
        !abyss::interrupt::in_handler(),
        "timer::sleep() in an interrupt handler."
    );
    assert_eq!(
        InterruptState::current(),
        InterruptState::On,
        "timer::sleep() with interrupts disabled."
    );

    let kernel = kernel();
    let _cli = InterruptGuard::new();
    let mut ctx = kernel.sched.lock();
    // A wake-up tick past the end of time never comes.
    let wake_at = kernel.timer.ticks.load(Ordering::SeqCst).saturating_add(ticks);
    let tid = ctx.current;
    ctx.current_mut().wake_at = Some(wake_at);
    let mut sleepers = kernel.timer.sleepers.lock();
    sleepers.insert(wake_at, tid);
    sleepers.unlock();
    scheduler::block(ctx);
}

/// Suspend the current thread for approximately `ms` milliseconds.
pub fn msleep(ms: i64) {
    real_time_sleep(ms, 1000);
}

/// Suspend the current thread for approximately `us` microseconds.
pub fn usleep(us: i64) {
    real_time_sleep(us, 1000 * 1000);
}

/// Suspend the current thread for approximately `ns` nanoseconds.
pub fn nsleep(ns: i64) {
    real_time_sleep(ns, 1000 * 1000 * 1000);
}

/// Ticks in `num / denom` seconds at `freq` Hz, rounding down.
fn real_time_ticks(num: i64, denom: i64, freq: u32) -> i64 {
    let ticks = num as i128 * freq as i128 / denom as i128;
    i64::try_from(ticks).unwrap_or(if ticks < 0 { i64::MIN } else { i64::MAX })
}

/// Sleep for approximately `num / denom` seconds.
fn real_time_sleep(num: i64, denom: i64) {
    let ticks = real_time_ticks(num, denom, frequency());

    assert_eq!(
        InterruptState::current(),
        InterruptState::On,
        "Sleeping with interrupts disabled."
    );
    if ticks > 0 {
        sleep(ticks);
    } else if num > 0 {
        debug_assert_eq!(denom % 1000, 0);
        let (num, freq) = (num as i128, frequency() as i128);
        let loops = loops_per_tick() as i128 * num / 1000 * freq / (denom as i128 / 1000);
        busy_wait(u64::try_from(loops).unwrap_or(0));
    }
}

/// Prints timer statistics.
pub fn print_stats() {
    println!("Timer: {} ticks", ticks());
}

#[cfg(test)]
mod tests {
    use super::{SleepQueue, real_time_ticks};

    #[test]
    fn sleepers_are_sorted_by_wake_time() {
        let mut queue = SleepQueue::new();
        queue.insert(30, 1);
        queue.insert(10, 2);
        queue.insert(20, 3);
        queue.insert(10, 4);
        assert_eq!(queue.len(), 4);

        assert_eq!(queue.pop_due(9), None);
        assert_eq!(queue.pop_due(10), Some(2));
        assert_eq!(queue.pop_due(10), Some(4));
        assert_eq!(queue.pop_due(10), None);
        assert_eq!(queue.pop_due(25), Some(3));
        assert_eq!(queue.pop_due(25), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn a_late_tick_wakes_every_due_sleeper() {
        let mut queue = SleepQueue::new();
        for (tid, wake_at) in [(1, 5), (2, 3), (3, 8), (4, 4)] {
            queue.insert(wake_at, tid);
        }
        let woken: Vec<u64> = core::iter::from_fn(|| queue.pop_due(5)).collect();
        assert_eq!(woken, [2, 4, 1]);
        assert_eq!(queue.pop_due(7), None);
        assert_eq!(queue.pop_due(8), Some(3));
    }

    #[test]
    fn real_time_conversion() {
        assert_eq!(real_time_ticks(50, 1000, 100), 5);
        assert_eq!(real_time_ticks(9, 1000, 100), 0);
        assert_eq!(real_time_ticks(-30, 1000, 100), -3);
        // Large requests do not overflow.
        assert_eq!(real_time_ticks(i64::MAX / 10, 1000, 100), i64::MAX / 100);
        assert_eq!(real_time_ticks(i64::MAX, 1000, 1000), i64::MAX);
        assert_eq!(real_time_ticks(i64::MIN, 1000 * 1000, 1000), i64::MIN / 1000);
    }

    #[test]
    fn far_sleepers_are_never_due() {
        let mut queue = SleepQueue::new();
        queue.insert(i64::MAX, 1);
        queue.insert(7, 2);
        assert_eq!(queue.pop_due(7), Some(2));
        assert_eq!(queue.pop_due(i64::MAX - 1), None);
        assert_eq!(queue.len(), 1);
    }
}
