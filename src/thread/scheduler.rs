//! Thread scheduler
//!
//! The scheduler context owns every thread control block, the ready queue and
//! the registries of the semaphores and locks. It lives behind a single
//! spinlock; holding it also keeps interrupts disabled, so one critical
//! section is atomic against both other threads and the timer interrupt.
//!
//! A thread gives up the cpu through [`schedule`] with interrupts disabled.
//! The thread that gets the cpu finishes the switch by reclaiming the
//! previous thread if it died.
use super::{
    PRI_DEFAULT, PRI_MIN, STACK_SIZE, Thread, ThreadState, fixed_point::FixedPoint,
    mlfqs::Mlfqs,
};
use crate::{
    KernelError,
    kernel::kernel,
    sync::{SpinLockGuard, lock::LockState, semaphore::SemaphoreState},
};
use abyss::interrupt::{InterruptGuard, InterruptState};
use std::collections::{BTreeMap, VecDeque};

/// Number of timer ticks a thread may run before it is preempted.
pub const TIME_SLICE: u32 = 4;

/// The thread table, keyed by thread id.
pub type Threads = BTreeMap<u64, Thread>;

/// What the timer tells the scheduler on every tick.
#[derive(Clone, Copy, Debug)]
pub struct TickInfo {
    /// Ticks since boot, including this one.
    pub ticks: i64,
    /// Ticks per second.
    pub freq: u32,
    /// The running thread.
    pub current: u64,
    /// The idle thread.
    pub idle: u64,
}

/// A trait for a thread scheduler.
///
/// The [`Scheduler`] trait defines the common functionality expected from a
/// thread scheduler. It provides an interface for managing threads, determining
/// which thread to run next, and handling periodic timer interrupts. A thread
/// scheduler is responsible for controlling the execution of threads in a
/// system. The scheduler determines when each thread is allowed to run, how to
/// handle context switching, and ensures fair allocation of CPU time among all
/// threads.
///
/// Queues hold thread ids only. Priorities are read from the thread table
/// at the moment of the decision, since donation changes them while a
/// thread waits in the queue.
pub trait Scheduler {
    /// Pop a next thread to run.
    ///
    /// Returns `None` if no threads are available to execute; the idle thread
    /// runs then.
    fn next_to_run(&mut self, threads: &Threads) -> Option<u64>;

    /// Push a thread `tid` into scheduling queue.
    fn push_to_queue(&mut self, tid: u64);

    /// The highest priority among the queued threads.
    fn highest_priority(&self, threads: &Threads) -> Option<i32>;

    /// Number of threads in the queue.
    fn ready_threads(&self) -> usize;

    /// Called on every timer interrupt.
    ///
    /// This method allows the scheduler to adjust thread priorities as
    /// needed. Time slices are accounted by the caller.
    fn timer_tick(&mut self, threads: &mut Threads, tick: TickInfo);

    /// Load average of the system.
    fn load_avg(&self) -> FixedPoint {
        FixedPoint::ZERO
    }
}

/// Index of the thread with the highest priority among `tids`, the earliest
/// among equals.
pub(crate) fn highest<'a>(
    tids: impl IntoIterator<Item = &'a u64>,
    threads: &Threads,
) -> Option<(usize, i32)> {
    tids.into_iter()
        .enumerate()
        .fold(None, |best, (idx, tid)| {
            let priority = threads.get(tid).map_or(PRI_MIN, |th| th.priority);
            match best {
                Some((_, best_priority)) if best_priority >= priority => best,
                _ => Some((idx, priority)),
            }
        })
}

/// The ready queue.
///
/// Dispatches the thread with the highest effective priority. Threads of the
/// same priority leave in the order they entered, which makes the scheduler
/// round-robin within a priority.
#[derive(Default)]
pub struct RunQueue {
    queue: VecDeque<u64>,
}

impl RunQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Append `tid` at the end of the queue.
    pub fn push(&mut self, tid: u64) {
        self.queue.push_back(tid);
    }

    /// Pop the thread of the highest priority.
    pub fn pop(&mut self, threads: &Threads) -> Option<u64> {
        let (idx, _) = highest(&self.queue, threads)?;
        self.queue.remove(idx)
    }

    /// The highest priority in the queue.
    pub fn highest_priority(&self, threads: &Threads) -> Option<i32> {
        highest(&self.queue, threads).map(|(_, priority)| priority)
    }

    /// Number of queued threads.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no thread is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The priority scheduler.
///
/// Always runs the ready thread with the highest effective priority,
/// round-robin among threads of the same priority.
#[derive(Default)]
pub struct PriorityScheduler {
    queue: RunQueue,
}

impl PriorityScheduler {
    /// Create a new priority scheduler.
    pub const fn new() -> Self {
        Self {
            queue: RunQueue::new(),
        }
    }
}

impl Scheduler for PriorityScheduler {
    fn next_to_run(&mut self, threads: &Threads) -> Option<u64> {
        self.queue.pop(threads)
    }
    fn push_to_queue(&mut self, tid: u64) {
        self.queue.push(tid);
    }
    fn highest_priority(&self, threads: &Threads) -> Option<i32> {
        self.queue.highest_priority(threads)
    }
    fn ready_threads(&self) -> usize {
        self.queue.len()
    }
    fn timer_tick(&mut self, _threads: &mut Threads, _tick: TickInfo) {}
}

/// The scheduler context.
pub(crate) struct Context {
    pub(crate) threads: Threads,
    /// The running thread.
    pub(crate) current: u64,
    pub(crate) idle: u64,
    pub(crate) scheduler: Box<dyn Scheduler + Send>,
    pub(crate) mlfqs: bool,
    pub(crate) semaphores: BTreeMap<u64, SemaphoreState>,
    pub(crate) locks: BTreeMap<u64, LockState>,
    /// Ticks the running thread has used of its slice.
    slice: u32,
    /// A dead thread to reclaim once the cpu left it.
    reap: Option<u64>,
    pub(crate) idle_ticks: u64,
    pub(crate) kernel_ticks: u64,
}

impl Context {
    /// Adopt the calling host thread as the "main" thread and create the
    /// idle thread.
    pub(crate) fn new(mlfqs: bool) -> Result<Self, KernelError> {
        let main = Thread::allocate_tid();
        let mut main_thread = Thread::new(
            main,
            "main".into(),
            PRI_DEFAULT,
            abyss::cpu::bootstrap(main),
            None,
        );
        main_thread.state = ThreadState::Running;

        let idle = Thread::allocate_tid();
        let context = abyss::cpu::spawn(idle, "idle".into(), STACK_SIZE, idle_loop)?;
        let mut idle_thread = Thread::new(idle, "idle".into(), PRI_MIN, context, None);
        idle_thread.state = ThreadState::Blocked;

        let scheduler: Box<dyn Scheduler + Send> = if mlfqs {
            Box::new(Mlfqs::new())
        } else {
            Box::new(PriorityScheduler::new())
        };
        Ok(Self {
            threads: BTreeMap::from([(main, main_thread), (idle, idle_thread)]),
            current: main,
            idle,
            scheduler,
            mlfqs,
            semaphores: BTreeMap::new(),
            locks: BTreeMap::new(),
            slice: 0,
            reap: None,
            idle_ticks: 0,
            kernel_ticks: 0,
        })
    }

    pub(crate) fn thread(&self, tid: u64) -> &Thread {
        self.threads
            .get(&tid)
            .unwrap_or_else(|| panic!("No such thread: #{tid}."))
    }

    pub(crate) fn thread_mut(&mut self, tid: u64) -> &mut Thread {
        self.threads
            .get_mut(&tid)
            .unwrap_or_else(|| panic!("No such thread: #{tid}."))
    }

    pub(crate) fn current(&self) -> &Thread {
        self.thread(self.current)
    }

    pub(crate) fn current_mut(&mut self) -> &mut Thread {
        let current = self.current;
        self.thread_mut(current)
    }

    /// Mark `tid` ready and queue it.
    pub(crate) fn push_ready(&mut self, tid: u64) {
        self.thread_mut(tid).state = ThreadState::Ready;
        if tid != self.idle {
            self.scheduler.push_to_queue(tid);
        }
    }

    /// Wake the blocked thread `tid`.
    pub(crate) fn unblock(&mut self, tid: u64) {
        let state = self.thread(tid).state;
        assert_eq!(
            state,
            ThreadState::Blocked,
            "Unblocking thread #{tid}, which is not blocked."
        );
        self.push_ready(tid);
    }

    /// Returns true if `tid` should run instead of the running thread.
    pub(crate) fn outranks_current(&self, tid: u64) -> bool {
        self.current == self.idle || self.thread(tid).priority > self.current().priority
    }

    /// Returns true if a ready thread should run instead of the running
    /// thread.
    pub(crate) fn should_preempt(&self) -> bool {
        match self.scheduler.highest_priority(&self.threads) {
            Some(priority) => self.current == self.idle || priority > self.current().priority,
            None => false,
        }
    }

    /// Per-tick accounting. Returns true if the running thread should yield
    /// when the timer interrupt returns.
    pub(crate) fn tick(&mut self, ticks: i64, freq: u32) -> bool {
        if self.current == self.idle {
            self.idle_ticks += 1;
        } else {
            self.kernel_ticks += 1;
        }
        let tick = TickInfo {
            ticks,
            freq,
            current: self.current,
            idle: self.idle,
        };
        self.scheduler.timer_tick(&mut self.threads, tick);

        self.slice += 1;
        self.slice >= TIME_SLICE || self.should_preempt()
    }
}

/// Give the cpu to the next thread.
///
/// The caller has already moved the current thread out of the running state
/// (or left it running, to resume it if nothing else is ready) and disabled
/// interrupts. Returns when the current thread is scheduled again, or right
/// after the final switch if it is dying.
pub(crate) fn schedule(mut ctx: SpinLockGuard<'static, Context>) {
    let prev = ctx.current;
    let next = {
        let Context {
            scheduler, threads, ..
        } = &mut *ctx;
        scheduler.next_to_run(threads)
    }
    .unwrap_or(ctx.idle);

    let prev_state = ctx.thread(prev).state;
    ctx.thread_mut(next).state = ThreadState::Running;
    ctx.slice = 0;
    if next == prev {
        ctx.unlock();
        return;
    }
    debug_assert_ne!(prev_state, ThreadState::Running);
    ctx.current = next;
    if prev_state == ThreadState::Dying {
        ctx.reap = Some(prev);
    }
    let next = ctx.thread(next).context.clone();
    ctx.unlock();

    assert_eq!(
        InterruptState::current(),
        InterruptState::Off,
        "Context switch with interrupts enabled."
    );
    if prev_state == ThreadState::Dying {
        abyss::cpu::switch_final(&next);
    } else {
        abyss::cpu::switch(&next);
        finish_switch();
    }
}

/// Finish a context switch on the thread that got the cpu.
pub(crate) fn finish_switch() {
    let mut ctx = kernel().sched.lock();
    let dead = ctx.reap.take().and_then(|tid| ctx.threads.remove(&tid));
    ctx.unlock();
    // Dropped outside of the lock: the control block owns a semaphore.
    drop(dead);
}

/// Block the running thread.
pub(crate) fn block(mut ctx: SpinLockGuard<'static, Context>) {
    let current = ctx.current_mut();
    assert_eq!(
        current.state,
        ThreadState::Running,
        "Blocking thread #{}, which is not running.",
        current.tid
    );
    current.state = ThreadState::Blocked;
    schedule(ctx);
}

/// Move the running thread to the ready queue and schedule.
pub(crate) fn yield_current() {
    let _cli = InterruptGuard::new();
    let mut ctx = kernel().sched.lock();
    let current = ctx.current;
    ctx.push_ready(current);
    schedule(ctx);
}

/// Yield now, or when the running interrupt handler returns.
pub(crate) fn preempt_current() {
    if abyss::interrupt::in_handler() {
        abyss::interrupt::yield_on_return();
    } else {
        yield_current();
    }
}

/// Invoked by the machine when a handler requested a yield on return.
pub(crate) fn preempt() {
    yield_current();
}

/// The idle thread.
///
/// Runs only when no other thread is ready. It is never queued: the
/// scheduler falls back to it when the queue is empty.
fn idle_loop() {
    finish_switch();
    unsafe { InterruptState::enable() };
    loop {
        let cli = InterruptGuard::new();
        block(kernel().sched.lock());
        drop(cli);
        // Wait for the next interrupt.
        abyss::cpu::halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(priorities: &[(u64, i32)]) -> Threads {
        let mut threads = Threads::new();
        for &(tid, priority) in priorities {
            let context = abyss::cpu::bootstrap(tid);
            threads.insert(
                tid,
                Thread::new(tid, format!("t{tid}"), priority, context, None),
            );
        }
        threads
    }

    #[test]
    fn run_queue_prefers_priority_then_fifo() {
        let threads = table(&[(1, 31), (2, 40), (3, 31), (4, 40)]);
        let mut queue = RunQueue::new();
        for tid in [1, 2, 3, 4] {
            queue.push(tid);
        }
        assert_eq!(queue.highest_priority(&threads), Some(40));
        assert_eq!(queue.pop(&threads), Some(2));
        assert_eq!(queue.pop(&threads), Some(4));
        assert_eq!(queue.pop(&threads), Some(1));
        assert_eq!(queue.pop(&threads), Some(3));
        assert_eq!(queue.pop(&threads), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn run_queue_reads_priorities_at_pop() {
        let mut threads = table(&[(1, 10), (2, 20)]);
        let mut queue = RunQueue::new();
        queue.push(1);
        queue.push(2);
        // Donation raised thread 1 while it was queued.
        threads.get_mut(&1).unwrap().priority = 50;
        assert_eq!(queue.pop(&threads), Some(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn highest_picks_earliest_among_equals() {
        let threads = table(&[(7, 5), (8, 9), (9, 9)]);
        assert_eq!(highest(&[7, 8, 9], &threads), Some((1, 9)));
        assert_eq!(highest(&[], &threads), None);
    }
}
