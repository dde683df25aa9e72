//! Thread abstration, an abstraction of a cpu core.
//!
//! ## The threading model
//!
//! An executing kernel consists of a collection of threads,
//! each with their own stack and local state. Threads can be named, and
//! provide some built-in support for low-level synchronization.
//!
//! Every thread is in exactly one of the [`ThreadState`]s:
//!
//! ```text
//!            create            dispatch
//!   (none) ---------> Ready ------------> Running ---- exit ----> Dying
//!                       ^  <------------    |
//!                       |  yield/preempt    | block
//!                       |                   v
//!                       +----- wake ----- Blocked
//! ```
//!
//! Only the running thread may block, and only a blocked thread may be
//! woken. Violating either is a kernel bug and panics.
//!
//! ## Priorities
//!
//! Each thread has a base priority in `PRI_MIN..=PRI_MAX` and an effective
//! priority that the scheduler uses. The effective priority is raised above
//! the base by priority donation (see [`Lock`]) or, in MLFQS mode, computed
//! from `nice` and `recent_cpu` (see [`mlfqs`]).
//!
//! [`Lock`]: crate::sync::Lock
pub mod fixed_point;
pub mod mlfqs;
pub mod scheduler;

use crate::{KernelError, kernel::kernel, sync::Semaphore};
use abyss::interrupt::{InterruptGuard, InterruptState};
use fixed_point::FixedPoint;
use std::sync::{
    Arc,
    atomic::{AtomicI32, AtomicU64, Ordering},
};

/// Size of each thread's stack.
pub const STACK_SIZE: usize = 0x100000;

/// Lowest priority.
pub const PRI_MIN: i32 = 0;
/// Default priority.
pub const PRI_DEFAULT: i32 = 31;
/// Highest priority.
pub const PRI_MAX: i32 = 63;

/// Lowest niceness.
pub const NICE_MIN: i32 = -20;
/// Default niceness.
pub const NICE_DEFAULT: i32 = 0;
/// Highest niceness.
pub const NICE_MAX: i32 = 20;

/// A possible state of the thread.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ThreadState {
    /// Thread is runnable and waits in the ready queue.
    Ready,
    /// Thread is running.
    Running,
    /// Thread waits for an event: a semaphore, a lock, a condition variable
    /// or a timer tick.
    Blocked,
    /// Thread has exited and waits to be reclaimed.
    Dying,
}

/// Exit code of a thread and the event of its publication.
pub(crate) struct ExitStatus {
    code: AtomicI32,
    done: Semaphore,
}

/// An thread abstraction.
///
/// Owned by the thread table of the scheduler. Everything else refers to a
/// thread by its `tid`.
pub struct Thread {
    /// Thread id
    pub tid: u64,
    /// Thread name
    pub name: String,
    pub(crate) state: ThreadState,
    pub(crate) base_priority: i32,
    pub(crate) priority: i32,
    /// Tick to wake up at, while the thread sleeps.
    pub(crate) wake_at: Option<i64>,
    pub(crate) held_locks: Vec<u64>,
    pub(crate) waiting_on_lock: Option<u64>,
    pub(crate) nice: i32,
    pub(crate) recent_cpu: FixedPoint,
    pub(crate) context: abyss::cpu::Context,
    pub(crate) exit: Option<Arc<ExitStatus>>,
}

impl Thread {
    pub(crate) fn allocate_tid() -> u64 {
        static TID: AtomicU64 = AtomicU64::new(1);
        TID.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn new(
        tid: u64,
        name: String,
        priority: i32,
        context: abyss::cpu::Context,
        exit: Option<Arc<ExitStatus>>,
    ) -> Self {
        Self {
            tid,
            name,
            state: ThreadState::Ready,
            base_priority: priority,
            priority,
            wake_at: None,
            held_locks: Vec::new(),
            waiting_on_lock: None,
            nice: NICE_DEFAULT,
            recent_cpu: FixedPoint::ZERO,
            context,
            exit,
        }
    }

    /// State of the thread.
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Effective priority, the one the scheduler uses.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Priority without donations.
    pub fn base_priority(&self) -> i32 {
        self.base_priority
    }

    /// Niceness of the thread.
    pub fn nice(&self) -> i32 {
        self.nice
    }

    /// Recent cpu usage of the thread.
    pub fn recent_cpu(&self) -> FixedPoint {
        self.recent_cpu
    }
}

/// A snapshot of a thread, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Thread id.
    pub tid: u64,
    /// Thread name.
    pub name: String,
    /// State of the thread.
    pub state: ThreadState,
    /// Effective priority.
    pub priority: i32,
    /// Base priority.
    pub base_priority: i32,
    /// Niceness.
    pub nice: i32,
    /// Recent cpu usage, multiplied by 100 and rounded.
    pub recent_cpu: i32,
    /// Tick the thread sleeps until.
    pub wake_at: Option<i64>,
    /// Number of locks the thread holds.
    pub held_locks: usize,
    /// Whether the thread is blocked acquiring a lock.
    pub waiting_on_lock: bool,
}

impl From<&Thread> for ThreadInfo {
    fn from(th: &Thread) -> Self {
        Self {
            tid: th.tid,
            name: th.name.clone(),
            state: th.state,
            priority: th.priority,
            base_priority: th.base_priority,
            nice: th.nice,
            recent_cpu: (th.recent_cpu * 100).round(),
            wake_at: th.wake_at,
            held_locks: th.held_locks.len(),
            waiting_on_lock: th.waiting_on_lock.is_some(),
        }
    }
}

/// Get specified thread's [`ThreadState`] by TID (Thread ID).
pub fn get_state_by_tid(tid: u64) -> Result<ThreadState, KernelError> {
    let ctx = kernel().sched.lock();
    let result = ctx
        .threads
        .get(&tid)
        .map(|th| th.state)
        .ok_or(KernelError::InvalidArgument);
    ctx.unlock();
    result
}

/// Get a snapshot of the thread `tid`.
pub fn info_by_tid(tid: u64) -> Result<ThreadInfo, KernelError> {
    let ctx = kernel().sched.lock();
    let result = ctx
        .threads
        .get(&tid)
        .map(ThreadInfo::from)
        .ok_or(KernelError::InvalidArgument);
    ctx.unlock();
    result
}

/// Run a function `f` with current thread as an argument.
///
/// `f` runs with the scheduler locked; it must not block.
pub fn with_current<R>(f: impl FnOnce(&Thread) -> R) -> R {
    let ctx = kernel().sched.lock();
    let r = f(ctx.current());
    ctx.unlock();
    r
}

/// Block the current thread until [`unblock`] is called on it.
///
/// Must be called with interrupts disabled, outside of an interrupt handler.
/// The caller usually records the thread id somewhere the waker can find it
/// before blocking.
pub fn block() {
    assert!(
        !abyss::interrupt::in_handler(),
        "thread::block() in an interrupt handler."
    );
    assert_eq!(
        InterruptState::current(),
        InterruptState::Off,
        "thread::block() with interrupts enabled."
    );
    scheduler::block(kernel().sched.lock());
}

/// Transition the blocked thread `tid` to the ready state.
///
/// This does not preempt the running thread. Panics if `tid` is not
/// blocked.
pub fn unblock(tid: u64) {
    let mut ctx = kernel().sched.lock();
    ctx.unblock(tid);
    ctx.unlock();
}

/// Load average of the system, multiplied by 100 and rounded.
///
/// Always 0 unless the MLFQS scheduler is active.
pub fn get_load_avg() -> i32 {
    let ctx = kernel().sched.lock();
    let load_avg = ctx.scheduler.load_avg();
    ctx.unlock();
    (load_avg * 100).round()
}

/// Prints thread statistics.
pub fn print_stats() {
    let ctx = kernel().sched.lock();
    let (idle, kernel) = (ctx.idle_ticks, ctx.kernel_ticks);
    ctx.unlock();
    println!("Thread: {idle} idle ticks, {kernel} kernel ticks");
}

/// A handle to join thread.
pub struct JoinHandle
where
    Self: 'static,
{
    /// Thread id of this handle.
    pub tid: u64,
    exit: Arc<ExitStatus>,
}

impl JoinHandle {
    /// Join this handle and returns exit code.
    pub fn join(self) -> i32 {
        self.exit.done.down();
        self.exit.code.load(Ordering::SeqCst)
    }
}

/// A handle that represent the parked thread.
pub struct ParkHandle {
    tid: u64,
}

impl ParkHandle {
    /// Thread id of the parked thread.
    pub fn tid(&self) -> u64 {
        self.tid
    }

    /// Consume the handle and unpark the underlying thread.
    pub fn unpark(self) {
        unblock(self.tid);
    }
}

/// Unwinding payload of [`Current::exit`].
struct ExitRequest(i32);

/// Run `f` on the current thread and return its exit code.
pub(crate) fn run_to_exit(f: impl FnOnce()) -> i32 {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(()) => 0,
        Err(payload) => match payload.downcast::<ExitRequest>() {
            Ok(request) => request.0,
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

/// The very beginning of a thread.
fn thread_start<F: FnOnce() + Send>(thread_fn: F) {
    scheduler::finish_switch();
    unsafe { InterruptState::enable() };
    let exit_code = run_to_exit(thread_fn);
    do_exit(exit_code);
}

/// Publish `exit_code` and switch away for the last time.
///
/// Returns on the host thread of the dead thread, which must not touch the
/// machine afterwards.
pub(crate) fn do_exit(exit_code: i32) {
    assert!(
        !abyss::interrupt::in_handler(),
        "Thread exits in an interrupt handler."
    );
    let ctx = kernel().sched.lock();
    let exit = ctx.current().exit.clone();
    ctx.unlock();
    if let Some(exit) = exit {
        exit.code.store(exit_code, Ordering::SeqCst);
        exit.done.up();
    }

    // The guard is never dropped: this thread does not get the cpu back.
    let _cli = core::mem::ManuallyDrop::new(InterruptGuard::new());
    let mut ctx = kernel().sched.lock();
    ctx.current_mut().state = ThreadState::Dying;
    scheduler::schedule(ctx);
}

/// The opaque structure indicating the running thread on the current cpu.
pub struct Current {
    _p: (),
}

impl Current {
    /// Run a function `f` with [`ParkHandle`] for current thread, and then park
    /// the current thread.
    ///
    /// `f` runs with interrupts disabled and must not block. The thread is
    /// already parked when `f` runs, so `f` may hand the handle to another
    /// thread or even unpark it right away.
    pub fn park_with(f: impl FnOnce(ParkHandle)) {
        assert!(
            InterruptState::current() == InterruptState::On,
            "Try to park a thread while holding a lock."
        );
        let _cli = InterruptGuard::new();
        let mut ctx = kernel().sched.lock();
        let tid = ctx.current;
        ctx.current_mut().state = ThreadState::Blocked;
        ctx.unlock();

        f(ParkHandle { tid });
        scheduler::schedule(kernel().sched.lock());
    }

    /// Exit the current thread with `exit_code`.
    pub fn exit(exit_code: i32) -> ! {
        assert!(
            InterruptState::current() == InterruptState::On,
            "Try to exit a thread while holding a lock."
        );
        std::panic::resume_unwind(Box::new(ExitRequest(exit_code)))
    }

    /// Yield the cpu to another ready thread.
    ///
    /// The current thread stays ready and may be picked again right away.
    pub fn yield_now() {
        assert!(
            !abyss::interrupt::in_handler(),
            "Current::yield_now() in an interrupt handler."
        );
        scheduler::yield_current();
    }

    /// Get the current thread's id.
    pub fn get_tid() -> u64 {
        with_current(|th| th.tid)
    }

    /// Get the current thread's name.
    pub fn name() -> String {
        with_current(|th| th.name.clone())
    }

    /// Get the current thread's effective priority.
    pub fn get_priority() -> i32 {
        with_current(|th| th.priority)
    }

    /// Set the current thread's base priority to `priority`.
    ///
    /// The effective priority becomes the higher of `priority` and the
    /// priorities donated to the thread. Yields if a ready thread now has a
    /// higher priority. Ignored when MLFQS is active.
    pub fn set_priority(priority: i32) {
        assert!(
            (PRI_MIN..=PRI_MAX).contains(&priority),
            "Invalid priority: {priority}."
        );
        let mut ctx = kernel().sched.lock();
        if ctx.mlfqs {
            ctx.unlock();
            return;
        }
        let tid = ctx.current;
        ctx.current_mut().base_priority = priority;
        let donated = ctx.donated_priority(tid);
        let th = ctx.current_mut();
        th.priority = donated.map_or(priority, |donated| donated.max(priority));
        let preempt = ctx.should_preempt();
        ctx.unlock();
        if preempt {
            Self::yield_now();
        }
    }

    /// Get the current thread's niceness.
    pub fn get_nice() -> i32 {
        with_current(|th| th.nice)
    }

    /// Set the current thread's niceness to `nice`, clamped to
    /// `NICE_MIN..=NICE_MAX`.
    ///
    /// In MLFQS mode the priority of the thread is recomputed, and the thread
    /// yields if a ready thread now has a higher priority.
    pub fn set_nice(nice: i32) {
        let nice = nice.clamp(NICE_MIN, NICE_MAX);
        let mut ctx = kernel().sched.lock();
        let mlfqs = ctx.mlfqs;
        let th = ctx.current_mut();
        th.nice = nice;
        if mlfqs {
            th.base_priority = mlfqs::priority(th.recent_cpu, th.nice);
            th.priority = th.base_priority;
        }
        let preempt = ctx.should_preempt();
        ctx.unlock();
        if preempt {
            Self::yield_now();
        }
    }

    /// Get the current thread's recent cpu usage, multiplied by 100 and
    /// rounded.
    pub fn get_recent_cpu() -> i32 {
        with_current(|th| (th.recent_cpu * 100).round())
    }
}

/// A struct to build a new thread.
pub struct ThreadBuilder {
    name: String,
    priority: i32,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`.
    pub fn new<I>(name: I) -> Self
    where
        String: From<I>,
    {
        Self {
            name: String::from(name),
            priority: PRI_DEFAULT,
        }
    }

    /// Set the priority of the thread. Ignored when MLFQS is active.
    pub fn priority(mut self, priority: i32) -> Self {
        assert!(
            (PRI_MIN..=PRI_MAX).contains(&priority),
            "Invalid priority: {priority}."
        );
        self.priority = priority;
        self
    }

    /// Spawn the thread.
    ///
    /// Panics if the machine runs out of resources for a new thread.
    pub fn spawn<F: FnOnce() + Send + 'static>(self, thread_fn: F) -> JoinHandle {
        match self.try_spawn(thread_fn) {
            Ok(handle) => handle,
            Err(e) => panic!("Failed to spawn a thread: {e:?}"),
        }
    }

    /// Spawn the thread.
    ///
    /// The thread starts in the ready state. If it has a higher priority than
    /// the creator, the creator yields to it before this returns.
    pub fn try_spawn<F: FnOnce() + Send + 'static>(
        self,
        thread_fn: F,
    ) -> Result<JoinHandle, KernelError> {
        let Self { name, priority } = self;
        let tid = Thread::allocate_tid();
        let exit = Arc::new(ExitStatus {
            code: AtomicI32::new(0),
            done: Semaphore::new(0),
        });
        let context = abyss::cpu::spawn(tid, name.clone(), STACK_SIZE, move || {
            thread_start(thread_fn)
        })?;
        let mut th = Thread::new(tid, name, priority, context, Some(exit.clone()));

        let mut ctx = kernel().sched.lock();
        if ctx.mlfqs {
            let parent = ctx.current();
            th.nice = parent.nice;
            th.recent_cpu = parent.recent_cpu;
            th.base_priority = mlfqs::priority(th.recent_cpu, th.nice);
            th.priority = th.base_priority;
        }
        ctx.threads.insert(tid, th);
        ctx.push_ready(tid);
        let preempt = ctx.outranks_current(tid) && !abyss::interrupt::in_handler();
        ctx.unlock();
        if preempt {
            Current::yield_now();
        }
        Ok(JoinHandle { tid, exit })
    }
}
