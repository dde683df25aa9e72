//! The cpu of the machine.
//!
//! Each execution context (a kernel thread) lives on its own host thread,
//! but only the owner of the cpu executes; every other context sleeps on
//! its parker. A context switch hands the ownership to the next context and
//! wakes it, then parks until the ownership comes back.
use crate::{dev::pic, x86_64::Rflags};
use crossbeam_utils::{
    atomic::AtomicCell,
    sync::{Parker, Unparker},
};
use std::{
    cell::RefCell,
    io,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

// Id of the context that owns the cpu.
static OWNER: AtomicU64 = AtomicU64::new(0);
// Waker of the halted cpu, if any.
static HALTED: AtomicCell<Option<Unparker>> = AtomicCell::new(None);

const HALT_TIMEOUT: Duration = Duration::from_millis(10);

struct Local {
    id: u64,
    parker: Parker,
}

thread_local! {
    static LOCAL: RefCell<Option<Local>> = const { RefCell::new(None) };
}

/// A handle to an execution context that the cpu can switch to.
#[derive(Clone)]
pub struct Context {
    id: u64,
    unparker: Unparker,
}

impl Context {
    /// Id of this context.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

fn install(id: u64, parker: Parker) {
    LOCAL.with_borrow_mut(|local| *local = Some(Local { id, parker }));
}

/// Id of the execution context of the calling host thread, if it is one.
pub fn context_id() -> Option<u64> {
    LOCAL.with_borrow(|local| local.as_ref().map(|local| local.id))
}

fn current_id() -> u64 {
    context_id().unwrap_or_else(|| {
        panic!("cpu: {:?} is not an execution context.", std::thread::current().id())
    })
}

fn wait_for_cpu(id: u64) {
    LOCAL.with_borrow(|local| {
        let Some(local) = local.as_ref() else {
            panic!("cpu: {:?} is not an execution context.", std::thread::current().id());
        };
        while OWNER.load(Ordering::SeqCst) != id {
            local.parker.park();
        }
    });
}

fn hand_over(next: &Context) {
    OWNER.store(next.id, Ordering::SeqCst);
    next.unparker.unpark();
}

/// Turn the calling host thread into the context `id` and give it the cpu.
///
/// Called once, by the boot thread.
pub fn bootstrap(id: u64) -> Context {
    let parker = Parker::new();
    let context = Context {
        id,
        unparker: parker.unparker().clone(),
    };
    install(id, parker);
    OWNER.store(id, Ordering::SeqCst);
    context
}

/// Create a new context `id` that runs `f` the first time the cpu is
/// switched to it.
pub fn spawn<F>(id: u64, name: String, stack_size: usize, f: F) -> io::Result<Context>
where
    F: FnOnce() + Send + 'static,
{
    let parker = Parker::new();
    let context = Context {
        id,
        unparker: parker.unparker().clone(),
    };
    std::thread::Builder::new()
        .name(name)
        .stack_size(stack_size)
        .spawn(move || {
            install(id, parker);
            wait_for_cpu(id);
            f();
        })?;
    Ok(context)
}

/// Switch the cpu to `next` and sleep until some context switches back.
///
/// Must be called with interrupts disabled.
pub fn switch(next: &Context) {
    let me = current_id();
    debug_assert_eq!(OWNER.load(Ordering::SeqCst), me);
    hand_over(next);
    wait_for_cpu(me);
}

/// Switch the cpu to `next` for the last time.
///
/// The caller never gets the cpu back; it must not touch any state of the
/// machine after this returns.
pub fn switch_final(next: &Context) {
    hand_over(next);
}

/// Spin-wait hint.
///
/// The cpu takes pending interrupts here if the interrupt flag is set.
#[inline]
pub fn relax() {
    core::hint::spin_loop();
    crate::interrupt::poll();
}

/// Enable interrupts and stop the cpu until the next interrupt (`sti; hlt`).
pub fn halt() {
    unsafe {
        Rflags::set_if();
    }
    if !pic::pending() {
        LOCAL.with_borrow(|local| {
            let Some(local) = local.as_ref() else {
                panic!("cpu: {:?} is not an execution context.", std::thread::current().id());
            };
            HALTED.store(Some(local.parker.unparker().clone()));
            while !pic::pending() {
                local.parker.park_timeout(HALT_TIMEOUT);
            }
            HALTED.store(None);
        });
    }
    crate::interrupt::poll();
}

/// Wake the cpu if it is halted.
pub(crate) fn kick() {
    if let Some(unparker) = HALTED.take() {
        unparker.unpark();
    }
}
