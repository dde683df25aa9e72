//! The kernel context.
//!
//! Every piece of global kernel state lives in one [`Kernel`], created once
//! by [`boot`] and reached through [`kernel`].
use crate::{
    KernelError,
    config::Config,
    sync::SpinLock,
    thread::scheduler::{self, Context},
    timer::{self, Timer},
};
use abyss::interrupt::InterruptState;
use std::sync::OnceLock;

/// The kernel.
pub(crate) struct Kernel {
    /// The scheduler context.
    ///
    /// Lock order: `sched` before the sleep queue of the [`timer`].
    pub(crate) sched: SpinLock<Context>,
    pub(crate) timer: Timer,
    pub(crate) config: Config,
}

static KERNEL: OnceLock<Kernel> = OnceLock::new();

/// The booted kernel.
///
/// Panics if the kernel is not booted.
#[inline]
pub(crate) fn kernel() -> &'static Kernel {
    match KERNEL.get() {
        Some(kernel) => kernel,
        None => panic!("Kernel is not booted."),
    }
}

/// The booted kernel, if any.
#[inline]
pub(crate) fn try_kernel() -> Option<&'static Kernel> {
    KERNEL.get()
}

/// Boot the kernel on the calling host thread, which becomes the "main"
/// thread.
pub(crate) fn boot(config: Config) -> Result<(), KernelError> {
    if KERNEL.get().is_some() {
        return Err(KernelError::Busy);
    }
    let sched = Context::new(config.mlfqs)?;
    KERNEL
        .set(Kernel {
            sched: SpinLock::new(sched),
            timer: Timer::new(config.timer_freq),
            config,
        })
        .map_err(|_| KernelError::Busy)?;

    abyss::interrupt::set_dispatcher(crate::interrupt::do_handle_interrupt);
    abyss::interrupt::set_preemption_hook(scheduler::preempt);
    info!(
        "Scheduler: {}.",
        if config.mlfqs { "mlfqs" } else { "priority" }
    );
    timer::init()?;
    unsafe { InterruptState::enable() };
    timer::calibrate();
    Ok(())
}
