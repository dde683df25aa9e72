//! Interrupt
#[cfg(doc)]
use crate::spinlock::SpinLockGuard;
use crate::{
    dev::pic::{self, Vector},
    x86_64::Rflags,
};
use core::{
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
};
use crossbeam_utils::atomic::AtomicCell;

/// Set while the cpu executes an external interrupt handler.
static IN_HANDLER: AtomicBool = AtomicBool::new(false);
/// Set by a handler that wants the interrupted thread to yield on return.
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

static DISPATCHER: AtomicCell<Option<fn(u8)>> = AtomicCell::new(None);
static PREEMPTION_HOOK: AtomicCell<Option<fn()>> = AtomicCell::new(None);

/// Enumeration representing the interrupt state.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum InterruptState {
    /// Interrupts are enabled.
    On,
    /// Interrupts are disabled.
    Off,
}

impl InterruptState {
    /// Reads the current interrupt state.
    ///
    /// # Returns
    /// - [`InterruptState::On`] if interrupts are enabled.
    /// - [`InterruptState::Off`] if interrupts are disabled.
    pub fn current() -> Self {
        if Rflags::read().contains(Rflags::IF) {
            Self::On
        } else {
            Self::Off
        }
    }

    /// Enables interrupts.
    ///
    /// Interrupts latched while the flag was clear are delivered before this
    /// returns.
    pub unsafe fn enable() {
        unsafe {
            Rflags::set_if();
        }
        poll();
    }

    /// Disables interrupts.
    pub unsafe fn disable() {
        unsafe {
            Rflags::clear_if();
        }
    }
}

/// An RAII-based guard for managing interrupt disabling.
///
/// When an `InterruptGuard` is created, interrupts are disabled. When it is
/// dropped, the interrupt state is restored to what it was before the guard was
/// created.
///
/// **Important:**
/// - [`InterruptGuard`] instances **must be dropped in reverse order of their
///   creation** to prevent unintended interrupt state changes.
/// - Due to Rust's ownership and scoping rules, this invariant is naturally
///   upheld unless `drop()` is explicitly called prematurely or an
///   [`InterruptGuard`] is stored in a struct field.
///
/// This structure is created using [`InterruptGuard::new`].
pub struct InterruptGuard {
    prev: InterruptState,
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// Creates a new `InterruptGuard`, disabling interrupts.
    ///
    /// # Behavior
    /// - Saves the current interrupt state.
    /// - Disables interrupts.
    ///
    /// # Returns
    /// A new instance of `InterruptGuard`, which will restore the original
    /// interrupt state when dropped.
    ///
    /// # Example
    /// ```rust
    /// let _guard = InterruptGuard::new(); // Disables interrupts
    /// // Critical section...
    /// // Interrupts are restored when `_guard` goes out of scope.
    /// ```
    pub fn new() -> Self {
        let prev = InterruptState::current();
        unsafe { InterruptState::disable() };
        core::sync::atomic::fence(Ordering::SeqCst);

        Self {
            prev,
            _not_send: PhantomData,
        }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        core::sync::atomic::fence(Ordering::SeqCst);
        if self.prev == InterruptState::On {
            unsafe { InterruptState::enable() };
        }
    }
}

/// Returns true while the cpu is executing an external interrupt handler.
pub fn in_handler() -> bool {
    IN_HANDLER.load(Ordering::SeqCst)
}

/// Requests the interrupted thread to yield the cpu right after the running
/// handler returns.
///
/// Only meaningful inside an interrupt handler.
pub fn yield_on_return() {
    assert!(in_handler(), "yield_on_return() outside of an interrupt handler.");
    YIELD_ON_RETURN.store(true, Ordering::SeqCst);
}

/// Install the function that receives every delivered interrupt vector.
pub fn set_dispatcher(dispatcher: fn(u8)) {
    DISPATCHER.store(Some(dispatcher));
}

/// Install the function called when a handler requested
/// [`yield_on_return`].
///
/// The hook runs after the handler returns, with interrupts disabled and
/// outside of the interrupt context.
pub fn set_preemption_hook(hook: fn()) {
    PREEMPTION_HOOK.store(Some(hook));
}

/// Deliver latched interrupts if the interrupt flag allows it.
pub fn poll() {
    while InterruptState::current() == InterruptState::On && !in_handler() {
        let Some(vector) = pic::acknowledge() else {
            break;
        };
        unsafe { deliver(vector) };
    }
}

/// Enter the handler for `vector` the way the hardware does: with the
/// interrupt flag cleared, then restore the flag on return.
unsafe fn deliver(vector: Vector) {
    unsafe {
        Rflags::clear_if();
    }
    IN_HANDLER.store(true, Ordering::SeqCst);
    match DISPATCHER.load() {
        Some(dispatch) => dispatch(vector.into()),
        None => panic!("Unknown interrupt #{:#x}", u8::from(vector)),
    }
    IN_HANDLER.store(false, Ordering::SeqCst);

    if YIELD_ON_RETURN.swap(false, Ordering::SeqCst)
        && let Some(hook) = PREEMPTION_HOOK.load()
    {
        hook();
    }
    // iretq
    unsafe {
        Rflags::set_if();
    }
}
