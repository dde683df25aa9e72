//! Interrupt management.
use crate::sync::SpinLock;
use std::sync::Arc;

type Handler = Option<Arc<dyn Fn() + Send + Sync>>;
#[allow(clippy::declare_interior_mutable_const)]
const INIT: SpinLock<Handler> = SpinLock::new(None);
static HANDLERS: [SpinLock<Handler>; 224] = [INIT; 224];

/// Entry of every external interrupt, called by the machine with interrupts
/// disabled.
#[doc(hidden)]
pub fn do_handle_interrupt(vec: u8) {
    let guard = match (vec as usize).checked_sub(32).and_then(|idx| HANDLERS.get(idx)) {
        Some(slot) => slot.lock(),
        None => panic!("Unknown interrupt #{vec}"),
    };
    let handler = guard.clone();
    guard.unlock();

    match &handler {
        Some(handler) => handler(),
        _ => {
            panic!("Unknown interrupt #{vec}");
        }
    }
}

/// Register the interrupt handler
pub fn register(vec: u8, handler: impl Fn() + Send + Sync + 'static) {
    let mut guard = match (vec as usize).checked_sub(32).and_then(|idx| HANDLERS.get(idx)) {
        Some(slot) => slot.lock(),
        None => panic!("Invalid interrupt vector #{vec}"),
    };
    *guard = Some(Arc::new(handler));
    guard.unlock();
}
