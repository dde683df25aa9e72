//! Programmable interrupt controller.
//!
//! Devices raise interrupt request lines here. A raised line stays latched
//! until the cpu acknowledges it; raising a line that is already latched is
//! coalesced into the pending request.
use crossbeam_queue::ArrayQueue;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::sync::LazyLock;

/// Interrupt vectors wired to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Vector {
    /// 8254 Timer.
    Timer = 0x20,
}

/// Number of interrupt request lines.
pub const IRQ_LINES: usize = 1;

// Interrupt request register.
static IRR: LazyLock<ArrayQueue<Vector>> = LazyLock::new(|| ArrayQueue::new(IRQ_LINES));

/// Raise the interrupt line of `vector`.
pub fn raise(vector: Vector) {
    // A full register means the line is already pending.
    let _ = IRR.push(vector);
    crate::cpu::kick();
}

/// Returns true if an interrupt is waiting for delivery.
pub fn pending() -> bool {
    !IRR.is_empty()
}

/// Take the next pending interrupt.
pub(crate) fn acknowledge() -> Option<Vector> {
    IRR.pop()
}
