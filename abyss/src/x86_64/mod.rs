//! x86_64 CPU state of the simulated machine.
pub mod power_control;

use core::sync::atomic::{AtomicU64, Ordering};

bitflags::bitflags! {
    /// The RFLAGS register.
    ///
    /// Only the bits the machine models are defined. Bit 1 is reserved and
    /// always set.
    pub struct Rflags: u64 {
        /// Reserved, always 1.
        const _1 = 1 << 1;
        /// Interrupt enable flag.
        const IF = 1 << 9;
    }
}

// The machine boots with interrupts disabled.
static RFLAGS: AtomicU64 = AtomicU64::new(Rflags::_1.bits());

impl Rflags {
    /// Read the RFLAGS of the cpu.
    #[inline]
    pub fn read() -> Self {
        Self::from_bits_truncate(RFLAGS.load(Ordering::SeqCst))
    }

    /// Set the interrupt flag (`sti` without delivering pending interrupts).
    #[inline]
    pub(crate) unsafe fn set_if() {
        RFLAGS.fetch_or(Rflags::IF.bits(), Ordering::SeqCst);
    }

    /// Clear the interrupt flag (`cli`).
    #[inline]
    pub(crate) unsafe fn clear_if() {
        RFLAGS.fetch_and(!Rflags::IF.bits(), Ordering::SeqCst);
    }
}
