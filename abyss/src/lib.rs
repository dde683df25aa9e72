//! The abyss of kernel that operates hardwares.
//!
//! This crate contains the machine the kernel runs on. The machine is
//! simulated on top of a hosted operating system: one logical CPU whose
//! ownership moves between host threads, an interrupt flag, a latched
//! interrupt controller, an 8254-style programmable interval timer, a serial
//! console and a power switch.
//!
//! You are **not** required to understand every line of code in this crate.
//! What the kernel relies on is summarized below.
//!
//! - Exactly one host thread executes kernel code at a time: the one that
//!   owns the CPU. Ownership only moves through [`cpu::switch`] and
//!   [`cpu::switch_final`].
//! - The interrupt flag is CPU state. Disabling interrupts (directly or
//!   through an [`InterruptGuard`]) keeps the running thread on the CPU until
//!   it re-enables them or switches away.
//! - Interrupts raised while the flag is clear are latched and delivered the
//!   moment the flag is set again, on every [`cpu::relax`] and while the CPU
//!   [`cpu::halt`]s.
//!
//! **YOU ARE *NOT* SUPPOSED TO DIRECTLY USE THE MODULES OF THIS CRATE.**
//! Instead, see the `tickos` crate for the interfaces built on top of them.
//!
//! [`InterruptGuard`]: interrupt::InterruptGuard
#![allow(clippy::missing_safety_doc)]

use core::sync::atomic::AtomicBool;

#[doc(hidden)]
#[macro_use]
pub mod kprint;
#[doc(hidden)]
pub mod cpu;
#[doc(hidden)]
pub mod dev;
#[doc(hidden)]
pub mod interrupt;
#[doc(hidden)]
pub mod spinlock;
#[doc(hidden)]
pub mod x86_64;

#[cfg(doc)]
pub use spinlock::SpinLock;

/// Number of CPUs of the machine.
pub const MAX_CPU: usize = 1;

#[doc(hidden)]
pub static QUITE: AtomicBool = AtomicBool::new(false);
