//! System Power RAW Operation.

use crate::x86_64::Rflags;
use std::io::Write;

/// `machine_power_off()` is emergency shutdown function since it lacks
/// any synchorization technique.
///
/// This function flushes the console and turns the machine off with
/// `exit_code` as the status reported to whoever launched it. Every other
/// execution context of the machine stops with it.
///
/// It's intended to be run at the end of safe shutdown or emergency
/// situation.
pub unsafe fn power_off(exit_code: i32) -> ! {
    // Make sure that External Interrupt is disabled before we do the actual
    // operation, regardless of actual CPU state.
    unsafe {
        Rflags::clear_if();
    }
    crate::dev::pit::stop();
    let _ = std::io::stdout().flush();
    std::process::exit(exit_code)
}
