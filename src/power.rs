//! Modules for system power operations.
use crate::kernel::try_kernel;
use core::sync::atomic::Ordering;

/// Turn the machine off with `exit_code`.
///
/// Prints the timer and thread statistics first, unless the kernel is not
/// booted or is panicking.
pub fn power_off(exit_code: i32) -> ! {
    if try_kernel().is_some() && crate::PANIC_DEPTH.load(Ordering::SeqCst) == 0 {
        crate::timer::print_stats();
        crate::thread::print_stats();
    }
    println!("Powering off...");
    unsafe { abyss::x86_64::power_control::power_off(exit_code) }
}

/// Shutdown the machine.
pub fn shutdown() -> ! {
    power_off(0)
}
