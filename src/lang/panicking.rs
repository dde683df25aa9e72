//! tickos panic handler.
//!
//! A panic in the kernel is fatal. The handler reports the panicking thread,
//! the message and a backtrace on the console, then powers the machine off.
use abyss::interrupt::InterruptGuard;
use core::mem::ManuallyDrop;
use core::sync::atomic::Ordering;
use std::backtrace::Backtrace;

/// Exit code of the machine after a kernel panic.
pub const PANIC_EXIT_CODE: i32 = 101;

/// Install the kernel panic handler.
pub fn install() {
    std::panic::set_hook(Box::new(panic));
}

#[inline(never)]
fn panic(info: &std::panic::PanicHookInfo<'_>) {
    // Disabling preempt before we go on.
    let _cli = ManuallyDrop::new(InterruptGuard::new());

    match crate::PANIC_DEPTH.fetch_add(1, Ordering::SeqCst) {
        0 => {}
        1 => {
            unsafe {
                abyss::kprint::force_unlock_serial();
            }
            println!("*** PANIC recursed: Forcing the shutdown ***");
            println!("{}", info);
            unsafe {
                abyss::x86_64::power_control::power_off(PANIC_EXIT_CODE);
            }
        }
        _ => unsafe {
            abyss::x86_64::power_control::power_off(PANIC_EXIT_CODE);
        },
    }
    // Forcefully remove kprint serial lock to prevent deadlock.
    //
    // # Safety
    // NEVER use print!() or println!() before force serial unlock
    unsafe {
        abyss::kprint::force_unlock_serial();
    }

    // The scheduler lock may be held by the panicking thread; only the host
    // thread knows who it is.
    let name = std::thread::current()
        .name()
        .unwrap_or("<unknown>")
        .to_string();
    match abyss::cpu::context_id() {
        Some(tid) => println!("\n\ntickos thread '{name}' [tid #{tid}] {info}\n"),
        None => println!("\n\ntickos thread '{name}' [tid #?] {info}\n"),
    }

    println!("Stack Backtrace: ");
    println!("{}", Backtrace::force_capture());
    println!("\nShutting down the system in few moment...");
    crate::power::power_off(PANIC_EXIT_CODE)
}
