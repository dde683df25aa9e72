// This is test & bootstrap implementation.
#![allow(clippy::missing_safety_doc)]

extern crate tickos;
extern crate grading;

mod alarm;
mod donation;
mod fatal;
mod mlfqs;
mod priority;
mod semaphore;
mod sync;
mod thread;

use tickos::SystemConfigurationBuilder;

fn main() {
    tickos::rust_main(kernel_main)
}

fn kernel_main(config_builder: SystemConfigurationBuilder) {
    let mlfqs = config_builder.mlfqs();
    if let Err(e) = config_builder.boot() {
        panic!("Failed to boot the kernel: {e:?}");
    }
    if mlfqs {
        tickos::TestDriver::start_with_opt_in(
            [
                // Threads.
                &thread::exit_code,
                &thread::join,
                &thread::park,
                &thread::states,
                // Timer.
                &alarm::single,
                &alarm::multiple,
                &alarm::zero,
                &alarm::negative,
                &alarm::sub_tick,
                &alarm::far_future,
                // Semaphore.
                &semaphore::sema_0,
                &semaphore::try_down,
                // MLFQS.
                &mlfqs::set_priority_ignored,
                &mlfqs::nice,
                &mlfqs::inherit_nice,
                &mlfqs::recent_cpu,
                &mlfqs::load_avg,
                &mlfqs::fair,
            ],
            [
                &fatal::recursive_acquire,
                &fatal::release_unowned,
                &fatal::release_by_other,
                &fatal::wait_without_lock,
                &fatal::drop_waited_semaphore,
            ],
        );
    } else {
        tickos::TestDriver::start_with_opt_in(
            [
                // Threads.
                &thread::exit_code,
                &thread::join,
                &thread::park,
                &thread::states,
                // Timer.
                &alarm::single,
                &alarm::multiple,
                &alarm::simultaneous,
                &alarm::priority,
                &alarm::zero,
                &alarm::negative,
                &alarm::sub_tick,
                &alarm::sleeping_state,
                &alarm::far_future,
                // Semaphore.
                &semaphore::sema_0,
                &semaphore::sema_1,
                &semaphore::try_down,
                &semaphore::n_permits,
                &semaphore::counting,
                // Mutex and condition variable.
                &sync::mutex::smoke,
                &sync::mutex::try_lock,
                &sync::condition_variable::wait_releases_lock,
                &sync::condition_variable::bounded_buffer,
                &sync::condition_variable::broadcast,
                // Priority scheduling.
                &priority::preempt,
                &priority::change,
                &priority::fifo,
                &priority::sema,
                &priority::condvar,
                // Priority donation.
                &donation::donate_one,
                &donation::donate_multiple,
                &donation::donate_nest,
                &donation::donate_chain,
                &donation::donate_lower,
                &donation::try_acquire,
                &donation::release_under_ticks,
            ],
            [
                &fatal::recursive_acquire,
                &fatal::release_unowned,
                &fatal::release_by_other,
                &fatal::wait_without_lock,
                &fatal::drop_waited_semaphore,
            ],
        );
    }
}
