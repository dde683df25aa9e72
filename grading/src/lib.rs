//! Helpers for writing kernel test cases.
//!
//! The attribute macros re-exported here wrap the body of a test function:
//!
//! - `#[assert_exit_code(N)]`: runs the body in a new thread named after the
//!   test and asserts that the thread exits with `N`.
//! - `#[priority(N)]`: runs the body in a new thread of priority `N` and
//!   asserts that it exits normally.
//! - `#[timeout_ticks(N)]`: asserts that the body finishes within `N` timer
//!   ticks.
extern crate grading_derive;

pub use grading_derive::*;

/// Spin until the timer advances by `ticks` ticks, without sleeping.
///
/// The running thread stays ready all along, so it can be preempted.
pub fn spin_for(ticks: i64) {
    let start = tickos::timer::ticks();
    while tickos::timer::elapsed(start) < ticks {
        core::hint::spin_loop();
    }
}
