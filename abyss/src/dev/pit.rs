//! 8254 Programmable interval timer.
//!
//! Counter 0 runs in mode 2 (rate generator) and raises [`Vector::Timer`]
//! every time it wraps. The counter is driven by a host thread that sleeps
//! for one period of the programmed rate.
use super::pic::{self, Vector};
use std::{
    io,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Input frequency of the 8254 chip.
pub const PIT_FREQ: u32 = 1193180;

static PERIOD_NS: AtomicU64 = AtomicU64::new(0);
static RUNNING: AtomicBool = AtomicBool::new(false);

/// Program counter 0 to interrupt `freq` times per second.
///
/// Returns the divisor loaded into the counter. Reprogramming a running
/// timer changes its rate from the next period on.
pub fn program(freq: u32) -> io::Result<u16> {
    if freq == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "zero frequency"));
    }
    // 8254 input frequency divided by `freq`, rounded to nearest.
    let count = u16::try_from((PIT_FREQ + freq / 2) / freq)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "divisor overflow"))?;
    PERIOD_NS.store(
        count as u64 * 1_000_000_000 / PIT_FREQ as u64,
        Ordering::SeqCst,
    );

    if !RUNNING.swap(true, Ordering::SeqCst)
        && let Err(e) = std::thread::Builder::new()
            .name("8254 Timer".into())
            .spawn(run)
    {
        RUNNING.store(false, Ordering::SeqCst);
        return Err(e);
    }
    Ok(count)
}

/// Stop the counter.
pub fn stop() {
    RUNNING.store(false, Ordering::SeqCst);
}

fn run() {
    let mut next = Instant::now();
    while RUNNING.load(Ordering::SeqCst) {
        next += Duration::from_nanos(PERIOD_NS.load(Ordering::SeqCst));
        match next.checked_duration_since(Instant::now()) {
            Some(delay) => std::thread::sleep(delay),
            // Fell behind the host clock. Wraps that were missed are lost the
            // same way a masked line loses them.
            None => next = Instant::now(),
        }
        pic::raise(Vector::Timer);
    }
}
