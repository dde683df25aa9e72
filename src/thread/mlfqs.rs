//! Multi-level feedback queue scheduler.
//!
//! The MLFQS does not take priorities from its threads. It computes them
//! from how much cpu time each thread received recently and how `nice` the
//! thread is, so that cpu-bound threads sink and interactive threads float.
//!
//! Every tick the running thread accumulates one unit of `recent_cpu`. Once
//! per second, that is when the tick count is a multiple of the timer
//! frequency, the scheduler updates:
//!
//! ```text
//! load_avg   = (59/60) * load_avg + (1/60) * ready_threads
//! recent_cpu = (2 * load_avg) / (2 * load_avg + 1) * recent_cpu + nice
//! priority   = PRI_MAX - recent_cpu / 4 - nice * 2
//! ```
//!
//! in this order, for every thread but the idle thread. `ready_threads`
//! counts the queued threads plus the running one.
use super::{
    PRI_MAX, PRI_MIN,
    fixed_point::FixedPoint,
    scheduler::{RunQueue, Scheduler, Threads, TickInfo},
};

/// Priority of a thread with `recent_cpu` and `nice`.
pub fn priority(recent_cpu: FixedPoint, nice: i32) -> i32 {
    (FixedPoint::from_int(PRI_MAX) - recent_cpu / 4 - FixedPoint::from_int(nice * 2))
        .trunc()
        .clamp(PRI_MIN, PRI_MAX)
}

/// Decay `recent_cpu` by the system load.
pub fn decay_recent_cpu(recent_cpu: FixedPoint, load_avg: FixedPoint, nice: i32) -> FixedPoint {
    let twice_load = load_avg * 2;
    twice_load / (twice_load + 1) * recent_cpu + nice
}

/// The next load average.
pub fn next_load_avg(load_avg: FixedPoint, ready_threads: usize) -> FixedPoint {
    FixedPoint::from_int(59) / 60 * load_avg + FixedPoint::from_int(ready_threads as i32) / 60
}

/// The MLFQS scheduler.
#[derive(Default)]
pub struct Mlfqs {
    queue: RunQueue,
    load_avg: FixedPoint,
}

impl Mlfqs {
    /// Create a new MLFQS scheduler.
    pub const fn new() -> Self {
        Self {
            queue: RunQueue::new(),
            load_avg: FixedPoint::ZERO,
        }
    }

    fn recompute(&mut self, threads: &mut Threads, tick: TickInfo) {
        let running = usize::from(tick.current != tick.idle);
        self.load_avg = next_load_avg(self.load_avg, self.ready_threads() + running);

        let load_avg = self.load_avg;
        for th in threads.values_mut().filter(|th| th.tid != tick.idle) {
            th.recent_cpu = decay_recent_cpu(th.recent_cpu, load_avg, th.nice);
        }
        for th in threads.values_mut().filter(|th| th.tid != tick.idle) {
            th.base_priority = priority(th.recent_cpu, th.nice);
            th.priority = th.base_priority;
        }
    }
}

impl Scheduler for Mlfqs {
    fn next_to_run(&mut self, threads: &Threads) -> Option<u64> {
        self.queue.pop(threads)
    }

    fn push_to_queue(&mut self, tid: u64) {
        self.queue.push(tid);
    }

    fn highest_priority(&self, threads: &Threads) -> Option<i32> {
        self.queue.highest_priority(threads)
    }

    fn ready_threads(&self) -> usize {
        self.queue.len()
    }

    fn timer_tick(&mut self, threads: &mut Threads, tick: TickInfo) {
        if tick.current != tick.idle
            && let Some(th) = threads.get_mut(&tick.current)
        {
            th.recent_cpu += 1;
        }
        if tick.ticks % tick.freq as i64 == 0 {
            self.recompute(threads, tick);
        }
    }

    fn load_avg(&self) -> FixedPoint {
        self.load_avg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{PRI_DEFAULT, Thread};

    #[test]
    fn priority_formula() {
        assert_eq!(priority(FixedPoint::ZERO, 0), PRI_MAX);
        assert_eq!(priority(FixedPoint::from_int(8), 0), PRI_MAX - 2);
        assert_eq!(priority(FixedPoint::from_int(6), 0), PRI_MAX - 1);
        assert_eq!(priority(FixedPoint::ZERO, 5), PRI_MAX - 10);
        assert_eq!(priority(FixedPoint::from_int(400), 20), PRI_MIN);
        assert_eq!(priority(FixedPoint::ZERO, -20), PRI_MAX);
    }

    #[test]
    fn load_avg_converges_to_ready_threads() {
        let mut load_avg = FixedPoint::ZERO;
        load_avg = next_load_avg(load_avg, 1);
        assert_eq!((load_avg * 100).round(), 2);
        for _ in 0..600 {
            load_avg = next_load_avg(load_avg, 2);
        }
        assert_eq!(load_avg.round(), 2);
    }

    #[test]
    fn recent_cpu_decays_without_load() {
        let recent_cpu = FixedPoint::from_int(100);
        assert_eq!(decay_recent_cpu(recent_cpu, FixedPoint::ZERO, 0), FixedPoint::ZERO);
        assert_eq!(decay_recent_cpu(recent_cpu, FixedPoint::ZERO, 3).trunc(), 3);
        // load_avg = 1: 2/3 of the previous value.
        let decayed = decay_recent_cpu(recent_cpu, FixedPoint::from_int(1), 0);
        assert_eq!(decayed.round(), 67);
    }

    #[test]
    fn recompute_once_per_second() {
        let mut threads = Threads::new();
        for tid in [1, 2] {
            threads.insert(
                tid,
                Thread::new(
                    tid,
                    format!("t{tid}"),
                    PRI_DEFAULT,
                    abyss::cpu::bootstrap(tid),
                    None,
                ),
            );
        }
        let mut mlfqs = Mlfqs::new();
        let freq = 100;
        for ticks in 1..freq as i64 {
            mlfqs.timer_tick(
                &mut threads,
                TickInfo {
                    ticks,
                    freq,
                    current: 1,
                    idle: 2,
                },
            );
        }
        assert_eq!(threads[&1].recent_cpu, FixedPoint::from_int(99));
        assert_eq!(threads[&2].recent_cpu, FixedPoint::ZERO);
        assert_eq!(mlfqs.load_avg(), FixedPoint::ZERO);
        // Priorities are untouched until the second boundary.
        assert_eq!(threads[&1].priority, PRI_DEFAULT);

        mlfqs.timer_tick(
            &mut threads,
            TickInfo {
                ticks: freq as i64,
                freq,
                current: 1,
                idle: 2,
            },
        );
        assert_eq!(mlfqs.load_avg(), FixedPoint::from_int(1) / 60);
        assert_ne!(threads[&1].priority, PRI_DEFAULT);
        // The idle thread is never recomputed.
        assert_eq!(threads[&2].priority, PRI_DEFAULT);
    }
}
