use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep, so a shutdown request is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// What the loop should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The next deadline is this far away.
    Sleep(Duration),
    /// The deadline already passed by this much; run again immediately.
    Overrun(Duration),
}

/// Fixed-cadence deadline grid: `start + k * interval`.
///
/// Deadlines stay on the grid regardless of how long cycles take, so a slow
/// cycle does not shift every later one.
#[derive(Debug, Clone)]
pub struct Schedule {
    interval: Duration,
    next: Instant,
}

impl Schedule {
    pub fn new(interval: Duration, start: Instant) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self {
            interval,
            next: start + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The deadline the next `tick` will be measured against.
    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Compare `now` with the current deadline and move to the next one.
    ///
    /// After an overrun the deadline jumps to the first grid slot after
    /// `now`; missed slots are not replayed.
    pub fn tick(&mut self, now: Instant) -> Tick {
        if now < self.next {
            let remaining = self.next - now;
            self.next += self.interval;
            return Tick::Sleep(remaining);
        }

        let late = now - self.next;
        let interval = self.interval.as_nanos();
        let steps = late.as_nanos() / interval + 1;
        let skip = steps.saturating_mul(interval).min(u64::MAX as u128) as u64;
        self.next += Duration::from_nanos(skip);
        Tick::Overrun(late)
    }
}

/// Sleep until `deadline`, resuming after early wakeups.
///
/// Returns `false` if `shutdown` was raised before the deadline.
pub fn sleep_until(deadline: Instant, shutdown: &AtomicBool) -> bool {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn ut_first_deadline_one_interval_out() {
        let t0 = Instant::now();
        let s = Schedule::new(SEC, t0);
        assert_eq!(s.deadline(), t0 + SEC);
    }

    #[test]
    fn ut_tick_on_time_sleeps_remaining() {
        let t0 = Instant::now();
        let mut s = Schedule::new(SEC, t0);
        assert_eq!(s.tick(t0 + Duration::from_millis(300)), Tick::Sleep(Duration::from_millis(700)));
        assert_eq!(s.deadline(), t0 + 2 * SEC);
    }

    #[test]
    fn ut_tick_stays_on_grid() {
        let t0 = Instant::now();
        let mut s = Schedule::new(SEC, t0);
        // Cycles of varying length never shift the grid.
        s.tick(t0 + Duration::from_millis(900));
        s.tick(t0 + Duration::from_millis(1100));
        assert_eq!(s.tick(t0 + Duration::from_millis(2500)), Tick::Sleep(Duration::from_millis(500)));
        assert_eq!(s.deadline(), t0 + 4 * SEC);
    }

    #[test]
    fn ut_tick_overrun_reports_lateness() {
        let t0 = Instant::now();
        let mut s = Schedule::new(SEC, t0);
        assert_eq!(s.tick(t0 + Duration::from_millis(1250)), Tick::Overrun(Duration::from_millis(250)));
        assert_eq!(s.deadline(), t0 + 2 * SEC);
    }

    #[test]
    fn ut_tick_overrun_skips_missed_slots() {
        let t0 = Instant::now();
        let mut s = Schedule::new(SEC, t0);
        assert_eq!(s.tick(t0 + Duration::from_millis(4500)), Tick::Overrun(Duration::from_millis(3500)));
        assert_eq!(s.deadline(), t0 + 5 * SEC);
    }

    #[test]
    fn ut_tick_exactly_on_deadline_is_overrun_by_zero() {
        let t0 = Instant::now();
        let mut s = Schedule::new(SEC, t0);
        assert_eq!(s.tick(t0 + SEC), Tick::Overrun(Duration::ZERO));
        assert_eq!(s.deadline(), t0 + 2 * SEC);
    }

    #[test]
    fn ut_zero_interval_clamped() {
        let s = Schedule::new(Duration::ZERO, Instant::now());
        assert_eq!(s.interval(), Duration::from_millis(1));
    }

    #[test]
    fn ut_sleep_until_reaches_deadline() {
        let flag = AtomicBool::new(false);
        let deadline = Instant::now() + Duration::from_millis(30);
        assert!(sleep_until(deadline, &flag));
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn ut_sleep_until_past_deadline_returns_immediately() {
        let flag = AtomicBool::new(false);
        assert!(sleep_until(Instant::now(), &flag));
    }

    #[test]
    fn ut_sleep_until_honours_shutdown() {
        let flag = AtomicBool::new(true);
        let deadline = Instant::now() + Duration::from_secs(60);
        assert!(!sleep_until(deadline, &flag));
    }
}
