//! Cooperative interval timers.
//!
//! All time-based behaviour in the stack is evaluated against a `now`
//! instant supplied by the caller of `timer_tick`, so tests and the
//! engine control the clock; a timer only stores its deadline.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct IntervalTimer {
    interval: Duration,
    fire: Option<Instant>,
}

impl IntervalTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, fire: None }
    }

    /// Build from a configured millisecond value clamped to `min_ms`;
    /// 0 keeps the timer disabled (zero interval).
    pub fn from_config(ms: u64, min_ms: u64) -> Self {
        let ms = if ms == 0 { 0 } else { ms.max(min_ms) };
        Self::new(Duration::from_millis(ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&mut self, now: Instant) {
        if self.interval > Duration::ZERO {
            self.fire = Some(now + self.interval);
        }
    }

    pub fn stop(&mut self) {
        self.fire = None;
    }

    pub fn started(&self) -> bool {
        self.fire.is_some()
    }

    /// True when the timer is running and its deadline has passed.
    pub fn timeout(&self, now: Instant) -> bool {
        matches!(self.fire, Some(fire) if now >= fire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_after_interval() {
        let now = Instant::now();
        let mut t = IntervalTimer::new(Duration::from_millis(100));
        assert!(!t.timeout(now));
        t.start(now);
        assert!(t.started());
        assert!(!t.timeout(now + Duration::from_millis(99)));
        assert!(t.timeout(now + Duration::from_millis(100)));
        t.stop();
        assert!(!t.timeout(now + Duration::from_millis(200)));
    }

    #[test]
    fn zero_interval_never_starts() {
        let now = Instant::now();
        let mut t = IntervalTimer::from_config(0, 500);
        t.start(now);
        assert!(!t.started());
        let t2 = IntervalTimer::from_config(100, 500);
        assert_eq!(t2.interval(), Duration::from_millis(500));
    }
}
