//! Token-bucket byte throttling.
//!
//! Grounded on `examples/original_source/include/Throttler.h` and
//! `src/Throttler.cc`: quota recovers linearly towards `capacity` at rate
//! `capacity / interval`, and `consume` is permitted to overshoot a
//! near-empty bucket rather than erroring.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct State {
    capacity: usize,
    interval: Duration,
    quota: usize,
    last_update: Instant,
}

/// A token bucket over bytes. `Throttler::disabled` produces a throttler
/// that always reports `usize::MAX` quota and a `fill_time` of now, matching
/// the source's disabled-throttler convention.
#[derive(Debug)]
pub struct Throttler {
    state: Mutex<State>,
}

impl Throttler {
    /// A throttler with `capacity` bytes refilling every `interval`.
    pub fn new(capacity: usize, interval: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                capacity,
                interval,
                quota: capacity,
                last_update: Instant::now(),
            }),
        }
    }

    /// A throttler that never limits anything.
    pub fn disabled() -> Self {
        Self::new(usize::MAX, Duration::from_secs(1))
    }

    /// Whether this throttler actually limits consumption.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().capacity != usize::MAX
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().unwrap().capacity
    }

    /// Replaces this throttler's capacity and refill interval, resetting
    /// its quota back to full. Used by the orchestrator's
    /// `set_read_throttle`/`set_write_throttle` to reconfigure the shared
    /// master throttlers at runtime (spec.md §4.F `ThrottleRead`/
    /// `ThrottleWrite`).
    pub fn reconfigure(&self, capacity: usize, interval: Duration) {
        let mut state = self.state.lock().unwrap();
        state.capacity = capacity;
        state.interval = interval;
        state.quota = capacity;
        state.last_update = Instant::now();
    }

    /// Recomputes and returns the current quota, without consuming any of it.
    pub fn current_quota(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        if state.capacity == usize::MAX {
            return usize::MAX;
        }
        Self::refresh(&mut state);
        state.quota
    }

    /// The earliest instant at which `current_quota() >= target` will hold,
    /// clamped to `capacity`. Disabled throttlers report `Instant::now()`.
    pub fn fill_time(&self, target: usize) -> Instant {
        let mut state = self.state.lock().unwrap();
        if state.capacity == usize::MAX {
            return Instant::now();
        }
        let target = target.min(state.capacity);
        Self::refresh(&mut state);
        if state.quota >= target {
            return Instant::now();
        }
        let missing = target - state.quota;
        let nanos = (missing as u128 * state.interval.as_nanos()) / state.capacity as u128;
        state.last_update + Duration::from_nanos(nanos as u64)
    }

    /// Recomputes quota, subtracts `n` (saturating at zero), and resets the
    /// last-consumption time point. `n` may exceed the remaining quota.
    pub fn consume(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        if state.capacity == usize::MAX {
            return;
        }
        Self::refresh(&mut state);
        state.quota = state.quota.saturating_sub(n);
        state.last_update = Instant::now();
    }

    fn refresh(state: &mut State) {
        let elapsed = state.last_update.elapsed();
        let recovered = (elapsed.as_nanos() * state.capacity as u128) / state.interval.as_nanos();
        state.quota = state.capacity.min(state.quota.saturating_add(recovered as usize));
        state.last_update = Instant::now();
    }
}

/// A channel's pair of throttlers for one direction (read or write): a
/// dedicated, per-channel bucket and a shared, server-wide master bucket.
/// The effective quota/fill-time is always the minimum of the two.
#[derive(Debug)]
pub struct ThrottlerGroup {
    pub dedicated: Throttler,
    pub master: std::sync::Arc<Throttler>,
}

impl ThrottlerGroup {
    pub fn new(dedicated: Throttler, master: std::sync::Arc<Throttler>) -> Self {
        Self { dedicated, master }
    }

    /// `min(dedicated.quota, master.quota)`.
    pub fn effective_quota(&self) -> usize {
        self.dedicated.current_quota().min(self.master.current_quota())
    }

    /// `min(dedicated.capacity, master.capacity)`.
    pub fn effective_capacity(&self) -> usize {
        self.dedicated.capacity().min(self.master.capacity())
    }

    /// The later of the two fill times for `target`, matching the source's
    /// `max(dedicated.GetFillTimePoint(target), master.GetFillTimePoint(target))`.
    pub fn fill_time(&self, target: usize) -> Instant {
        self.dedicated.fill_time(target).max(self.master.fill_time(target))
    }

    /// Consumes `n` bytes from both the dedicated and master buckets.
    pub fn consume(&self, n: usize) {
        self.dedicated.consume(n);
        self.master.consume(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_throttler_never_limits() {
        let t = Throttler::disabled();
        assert_eq!(t.current_quota(), usize::MAX);
        t.consume(1_000_000);
        assert_eq!(t.current_quota(), usize::MAX);
    }

    #[test]
    fn consume_saturates_at_zero() {
        let t = Throttler::new(100, Duration::from_secs(10));
        t.consume(1_000);
        assert_eq!(t.current_quota(), 0);
    }

    #[test]
    fn quota_refills_towards_capacity() {
        let t = Throttler::new(1000, Duration::from_millis(100));
        t.consume(1000);
        assert_eq!(t.current_quota(), 0);
        std::thread::sleep(Duration::from_millis(60));
        let q = t.current_quota();
        assert!(q > 0 && q < 1000, "quota should have partially refilled, got {q}");
    }

    #[test]
    fn fill_time_for_already_available_target_is_now() {
        let t = Throttler::new(100, Duration::from_secs(1));
        let now = Instant::now();
        assert!(t.fill_time(50) <= now + Duration::from_millis(1));
    }

    #[test]
    fn group_effective_quota_is_the_minimum() {
        let master = std::sync::Arc::new(Throttler::new(10, Duration::from_secs(1)));
        let dedicated = Throttler::new(1000, Duration::from_secs(1));
        let group = ThrottlerGroup::new(dedicated, master.clone());
        assert_eq!(group.effective_quota(), 10);
        master.consume(10);
        assert_eq!(group.effective_quota(), 0);
    }
}
