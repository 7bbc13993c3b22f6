//! # Timer Device
//!
//! Monotonic time source consumed by the dispatcher.
//!
//! ## Design Principles
//!
//! 1. **Monotonic**: ticks never go backwards
//! 2. **Non-blocking**: polling always returns immediately
//! 3. **Cumulative**: total ticks since boot
//! 4. **Rate-aware**: the device states how many ticks make a millisecond,
//!    so statistics can be reported in milliseconds whatever the tick rate

/// Hardware timer device trait
///
/// Provides access to a monotonic tick counter.
///
/// # Examples
///
/// ```
/// use hal::TimerDevice;
///
/// fn response_ms<T: TimerDevice>(timer: &mut T, released_at: u64) -> u64 {
///     timer.ms_since(released_at)
/// }
/// ```
pub trait TimerDevice {
    /// Returns the current tick count (monotonic, cumulative, non-blocking)
    fn poll_ticks(&mut self) -> u64;

    /// Number of ticks per millisecond
    ///
    /// Defaults to 1, i.e. a 1 kHz system tick.
    fn ticks_per_ms(&self) -> u64 {
        1
    }

    /// Current time in whole milliseconds
    fn now_ms(&mut self) -> u64 {
        let rate = self.ticks_per_ms().max(1);
        self.poll_ticks() / rate
    }

    /// Milliseconds elapsed since a tick stamp taken earlier
    ///
    /// Saturates at zero if `since` lies in the future.
    fn ms_since(&mut self, since: u64) -> u64 {
        let rate = self.ticks_per_ms().max(1);
        self.poll_ticks().saturating_sub(since) / rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestTimer {
        ticks: u64,
        rate: u64,
    }

    impl TestTimer {
        fn new(rate: u64) -> Self {
            Self { ticks: 0, rate }
        }

        fn advance(&mut self, delta: u64) {
            self.ticks += delta;
        }
    }

    impl TimerDevice for TestTimer {
        fn poll_ticks(&mut self) -> u64 {
            self.ticks
        }

        fn ticks_per_ms(&self) -> u64 {
            self.rate
        }
    }

    #[test]
    fn test_timer_monotonic() {
        let mut timer = TestTimer::new(1);
        let t1 = timer.poll_ticks();
        timer.advance(100);
        let t2 = timer.poll_ticks();
        timer.advance(50);
        let t3 = timer.poll_ticks();

        assert!(t2 >= t1);
        assert!(t3 >= t2);
        assert_eq!(t3 - t1, 150);
    }

    #[test]
    fn test_now_ms_uses_tick_rate() {
        let mut timer = TestTimer::new(10);
        timer.advance(255);
        assert_eq!(timer.now_ms(), 25);
    }

    #[test]
    fn test_ms_since_saturates() {
        let mut timer = TestTimer::new(1);
        timer.advance(40);
        assert_eq!(timer.ms_since(10), 30);
        assert_eq!(timer.ms_since(100), 0);
    }

    #[test]
    fn test_zero_rate_treated_as_one() {
        let mut timer = TestTimer::new(0);
        timer.advance(7);
        assert_eq!(timer.now_ms(), 7);
    }
}
