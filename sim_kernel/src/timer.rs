//! # Simulated Timer Device
//!
//! Deterministic tick source for the simulated dispatcher.
//!
//! Time only moves when the dispatcher advances it, one step at a time, so
//! the same workload always produces the same schedule.

use hal::TimerDevice;

/// Simulated 1 kHz timer device
///
/// One tick is one millisecond, so the [`TimerDevice`] conversions are
/// the identity and durations recorded by the dispatcher are already in
/// milliseconds.
///
/// # Examples
///
/// ```
/// use sim_kernel::timer::SimTimerDevice;
/// use hal::TimerDevice;
///
/// let mut timer = SimTimerDevice::new();
/// timer.advance_ticks(250);
/// assert_eq!(timer.poll_ticks(), 250);
/// assert_eq!(timer.now_ms(), 250);
/// assert_eq!(timer.ms_since(50), 200);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimTimerDevice {
    ticks: u64,
}

impl SimTimerDevice {
    /// A timer starting at tick 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the timer; saturates at `u64::MAX`
    pub fn advance_ticks(&mut self, delta: u64) {
        self.ticks = self.ticks.saturating_add(delta);
    }

    /// Current tick count without `&mut` access
    pub fn current_ticks(&self) -> u64 {
        self.ticks
    }
}

impl TimerDevice for SimTimerDevice {
    fn poll_ticks(&mut self) -> u64 {
        self.ticks
    }
}
