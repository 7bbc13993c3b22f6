//! Per-thread real-time statistics
//!
//! Counters and running sums only: no raw samples are kept. Mean, variance,
//! standard deviation and jitter are derived from the sums when asked for.
//!
//! Each thread slot has its own spin lock, separate from the dispatch lock,
//! so recording a completion never lengthens a dispatch decision and two
//! `record_*` calls on the same thread never lose an update.

use crate::config::StatsConfig;
use crate::error::SchedError;
use core_types::ThreadId;
use serde::{Deserialize, Serialize};
use spin::Mutex;

/// Sums of squared samples, for streaming variance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareSums {
    pub response: u128,
    pub waiting: u128,
}

/// Timestamps of the most recent events
///
/// Each is the `now` the dispatcher passed with the event, in its clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTimestamps {
    pub last_activation: Option<u64>,
    pub last_ready: Option<u64>,
    pub last_start: Option<u64>,
    pub last_completion: Option<u64>,
}

/// Statistics of one thread
///
/// `None` in a min/max field means no sample has been recorded since the
/// last reset. Durations are in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtStats {
    pub activations: u32,
    pub completions: u32,
    pub preemptions: u32,
    pub context_switches: u32,
    pub deadline_misses: u32,
    pub priority_inversions: u32,

    pub total_response_time: u64,
    pub total_waiting_time: u64,
    pub total_exec_time: u64,

    pub min_response_time: Option<u64>,
    pub max_response_time: Option<u64>,
    pub min_waiting_time: Option<u64>,
    pub max_waiting_time: Option<u64>,

    /// Present when [`StatsConfig::squared`] is set
    pub squares: Option<SquareSums>,
    /// Present when [`StatsConfig::detailed`] is set
    pub timestamps: Option<EventTimestamps>,
}

/// Variance of `n` samples from their sum and sum of squares
///
/// Variance is `(n·Σx² − (Σx)²) / n²`, evaluated in exact integers before
/// the single division. `None` once either sum has saturated, since the
/// sums no longer describe the samples.
fn variance(n: u32, sum: u64, sum_sq: u128) -> Option<f64> {
    if n == 0 || sum == u64::MAX || sum_sq == u128::MAX {
        return None;
    }
    let n = n as u128;
    let sum = sum as u128;
    let spread = n.checked_mul(sum_sq)?.checked_sub(sum.checked_mul(sum)?)?;
    Some((spread as f64 / (n * n) as f64).max(0.0))
}

impl RtStats {
    fn empty(config: StatsConfig) -> Self {
        Self {
            squares: config.squared.then(SquareSums::default),
            timestamps: config.detailed.then(EventTimestamps::default),
            ..Self::default()
        }
    }

    /// Mean response time over completed jobs
    pub fn avg_response(&self) -> Option<f64> {
        (self.completions > 0)
            .then(|| self.total_response_time as f64 / self.completions as f64)
    }

    /// Mean waiting time over completed jobs
    pub fn avg_waiting(&self) -> Option<f64> {
        (self.completions > 0).then(|| self.total_waiting_time as f64 / self.completions as f64)
    }

    /// Mean execution time per activation
    pub fn avg_exec(&self) -> Option<f64> {
        (self.activations > 0).then(|| self.total_exec_time as f64 / self.activations as f64)
    }

    /// Population variance of response time
    ///
    /// `None` without samples, without squared sums, or once the sums have
    /// saturated.
    pub fn response_variance(&self) -> Option<f64> {
        let squares = self.squares?;
        variance(self.completions, self.total_response_time, squares.response)
    }

    /// Population variance of waiting time
    pub fn waiting_variance(&self) -> Option<f64> {
        let squares = self.squares?;
        variance(self.completions, self.total_waiting_time, squares.waiting)
    }

    pub fn response_stddev(&self) -> Option<f64> {
        self.response_variance().map(f64::sqrt)
    }

    pub fn waiting_stddev(&self) -> Option<f64> {
        self.waiting_variance().map(f64::sqrt)
    }

    /// Max minus min response time
    pub fn response_jitter(&self) -> Option<u64> {
        Some(self.max_response_time? - self.min_response_time?)
    }

    /// Max minus min waiting time
    pub fn waiting_jitter(&self) -> Option<u64> {
        Some(self.max_waiting_time? - self.min_waiting_time?)
    }

    /// Deadline misses as a percentage of activations
    pub fn miss_rate_percent(&self) -> f64 {
        if self.activations == 0 {
            0.0
        } else {
            100.0 * self.deadline_misses as f64 / self.activations as f64
        }
    }

    /// All derived metrics at once
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            activations: self.activations,
            completions: self.completions,
            deadline_misses: self.deadline_misses,
            miss_rate_percent: self.miss_rate_percent(),
            avg_response: self.avg_response(),
            response_stddev: self.response_stddev(),
            response_jitter: self.response_jitter(),
            avg_waiting: self.avg_waiting(),
            waiting_stddev: self.waiting_stddev(),
            waiting_jitter: self.waiting_jitter(),
            avg_exec: self.avg_exec(),
        }
    }

    fn stamp(&mut self, f: impl FnOnce(&mut EventTimestamps)) {
        if let Some(timestamps) = self.timestamps.as_mut() {
            f(timestamps);
        }
    }

    fn record_completion(&mut self, response: u64, waiting: u64) {
        self.completions = self.completions.saturating_add(1);
        self.total_response_time = self.total_response_time.saturating_add(response);
        self.total_waiting_time = self.total_waiting_time.saturating_add(waiting);

        self.min_response_time = Some(self.min_response_time.map_or(response, |m| m.min(response)));
        self.max_response_time = Some(self.max_response_time.map_or(response, |m| m.max(response)));
        self.min_waiting_time = Some(self.min_waiting_time.map_or(waiting, |m| m.min(waiting)));
        self.max_waiting_time = Some(self.max_waiting_time.map_or(waiting, |m| m.max(waiting)));

        if let Some(squares) = self.squares.as_mut() {
            squares.response = squares.response.saturating_add(response as u128 * response as u128);
            squares.waiting = squares.waiting.saturating_add(waiting as u128 * waiting as u128);
        }
    }
}

/// Derived metrics computed from one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub activations: u32,
    pub completions: u32,
    pub deadline_misses: u32,
    pub miss_rate_percent: f64,
    pub avg_response: Option<f64>,
    pub response_stddev: Option<f64>,
    pub response_jitter: Option<u64>,
    pub avg_waiting: Option<f64>,
    pub waiting_stddev: Option<f64>,
    pub waiting_jitter: Option<u64>,
    pub avg_exec: Option<f64>,
}

/// Counters summed over every live thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemTotals {
    pub threads: u32,
    pub activations: u64,
    pub completions: u64,
    pub deadline_misses: u64,
    pub preemptions: u64,
    pub context_switches: u64,
    pub priority_inversions: u64,
    pub total_response_time: u64,
    pub total_exec_time: u64,
}

impl SystemTotals {
    /// System-wide misses as a percentage of activations
    pub fn miss_rate_percent(&self) -> f64 {
        if self.activations == 0 {
            0.0
        } else {
            100.0 * self.deadline_misses as f64 / self.activations as f64
        }
    }
}

#[derive(Debug)]
struct StatsSlot {
    generation: u32,
    live: bool,
    stats: RtStats,
}

/// Statistics domain: one lock per thread slot
pub struct StatsEngine {
    config: StatsConfig,
    slots: Box<[Mutex<StatsSlot>]>,
}

impl StatsEngine {
    /// Pre-allocates records for `capacity` thread slots
    pub fn new(capacity: usize, config: StatsConfig) -> Self {
        let slots: Vec<Mutex<StatsSlot>> = (0..capacity)
            .map(|_| {
                Mutex::new(StatsSlot {
                    generation: 0,
                    live: false,
                    stats: RtStats::empty(config),
                })
            })
            .collect();
        Self {
            config,
            slots: slots.into_boxed_slice(),
        }
    }

    pub fn config(&self) -> StatsConfig {
        self.config
    }

    /// Starts tracking a freshly spawned thread with zeroed statistics
    pub fn attach(&self, id: ThreadId) -> Result<(), SchedError> {
        let cell = self
            .slots
            .get(id.slot())
            .ok_or(SchedError::InvalidThread(id.into()))?;
        let mut slot = cell.lock();
        slot.generation = id.generation();
        slot.live = true;
        slot.stats = RtStats::empty(self.config);
        Ok(())
    }

    /// Stops tracking an exited thread, returning its final statistics
    pub fn detach(&self, id: ThreadId) -> Result<RtStats, SchedError> {
        self.with(id, |slot| {
            slot.live = false;
            slot.stats
        })
    }

    fn with<R>(&self, id: ThreadId, f: impl FnOnce(&mut StatsSlot) -> R) -> Result<R, SchedError> {
        let cell = self
            .slots
            .get(id.slot())
            .ok_or(SchedError::InvalidThread(id.into()))?;
        let mut slot = cell.lock();
        if !slot.live || slot.generation != id.generation() {
            return Err(SchedError::InvalidThread(id.into()));
        }
        Ok(f(&mut slot))
    }

    fn update(&self, id: ThreadId, f: impl FnOnce(&mut RtStats)) -> Result<(), SchedError> {
        self.with(id, |slot| f(&mut slot.stats))
    }

    /// A job was activated (new period or sporadic arrival)
    pub fn record_activation(&self, id: ThreadId, now: u64) -> Result<(), SchedError> {
        self.update(id, |stats| {
            stats.activations = stats.activations.saturating_add(1);
            stats.stamp(|t| t.last_activation = Some(now));
        })
    }

    /// The thread entered the ready set
    pub fn record_ready(&self, id: ThreadId, now: u64) -> Result<(), SchedError> {
        self.update(id, |stats| stats.stamp(|t| t.last_ready = Some(now)))
    }

    /// The thread started executing
    pub fn record_start(&self, id: ThreadId, now: u64) -> Result<(), SchedError> {
        self.update(id, |stats| stats.stamp(|t| t.last_start = Some(now)))
    }

    /// A job completed
    pub fn record_completion(&self, id: ThreadId, response_ms: u64, waiting_ms: u64) -> Result<(), SchedError> {
        self.update(id, |stats| stats.record_completion(response_ms, waiting_ms))
    }

    /// A job completed at `now`
    pub fn record_completion_at(
        &self,
        id: ThreadId,
        response_ms: u64,
        waiting_ms: u64,
        now: u64,
    ) -> Result<(), SchedError> {
        self.update(id, |stats| {
            stats.record_completion(response_ms, waiting_ms);
            stats.stamp(|t| t.last_completion = Some(now));
        })
    }

    /// CPU time consumed
    pub fn record_execution(&self, id: ThreadId, elapsed_ms: u64) -> Result<(), SchedError> {
        self.update(id, |stats| {
            stats.total_exec_time = stats.total_exec_time.saturating_add(elapsed_ms)
        })
    }

    pub fn record_deadline_miss(&self, id: ThreadId) -> Result<(), SchedError> {
        self.update(id, |stats| stats.deadline_misses = stats.deadline_misses.saturating_add(1))
    }

    pub fn record_preemption(&self, id: ThreadId) -> Result<(), SchedError> {
        self.update(id, |stats| stats.preemptions = stats.preemptions.saturating_add(1))
    }

    pub fn record_context_switch(&self, id: ThreadId) -> Result<(), SchedError> {
        self.update(id, |stats| {
            stats.context_switches = stats.context_switches.saturating_add(1)
        })
    }

    pub fn record_priority_inversion(&self, id: ThreadId) -> Result<(), SchedError> {
        self.update(id, |stats| {
            stats.priority_inversions = stats.priority_inversions.saturating_add(1)
        })
    }

    /// Zeroes every counter and sum and clears min/max
    pub fn reset(&self, id: ThreadId) -> Result<(), SchedError> {
        let config = self.config;
        self.update(id, |stats| *stats = RtStats::empty(config))
    }

    /// Consistent copy of a thread's statistics
    pub fn snapshot(&self, id: ThreadId) -> Result<RtStats, SchedError> {
        self.with(id, |slot| slot.stats)
    }

    /// Sums counters over every live thread
    ///
    /// Each slot is read under its own lock, one at a time; the result is
    /// consistent per thread, not across threads.
    pub fn system_totals(&self) -> SystemTotals {
        let mut totals = SystemTotals::default();
        for cell in self.slots.iter() {
            let slot = cell.lock();
            if !slot.live {
                continue;
            }
            let s = &slot.stats;
            totals.threads += 1;
            totals.activations += s.activations as u64;
            totals.completions += s.completions as u64;
            totals.deadline_misses += s.deadline_misses as u64;
            totals.preemptions += s.preemptions as u64;
            totals.context_switches += s.context_switches as u64;
            totals.priority_inversions += s.priority_inversions as u64;
            totals.total_response_time += s.total_response_time;
            totals.total_exec_time += s.total_exec_time;
        }
        totals
    }
}
