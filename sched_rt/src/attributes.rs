//! Per-thread scheduling attributes
//!
//! Plain data: the [`Scheduler`](crate::Scheduler) owns one `SchedAttrs` per
//! thread slot and is the only thing that mutates them, always under the
//! dispatch lock and always followed by a rekey of the thread's ready entry.

use serde::{Deserialize, Deserializer, Serialize};
use std::num::NonZeroU32;

/// Weight used when a caller supplies zero
pub const DEFAULT_WEIGHT: NonZeroU32 = NonZeroU32::MIN;

/// Normalises a raw weight. Zero becomes 1; weights are divisors downstream.
pub fn normalize_weight(weight: u32) -> NonZeroU32 {
    match NonZeroU32::new(weight) {
        Some(w) => w,
        None => {
            log::trace!("weight 0 normalised to {}", DEFAULT_WEIGHT);
            DEFAULT_WEIGHT
        }
    }
}

fn deserialize_weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NonZeroU32, D::Error> {
    u32::deserialize(deserializer).map(normalize_weight)
}

/// Scheduling attributes of one thread
///
/// All times are in dispatcher ticks. `deadline` is absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedAttrs {
    /// Absolute deadline of the current job
    pub deadline: u64,
    /// Importance weight, never zero; a serialized 0 reads back as 1
    #[serde(deserialize_with = "deserialize_weight")]
    pub weight: NonZeroU32,
    /// Expected execution time of one job
    pub exec_time: u64,
    /// Execution budget left in the current job
    pub time_left: u64,
    /// Execution time accumulated over the thread's lifetime
    pub runtime: u64,
}

impl SchedAttrs {
    /// Attributes for a job of `exec_time` ticks due at absolute `deadline`
    pub fn new(deadline: u64, weight: u32, exec_time: u64) -> Self {
        Self {
            deadline,
            weight: normalize_weight(weight),
            exec_time,
            time_left: exec_time,
            runtime: 0,
        }
    }

    /// Builder-style weight override
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = normalize_weight(weight);
        self
    }

    /// Builder-style remaining-time override
    pub fn with_time_left(mut self, time_left: u64) -> Self {
        self.time_left = time_left;
        self
    }

    /// Builder-style accumulated runtime override
    pub fn with_runtime(mut self, runtime: u64) -> Self {
        self.runtime = runtime;
        self
    }

    /// Installs a new absolute deadline and starts a fresh job budget
    ///
    /// Deadlines never move backwards; an earlier value is clamped to the
    /// stored one. Returns the deadline actually stored.
    pub(crate) fn start_job(&mut self, deadline: u64) -> u64 {
        if deadline < self.deadline {
            log::warn!(
                "deadline {} earlier than current {}, keeping current",
                deadline,
                self.deadline
            );
        } else {
            self.deadline = deadline;
        }
        self.time_left = self.exec_time;
        self.deadline
    }

    /// Consumes `elapsed` ticks of CPU
    pub(crate) fn consume(&mut self, elapsed: u64) {
        self.time_left = self.time_left.saturating_sub(elapsed);
        self.runtime = self.runtime.saturating_add(elapsed);
    }

    /// Slack left at `now`: deadline minus remaining work minus now
    pub fn laxity(&self, now: u64) -> i128 {
        self.deadline as i128 - self.time_left as i128 - now as i128
    }
}

impl Default for SchedAttrs {
    fn default() -> Self {
        Self::new(0, 1, 0)
    }
}
