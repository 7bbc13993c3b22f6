//! # Real-Time Scheduling Core
//!
//! This crate provides a pluggable real-time scheduling-policy engine and
//! the per-thread statistics used to judge scheduling quality.
//!
//! ## Components
//!
//! - [`SchedAttrs`]: deadline, weight, execution time, remaining budget
//! - [`KeyPolicy`] / [`PolicyKind`]: attributes -> [`PriorityKey`]
//! - [`ReadySet`]: runnable threads ordered by `(key, ready order)`
//! - [`Scheduler`]: attribute store and ready set behind one dispatch lock
//! - [`StatsEngine`]: counters and running sums, one lock per thread
//! - [`RtEngine`]: the context object a dispatcher reports events to
//!
//! ## Philosophy
//!
//! **The core never reads the clock.** Every operation that needs time takes
//! `now` from the caller, which keeps the core deterministic and lets the
//! simulated dispatcher drive it tick by tick.
//!
//! **Nothing allocates after construction.** Thread slots, the ready heap
//! and statistics records are sized from [`SchedulerConfig::max_threads`].
//! Only diagnostic helpers such as [`SchedCore::ready_order`] allocate.

pub mod attributes;
pub mod config;
pub mod error;
pub mod hooks;
pub mod policy;
pub mod ready_set;
pub mod scheduler;
pub mod stats;

pub use attributes::{normalize_weight, SchedAttrs, DEFAULT_WEIGHT};
pub use config::{SchedulerConfig, StatsConfig, DEFAULT_MAX_THREADS};
pub use error::{ConfigError, SchedError};
pub use hooks::{RtEngine, SchedEvent};
pub use policy::{Edf, KeyFn, KeyPolicy, Llf, Pfs, PolicyKind, PriorityKey, Rms, WeightedEdf, Wsrt};
pub use ready_set::{ReadyEntry, ReadySet};
pub use scheduler::{Dispatch, SchedCore, SchedGuard, Scheduler, ThreadState};
pub use stats::{EventTimestamps, RtStats, SquareSums, StatsEngine, StatsSummary, SystemTotals};

pub use core_types::{Target, ThreadId};
