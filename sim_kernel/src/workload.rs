//! # Workload Description
//!
//! Task and run configuration for the simulated dispatcher. Everything here
//! is plain serde data so a workload can be written as JSON:
//!
//! ```
//! use sim_kernel::workload::{SimConfig, TaskKind};
//!
//! let config = SimConfig::from_json(r#"{
//!     "name": "control loop",
//!     "scheduler": { "policy": "wsrt" },
//!     "duration_ticks": 1000,
//!     "tasks": [
//!         { "name": "sensor", "exec_time": 2, "period": 10, "weight": 3 },
//!         { "name": "alarm", "exec_time": 1,
//!           "kind": { "sporadic": { "min_interarrival": 50 } } }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(config.tasks.len(), 2);
//! assert_eq!(config.tasks[0].relative_deadline(), 10);
//! assert!(matches!(config.tasks[1].kind, TaskKind::Sporadic { .. }));
//! ```
//!
//! All times are in simulator ticks; the dispatcher runs a 1 kHz tick, so
//! a tick is also a millisecond in the statistics.

use crate::SimError;
use sched_rt::{normalize_weight, ConfigError, SchedulerConfig};
use serde::{Deserialize, Serialize};

/// How jobs of a task arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Released every `period` ticks
    #[default]
    Periodic,
    /// Released by [`SimKernel::trigger`](crate::SimKernel::trigger), at
    /// least `min_interarrival` ticks apart
    Sporadic { min_interarrival: u64 },
}

/// One task of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    /// Execution time of every job
    pub exec_time: u64,
    /// Release period; unused by sporadic tasks
    #[serde(default)]
    pub period: u64,
    /// Relative deadline; 0 means implicit (period, or minimum
    /// inter-arrival time for sporadic tasks)
    #[serde(default)]
    pub deadline: u64,
    /// Importance weight; 0 is treated as 1
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub kind: TaskKind,
    /// Tick of the first periodic release
    #[serde(default)]
    pub offset: u64,
}

impl TaskConfig {
    /// A periodic task with implicit deadline and weight 1
    pub fn periodic(name: impl Into<String>, exec_time: u64, period: u64) -> Self {
        Self {
            name: name.into(),
            exec_time,
            period,
            deadline: 0,
            weight: 1,
            kind: TaskKind::Periodic,
            offset: 0,
        }
    }

    /// A sporadic task with implicit deadline and weight 1
    pub fn sporadic(name: impl Into<String>, exec_time: u64, min_interarrival: u64) -> Self {
        Self {
            name: name.into(),
            exec_time,
            period: 0,
            deadline: 0,
            weight: 1,
            kind: TaskKind::Sporadic { min_interarrival },
            offset: 0,
        }
    }

    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Spacing between releases: the period, or the minimum inter-arrival
    /// time of a sporadic task
    pub fn interval(&self) -> u64 {
        match self.kind {
            TaskKind::Periodic => self.period,
            TaskKind::Sporadic { min_interarrival } => min_interarrival,
        }
    }

    /// Relative deadline with the implicit-deadline rule applied
    pub fn relative_deadline(&self) -> u64 {
        if self.deadline == 0 {
            self.interval()
        } else {
            self.deadline
        }
    }

    /// Weight with zero normalised to 1
    pub fn effective_weight(&self) -> u32 {
        normalize_weight(self.weight).get()
    }

    /// Worst-case CPU share, `exec_time / interval`
    pub fn utilization(&self) -> f64 {
        match self.interval() {
            0 => 0.0,
            interval => self.exec_time as f64 / interval as f64,
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.exec_time == 0 {
            return Err(SimError::InvalidTaskConfig(format!(
                "{}: execution time must be non-zero",
                self.name
            )));
        }
        if self.interval() == 0 {
            return Err(SimError::InvalidTaskConfig(format!(
                "{}: release interval must be non-zero",
                self.name
            )));
        }
        Ok(())
    }
}

fn default_name() -> String {
    "workload".to_string()
}

/// Simulation run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Length of [`SimKernel::run_to_end`](crate::SimKernel::run_to_end)
    pub duration_ticks: u64,
    /// Per-task cap on activations
    #[serde(default)]
    pub max_activations: Option<u32>,
    /// Tasks added at construction, in order
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl SimConfig {
    pub fn new(scheduler: SchedulerConfig, duration_ticks: u64) -> Self {
        Self {
            name: default_name(),
            scheduler,
            duration_ticks,
            max_activations: None,
            tasks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_max_activations(mut self, max: u32) -> Self {
        self.max_activations = Some(max);
        self
    }

    /// Parses a JSON workload and validates its scheduler section
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Total worst-case utilisation of the configured tasks
    pub fn utilization(&self) -> f64 {
        self.tasks.iter().map(TaskConfig::utilization).sum()
    }
}
