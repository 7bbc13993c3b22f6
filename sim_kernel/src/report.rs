//! Workload summary
//!
//! Built only from statistics snapshots; formatting it (console, CSV, JSON)
//! is left to whoever consumes it.

use core_types::{TaskId, ThreadId};
use sched_rt::{RtStats, StatsSummary};
use serde::{Deserialize, Serialize};

/// Results for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub name: String,
    pub thread: ThreadId,
    /// Worst-case CPU share from the task configuration
    pub utilization: f64,
    pub stats: RtStats,
    pub summary: StatsSummary,
}

/// Results for a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSummary {
    pub name: String,
    pub policy: String,
    pub duration_ticks: u64,
    pub tasks: Vec<TaskReport>,
    pub total_activations: u64,
    pub total_completions: u64,
    pub total_deadline_misses: u64,
    pub total_preemptions: u64,
    pub total_context_switches: u64,
    pub miss_rate_percent: f64,
    /// Mean response time over every completed job
    pub avg_response: Option<f64>,
    /// Largest response time of any task minus the smallest of any task
    pub response_jitter: Option<u64>,
    /// Share of the run spent executing jobs
    pub cpu_utilization_percent: f64,
    /// Sum of configured task utilisations
    pub demand_utilization_percent: f64,
}

impl WorkloadSummary {
    /// Aggregates per-task reports
    pub fn from_reports(
        name: impl Into<String>,
        policy: impl Into<String>,
        duration_ticks: u64,
        tasks: Vec<TaskReport>,
    ) -> Self {
        let mut total_activations = 0u64;
        let mut total_completions = 0u64;
        let mut total_deadline_misses = 0u64;
        let mut total_preemptions = 0u64;
        let mut total_context_switches = 0u64;
        let mut total_response = 0u64;
        let mut total_exec = 0u64;
        let mut min_response: Option<u64> = None;
        let mut max_response: Option<u64> = None;

        for report in &tasks {
            let s = &report.stats;
            total_activations += s.activations as u64;
            total_completions += s.completions as u64;
            total_deadline_misses += s.deadline_misses as u64;
            total_preemptions += s.preemptions as u64;
            total_context_switches += s.context_switches as u64;
            total_response += s.total_response_time;
            total_exec += s.total_exec_time;
            if let Some(min) = s.min_response_time {
                min_response = Some(min_response.map_or(min, |m| m.min(min)));
            }
            if let Some(max) = s.max_response_time {
                max_response = Some(max_response.map_or(max, |m| m.max(max)));
            }
        }

        let miss_rate_percent = if total_activations == 0 {
            0.0
        } else {
            100.0 * total_deadline_misses as f64 / total_activations as f64
        };
        let avg_response =
            (total_completions > 0).then(|| total_response as f64 / total_completions as f64);
        let response_jitter = match (min_response, max_response) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        };
        let cpu_utilization_percent = if duration_ticks == 0 {
            0.0
        } else {
            100.0 * total_exec as f64 / duration_ticks as f64
        };
        let demand_utilization_percent = 100.0 * tasks.iter().map(|t| t.utilization).sum::<f64>();

        Self {
            name: name.into(),
            policy: policy.into(),
            duration_ticks,
            tasks,
            total_activations,
            total_completions,
            total_deadline_misses,
            total_preemptions,
            total_context_switches,
            miss_rate_percent,
            avg_response,
            response_jitter,
            cpu_utilization_percent,
            demand_utilization_percent,
        }
    }

    /// Report of the task called `name`
    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
