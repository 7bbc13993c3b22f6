//! # Simulated Dispatcher
//!
//! This crate drives the real-time core the way a kernel dispatcher would,
//! one timer tick at a time, on a single simulated CPU.
//!
//! ## Purpose
//!
//! The simulated dispatcher lets whole workloads run under `cargo test`:
//! - Deterministic (time only advances on [`SimKernel::step`])
//! - Preemptive (the best ready job always runs)
//! - Inspectable (audit trail of every release, dispatch and completion)
//!
//! ## Each tick
//!
//! 1. Periodic jobs whose release time has come are released: absolute
//!    deadline `release + deadline`, budget reset, thread made ready.
//! 2. If a ready job strictly outranks the running one it is dispatched.
//! 3. The running job is charged one tick; every other pending job waits.
//! 4. A job whose budget reaches zero completes: response and waiting time
//!    are recorded, and it is a deadline miss if it finished after its
//!    absolute deadline.
//!
//! A periodic task releases its next job one period after the previous
//! release, or one period after a late completion if the job overran.
//!
//! The clock runs at 1 kHz. Every `now` handed to the engine is the
//! current tick, so statistics timestamps and durations share one unit.

pub mod audit;
pub mod report;
pub mod timer;
pub mod workload;

pub use audit::{ScheduleAuditLog, ScheduleEvent};
pub use report::{TaskReport, WorkloadSummary};
pub use timer::SimTimerDevice;
pub use workload::{SimConfig, TaskConfig, TaskKind};

use core_types::{TaskId, ThreadId};
use hal::TimerDevice;
use sched_rt::{RtEngine, RtStats, SchedAttrs, SchedError};
use std::collections::HashMap;
use thiserror::Error;

/// Simulation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("Scheduler error: {0}")]
    Sched(#[from] SchedError),

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Invalid task configuration: {0}")]
    InvalidTaskConfig(String),

    /// `trigger` called on a periodic task
    #[error("Task is not sporadic: {0}")]
    NotSporadic(TaskId),
}

/// A job in flight
#[derive(Debug, Clone, Copy)]
struct Job {
    released: u64,
    deadline: u64,
    waiting: u64,
}

#[derive(Debug)]
struct SimTask {
    config: TaskConfig,
    thread: ThreadId,
    /// Next periodic release; `None` for sporadic tasks
    next_release: Option<u64>,
    last_arrival: Option<u64>,
    activations: u32,
    job: Option<Job>,
}

/// Simulated single-core dispatcher
pub struct SimKernel {
    config: SimConfig,
    engine: RtEngine,
    timer: SimTimerDevice,
    tasks: HashMap<TaskId, SimTask>,
    /// Tasks in the order they were added; releases happen in this order
    order: Vec<TaskId>,
    threads: HashMap<ThreadId, TaskId>,
    audit_log: ScheduleAuditLog,
}

impl SimKernel {
    /// Builds the engine and adds every task listed in `config`
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let engine = RtEngine::new(config.scheduler.clone());
        log::debug!(
            "simulated dispatcher '{}' using {} ({} thread slots)",
            config.name,
            engine.policy_name(),
            config.scheduler.max_threads
        );
        let tasks = config.tasks.clone();
        let mut kernel = Self {
            config,
            engine,
            timer: SimTimerDevice::new(),
            tasks: HashMap::new(),
            order: Vec::new(),
            threads: HashMap::new(),
            audit_log: ScheduleAuditLog::new(),
        };
        for task in tasks {
            kernel.add_task(task)?;
        }
        Ok(kernel)
    }

    /// Registers a task; periodic tasks are released from `offset` on
    pub fn add_task(&mut self, config: TaskConfig) -> Result<TaskId, SimError> {
        config.validate()?;
        let attrs = SchedAttrs::new(0, config.weight, config.exec_time);
        let thread = self.engine.spawn(attrs)?;
        let task_id = TaskId::new();

        let next_release = match config.kind {
            TaskKind::Periodic => Some(config.offset.max(self.now())),
            TaskKind::Sporadic { .. } => None,
        };
        log::debug!(
            "added task '{}' as {} (exec {}, interval {}, deadline {}, weight {})",
            config.name,
            thread,
            config.exec_time,
            config.interval(),
            config.relative_deadline(),
            config.effective_weight()
        );

        self.tasks.insert(
            task_id,
            SimTask {
                config,
                thread,
                next_release,
                last_arrival: None,
                activations: 0,
                job: None,
            },
        );
        self.order.push(task_id);
        self.threads.insert(thread, task_id);
        Ok(task_id)
    }

    /// Unregisters a task, returning its final statistics
    pub fn remove_task(&mut self, task_id: TaskId) -> Result<RtStats, SimError> {
        let task = self
            .tasks
            .remove(&task_id)
            .ok_or(SimError::UnknownTask(task_id))?;
        self.order.retain(|&id| id != task_id);
        self.threads.remove(&task.thread);
        Ok(self.engine.exit(task.thread)?)
    }

    /// Sporadic arrival at the current tick
    ///
    /// Returns false, releasing nothing, if the previous job is still
    /// pending or the minimum inter-arrival time has not elapsed.
    pub fn trigger(&mut self, task_id: TaskId) -> Result<bool, SimError> {
        let now = self.now();
        let task = self.tasks.get(&task_id).ok_or(SimError::UnknownTask(task_id))?;
        let TaskKind::Sporadic { min_interarrival } = task.config.kind else {
            return Err(SimError::NotSporadic(task_id));
        };
        if task.job.is_some() || !self.under_activation_cap(task) {
            return Ok(false);
        }
        if let Some(last) = task.last_arrival {
            if now < last.saturating_add(min_interarrival) {
                log::debug!(
                    "arrival of '{}' at {} rejected: earliest is {}",
                    task.config.name,
                    now,
                    last.saturating_add(min_interarrival)
                );
                return Ok(false);
            }
        }
        self.release(task_id, now)?;
        Ok(true)
    }

    /// Simulates one tick
    ///
    /// Returns the task that ran during the tick, if any.
    pub fn step(&mut self) -> Result<Option<TaskId>, SimError> {
        let now = self.now();

        for index in 0..self.order.len() {
            let task_id = self.order[index];
            if self.release_due(task_id, now) {
                self.release(task_id, now)?;
            }
        }

        if self.engine.should_preempt() {
            if let Some(dispatch) = self.engine.dispatch_next(now)? {
                let task_id = self.task_of(dispatch.next)?;
                self.audit_log.record(ScheduleEvent::TaskSelected {
                    task_id,
                    timestamp_ticks: now,
                });
                if let (Some(previous), true) = (dispatch.previous, dispatch.preempted) {
                    let preempted = self.task_of(previous)?;
                    self.audit_log.record(ScheduleEvent::TaskPreempted {
                        task_id: preempted,
                        by: task_id,
                        timestamp_ticks: now,
                    });
                }
            }
        }

        let running = self.engine.scheduler().current();
        let running_task = match running {
            Some(thread) => Some(self.task_of(thread)?),
            None => None,
        };

        for task in self.tasks.values_mut() {
            if running != Some(task.thread) {
                if let Some(job) = task.job.as_mut() {
                    job.waiting += 1;
                }
            }
        }
        if let Some(thread) = running {
            self.engine.execute(thread, 1)?;
        }
        self.timer.advance_ticks(1);

        if let (Some(thread), Some(task_id)) = (running, running_task) {
            if self.engine.scheduler().get_time_left(thread)? == 0 {
                self.complete(task_id)?;
            }
        }
        Ok(running_task)
    }

    /// Simulates `ticks` ticks
    pub fn run_for(&mut self, ticks: u64) -> Result<(), SimError> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// Runs until `duration_ticks` and summarises the run
    pub fn run_to_end(&mut self) -> Result<WorkloadSummary, SimError> {
        log::info!(
            "running '{}' under {} for {} ticks ({} tasks, demand {:.1}%)",
            self.config.name,
            self.engine.policy_name(),
            self.config.duration_ticks,
            self.order.len(),
            100.0 * self.config.utilization()
        );
        while self.now() < self.config.duration_ticks {
            self.step()?;
        }
        let summary = self.summary()?;
        log::info!(
            "'{}' finished: {} activations, {} misses ({:.2}%), cpu {:.1}%",
            summary.name,
            summary.total_activations,
            summary.total_deadline_misses,
            summary.miss_rate_percent,
            summary.cpu_utilization_percent
        );
        Ok(summary)
    }

    /// Summary of the run so far, from statistics snapshots
    pub fn summary(&self) -> Result<WorkloadSummary, SimError> {
        let mut reports = Vec::with_capacity(self.order.len());
        for task_id in &self.order {
            let task = self.task(*task_id)?;
            let stats = self.engine.snapshot(task.thread)?;
            reports.push(TaskReport {
                task_id: *task_id,
                name: task.config.name.clone(),
                thread: task.thread,
                utilization: task.config.utilization(),
                stats,
                summary: stats.summary(),
            });
        }
        Ok(WorkloadSummary::from_reports(
            self.config.name.clone(),
            self.engine.policy_name(),
            self.now(),
            reports,
        ))
    }

    /// Current tick
    pub fn now(&self) -> u64 {
        self.timer.current_ticks()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The engine under simulation
    pub fn engine(&self) -> &RtEngine {
        &self.engine
    }

    /// Returns the audit log
    pub fn audit_log(&self) -> &ScheduleAuditLog {
        &self.audit_log
    }

    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }

    /// Task ids in the order they were added
    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }

    pub fn task_count(&self) -> usize {
        self.order.len()
    }

    pub fn thread_of(&self, task_id: TaskId) -> Result<ThreadId, SimError> {
        Ok(self.task(task_id)?.thread)
    }

    pub fn task_config(&self, task_id: TaskId) -> Result<&TaskConfig, SimError> {
        Ok(&self.task(task_id)?.config)
    }

    /// Task currently holding the CPU
    pub fn running_task(&self) -> Option<TaskId> {
        let thread = self.engine.scheduler().current()?;
        self.threads.get(&thread).copied()
    }

    /// True if the task has a released, unfinished job
    pub fn has_pending_job(&self, task_id: TaskId) -> Result<bool, SimError> {
        Ok(self.task(task_id)?.job.is_some())
    }

    /// Statistics snapshot of one task
    pub fn stats(&self, task_id: TaskId) -> Result<RtStats, SimError> {
        Ok(self.engine.snapshot(self.thread_of(task_id)?)?)
    }

    fn task(&self, task_id: TaskId) -> Result<&SimTask, SimError> {
        self.tasks.get(&task_id).ok_or(SimError::UnknownTask(task_id))
    }

    fn task_of(&self, thread: ThreadId) -> Result<TaskId, SimError> {
        self.threads
            .get(&thread)
            .copied()
            .ok_or(SimError::Sched(SchedError::InvalidThread(thread.into())))
    }

    fn under_activation_cap(&self, task: &SimTask) -> bool {
        self.config
            .max_activations
            .map_or(true, |max| task.activations < max)
    }

    fn release_due(&self, task_id: TaskId, now: u64) -> bool {
        let Some(task) = self.tasks.get(&task_id) else {
            return false;
        };
        task.job.is_none()
            && task.next_release.is_some_and(|at| at <= now)
            && self.under_activation_cap(task)
    }

    fn release(&mut self, task_id: TaskId, now: u64) -> Result<(), SimError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SimError::UnknownTask(task_id))?;
        let deadline = self
            .engine
            .release(task.thread, task.config.relative_deadline(), now)?;

        task.activations += 1;
        task.last_arrival = Some(now);
        task.job = Some(Job {
            released: now,
            deadline,
            waiting: 0,
        });
        if let Some(at) = task.next_release.as_mut() {
            *at = now.saturating_add(task.config.period);
        }
        log::trace!(
            "released '{}' job {} at {} (deadline {})",
            task.config.name,
            task.activations,
            now,
            deadline
        );

        self.audit_log.record(ScheduleEvent::JobReleased {
            task_id,
            activation: task.activations,
            deadline_tick: deadline,
            timestamp_ticks: now,
        });
        Ok(())
    }

    fn complete(&mut self, task_id: TaskId) -> Result<(), SimError> {
        let now = self.now();
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SimError::UnknownTask(task_id))?;
        let Some(job) = task.job.take() else {
            return Ok(());
        };

        // 1 kHz clock: tick counts are already milliseconds.
        let response = self.timer.ms_since(job.released);
        self.engine.complete(task.thread, response, job.waiting, now)?;
        self.audit_log.record(ScheduleEvent::JobCompleted {
            task_id,
            response_ticks: now - job.released,
            waiting_ticks: job.waiting,
            timestamp_ticks: now,
        });

        if now > job.deadline {
            log::warn!(
                "'{}' missed its deadline: finished at {}, due {}",
                task.config.name,
                now,
                job.deadline
            );
            self.engine.stats().record_deadline_miss(task.thread)?;
            self.audit_log.record(ScheduleEvent::DeadlineMissed {
                task_id,
                deadline_tick: job.deadline,
                timestamp_ticks: now,
            });
        }

        // An overrun pushes the next release one period past completion.
        if let Some(at) = task.next_release.as_mut() {
            if *at < now {
                *at = now.saturating_add(task.config.period);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_rt::{PolicyKind, SchedulerConfig};

    fn kernel(policy: PolicyKind, duration: u64) -> SimKernel {
        SimKernel::new(SimConfig::new(SchedulerConfig::with_policy(policy), duration)).unwrap()
    }

    #[test]
    fn test_kernel_creation() {
        let kernel = kernel(PolicyKind::Edf, 100);
        assert_eq!(kernel.now(), 0);
        assert_eq!(kernel.task_count(), 0);
        assert!(kernel.audit_log().is_empty());
    }

    #[test]
    fn test_tasks_from_config() {
        let config = SimConfig::new(SchedulerConfig::default(), 10)
            .with_task(TaskConfig::periodic("a", 1, 5))
            .with_task(TaskConfig::sporadic("b", 1, 5));
        let kernel = SimKernel::new(config).unwrap();
        assert_eq!(kernel.task_count(), 2);
    }

    #[test]
    fn test_invalid_task_rejected() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let result = kernel.add_task(TaskConfig::periodic("bad", 0, 10));
        assert!(matches!(result, Err(SimError::InvalidTaskConfig(_))));
        assert_eq!(kernel.task_count(), 0);
    }

    #[test]
    fn test_single_periodic_task() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let task = kernel.add_task(TaskConfig::periodic("a", 3, 10)).unwrap();

        assert_eq!(kernel.step().unwrap(), Some(task));
        kernel.run_for(9).unwrap();

        let stats = kernel.stats(task).unwrap();
        assert_eq!(stats.activations, 1);
        assert_eq!(stats.completions, 1);
        assert_eq!(stats.min_response_time, Some(3));
        assert_eq!(stats.total_exec_time, 3);
        assert_eq!(stats.deadline_misses, 0);
        assert!(!kernel.has_pending_job(task).unwrap());

        kernel.step().unwrap();
        assert_eq!(kernel.stats(task).unwrap().activations, 2);
    }

    #[test]
    fn test_stats_timestamps_share_the_tick_clock() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let task = kernel
            .add_task(TaskConfig::periodic("a", 3, 10).with_offset(5))
            .unwrap();
        kernel.run_for(8).unwrap();

        let stats = kernel.stats(task).unwrap();
        let stamps = stats.timestamps.unwrap();
        assert_eq!(stamps.last_activation, Some(5));
        assert_eq!(stamps.last_ready, Some(5));
        assert_eq!(stamps.last_start, Some(5));
        assert_eq!(stamps.last_completion, Some(8));
        assert_eq!(
            stats.max_response_time,
            Some(stamps.last_completion.unwrap() - stamps.last_activation.unwrap())
        );
    }

    #[test]
    fn test_idle_tick() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let task = kernel
            .add_task(TaskConfig::periodic("late", 1, 10).with_offset(5))
            .unwrap();
        assert_eq!(kernel.step().unwrap(), None);
        kernel.run_for(4).unwrap();
        assert_eq!(kernel.step().unwrap(), Some(task));
    }

    #[test]
    fn test_preemption_by_earlier_deadline() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let long = kernel.add_task(TaskConfig::periodic("long", 10, 100)).unwrap();
        let short = kernel
            .add_task(TaskConfig::periodic("short", 2, 20).with_offset(3))
            .unwrap();

        kernel.run_for(20).unwrap();

        let order = kernel.audit_log().selection_order();
        assert_eq!(order, vec![long, short, long]);
        assert!(kernel.audit_log().has_event(|e| matches!(
            e,
            ScheduleEvent::TaskPreempted { task_id, by, timestamp_ticks: 3 }
                if *task_id == long && *by == short
        )));

        let long_stats = kernel.stats(long).unwrap();
        assert_eq!(long_stats.preemptions, 1);
        assert_eq!(long_stats.max_response_time, Some(12));
        assert_eq!(long_stats.max_waiting_time, Some(2));
    }

    #[test]
    fn test_sporadic_trigger_respects_interarrival() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let task = kernel.add_task(TaskConfig::sporadic("irq", 1, 10)).unwrap();

        assert!(kernel.trigger(task).unwrap());
        kernel.run_for(5).unwrap();
        assert!(!kernel.trigger(task).unwrap());
        kernel.run_for(5).unwrap();
        assert!(kernel.trigger(task).unwrap());

        assert_eq!(kernel.stats(task).unwrap().activations, 2);
    }

    #[test]
    fn test_trigger_periodic_task_rejected() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let task = kernel.add_task(TaskConfig::periodic("a", 1, 10)).unwrap();
        assert_eq!(kernel.trigger(task), Err(SimError::NotSporadic(task)));
        assert!(matches!(
            kernel.trigger(TaskId::new()),
            Err(SimError::UnknownTask(_))
        ));
    }

    #[test]
    fn test_deadline_miss_recorded() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let task = kernel
            .add_task(TaskConfig::periodic("tight", 5, 20).with_deadline(3))
            .unwrap();
        kernel.run_for(5).unwrap();

        let stats = kernel.stats(task).unwrap();
        assert_eq!(stats.deadline_misses, 1);
        assert!(kernel.audit_log().has_event(|e| matches!(
            e,
            ScheduleEvent::DeadlineMissed { deadline_tick: 3, timestamp_ticks: 5, .. }
        )));
    }

    #[test]
    fn test_max_activations() {
        let mut config = SimConfig::new(SchedulerConfig::default(), 100).with_max_activations(3);
        config.tasks.push(TaskConfig::periodic("a", 1, 10));
        let mut kernel = SimKernel::new(config).unwrap();
        let summary = kernel.run_to_end().unwrap();
        assert_eq!(summary.total_activations, 3);
    }

    #[test]
    fn test_remove_task() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        let task = kernel.add_task(TaskConfig::periodic("a", 2, 10)).unwrap();
        kernel.run_for(2).unwrap();
        let last = kernel.remove_task(task).unwrap();
        assert_eq!(last.completions, 1);
        assert_eq!(kernel.task_count(), 0);
        assert_eq!(kernel.stats(task), Err(SimError::UnknownTask(task)));
    }

    #[test]
    fn test_clear_audit_log() {
        let mut kernel = kernel(PolicyKind::Edf, 100);
        kernel.add_task(TaskConfig::periodic("a", 1, 10)).unwrap();
        kernel.step().unwrap();
        assert!(!kernel.audit_log().is_empty());
        kernel.clear_audit_log();
        assert!(kernel.audit_log().is_empty());
    }
}
