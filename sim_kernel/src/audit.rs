//! Schedule Audit Trail
//!
//! Chronological record of what the simulated dispatcher did, for
//! assertions in tests. This is not logging: events are structured and
//! queryable, and nothing is recorded inside the engine's critical section.
//!
//! ## Example
//!
//! ```
//! use sim_kernel::audit::{ScheduleAuditLog, ScheduleEvent};
//! use core_types::TaskId;
//!
//! let task_id = TaskId::new();
//! let mut log = ScheduleAuditLog::new();
//! log.record(ScheduleEvent::TaskSelected { task_id, timestamp_ticks: 3 });
//!
//! assert_eq!(log.events_for_task(task_id).len(), 1);
//! assert!(log.has_event(|e| matches!(e, ScheduleEvent::TaskSelected { .. })));
//! ```

use core_types::TaskId;
use serde::{Deserialize, Serialize};

/// Scheduling event for audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEvent {
    /// A job was released and made ready
    JobReleased {
        task_id: TaskId,
        activation: u32,
        deadline_tick: u64,
        timestamp_ticks: u64,
    },
    /// Task was dispatched
    TaskSelected { task_id: TaskId, timestamp_ticks: u64 },
    /// Task was preempted by a higher-ranked one
    TaskPreempted {
        task_id: TaskId,
        by: TaskId,
        timestamp_ticks: u64,
    },
    /// A job finished
    JobCompleted {
        task_id: TaskId,
        response_ticks: u64,
        waiting_ticks: u64,
        timestamp_ticks: u64,
    },
    /// A job finished after its absolute deadline
    DeadlineMissed {
        task_id: TaskId,
        deadline_tick: u64,
        timestamp_ticks: u64,
    },
}

impl ScheduleEvent {
    /// Task the event is about
    pub fn task_id(&self) -> TaskId {
        match self {
            ScheduleEvent::JobReleased { task_id, .. }
            | ScheduleEvent::TaskSelected { task_id, .. }
            | ScheduleEvent::TaskPreempted { task_id, .. }
            | ScheduleEvent::JobCompleted { task_id, .. }
            | ScheduleEvent::DeadlineMissed { task_id, .. } => *task_id,
        }
    }

    pub fn timestamp_ticks(&self) -> u64 {
        match self {
            ScheduleEvent::JobReleased { timestamp_ticks, .. }
            | ScheduleEvent::TaskSelected { timestamp_ticks, .. }
            | ScheduleEvent::TaskPreempted { timestamp_ticks, .. }
            | ScheduleEvent::JobCompleted { timestamp_ticks, .. }
            | ScheduleEvent::DeadlineMissed { timestamp_ticks, .. } => *timestamp_ticks,
        }
    }
}

/// Audit log for dispatcher decisions
#[derive(Debug, Default)]
pub struct ScheduleAuditLog {
    events: Vec<ScheduleEvent>,
}

impl ScheduleAuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: ScheduleEvent) {
        self.events.push(event);
    }

    /// Returns all recorded events
    pub fn get_events(&self) -> &[ScheduleEvent] {
        &self.events
    }

    /// Returns events for a specific task
    pub fn events_for_task(&self, task_id: TaskId) -> Vec<&ScheduleEvent> {
        self.events.iter().filter(|e| e.task_id() == task_id).collect()
    }

    /// Counts events matching a predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ScheduleEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&ScheduleEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    /// Task ids in dispatch order
    pub fn selection_order(&self) -> Vec<TaskId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ScheduleEvent::TaskSelected { task_id, .. } => Some(*task_id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log() {
        let log = ScheduleAuditLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn test_filter_by_task() {
        let a = TaskId::new();
        let b = TaskId::new();
        let mut log = ScheduleAuditLog::new();
        log.record(ScheduleEvent::TaskSelected { task_id: a, timestamp_ticks: 0 });
        log.record(ScheduleEvent::TaskPreempted {
            task_id: a,
            by: b,
            timestamp_ticks: 4,
        });
        log.record(ScheduleEvent::TaskSelected { task_id: b, timestamp_ticks: 4 });

        assert_eq!(log.events_for_task(a).len(), 2);
        assert_eq!(log.events_for_task(b).len(), 1);
        assert_eq!(log.selection_order(), vec![a, b]);
        assert_eq!(
            log.count_events(|e| matches!(e, ScheduleEvent::TaskPreempted { .. })),
            1
        );
        assert_eq!(log.get_events()[1].timestamp_ticks(), 4);
    }

    #[test]
    fn test_clear() {
        let mut log = ScheduleAuditLog::new();
        log.record(ScheduleEvent::DeadlineMissed {
            task_id: TaskId::new(),
            deadline_tick: 10,
            timestamp_ticks: 12,
        });
        log.clear();
        assert!(log.is_empty());
    }
}
