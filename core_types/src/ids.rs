//! Unique identifiers for scheduled entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Handle to a thread slot in the real-time core
///
/// Threads live in fixed, pre-allocated slots. A slot is reused after its
/// thread exits, so every handle also carries the slot generation: a handle
/// kept past `exit` no longer matches and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId {
    slot: u32,
    generation: u32,
}

impl ThreadId {
    /// Creates a handle for a slot at a given generation
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Returns the slot index
    pub const fn slot(&self) -> usize {
        self.slot as usize
    }

    /// Returns the slot generation this handle was issued for
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({}#{})", self.slot, self.generation)
    }
}

/// Which thread an operation applies to
///
/// Attribute and statistics operations accept either an explicit handle or
/// the "current thread" sentinel, which resolves to whatever the dispatcher
/// is running at the time of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// The thread currently running
    Current,
    /// A specific thread
    Thread(ThreadId),
}

impl From<ThreadId> for Target {
    fn from(id: ThreadId) -> Self {
        Target::Thread(id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Current => write!(f, "Current"),
            Target::Thread(id) => write!(f, "{}", id),
        }
    }
}

/// Unique identifier for a workload task
///
/// Tasks are what a workload describes (a periodic or sporadic job source).
/// The simulator maps each task to one [`ThreadId`] in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a task ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}
