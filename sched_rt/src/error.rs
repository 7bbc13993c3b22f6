//! Real-time core error types

use core_types::{Target, ThreadId};
use thiserror::Error;

/// Errors returned by attribute, ready-set and statistics operations
///
/// None of these are retryable: each one means the caller handed the core
/// something it never registered, or already released.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Unknown, exited or stale thread handle, or `Current` while idle
    #[error("Invalid thread: {0}")]
    InvalidThread(Target),

    /// Every pre-allocated thread slot is in use
    #[error("Thread table full (capacity {capacity})")]
    CapacityExhausted { capacity: usize },

    /// Dispatch requested for a thread with no ready entry
    #[error("Thread is not ready: {0}")]
    NotReady(ThreadId),
}

/// Errors raised while loading a scheduler configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Malformed JSON or unknown policy name
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// `max_threads` must be at least one
    #[error("Thread capacity must be non-zero")]
    ZeroCapacity,
}
