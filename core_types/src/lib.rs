//! # Core Types
//!
//! This crate defines the identifiers shared by the real-time core and the
//! simulated dispatcher.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: an operation names the thread it applies to,
//!   or says explicitly that it means the current one.
//! - **Type safety first**: a handle to an exited thread cannot silently alias
//!   the thread that reuses its slot.
//!
//! ## Key Types
//!
//! - [`ThreadId`]: slot + generation handle for a thread in the core
//! - [`Target`]: explicit thread or "current thread" sentinel
//! - [`TaskId`]: unique identifier for a workload task

pub mod ids;

pub use ids::{TaskId, Target, ThreadId};
