//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the hardware seams the real-time core is driven
//! through.
//!
//! ## Philosophy
//!
//! **The core reacts to time, it never reads it.**
//!
//! Scheduling decisions need "now" (release times, laxity, response times),
//! but the core takes it as an argument. Whoever drives the core (a real
//! tick interrupt or the simulated dispatcher) polls a [`TimerDevice`] and
//! passes the value along.

pub mod timer;

pub use timer::TimerDevice;
