//! Scheduling Test Utilities
//!
//! Shared helpers for the integration tests in `tests/`.
//!
//! ## Test Philosophy
//!
//! - **Observable invariants**: stale keys and lost updates must show up as
//!   assertion failures, not as error returns
//! - **Deterministic schedules**: every workload runs on the simulated
//!   dispatcher, so a failing schedule reproduces exactly
//! - **Every policy**: ordering properties are checked under all six

use core_types::ThreadId;
use sched_rt::{PolicyKind, RtEngine, SchedAttrs, SchedulerConfig};
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Installs `env_logger` in test mode
///
/// The first call wins; later calls are no-ops. Honours `RUST_LOG`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Warn)
            .parse_default_env()
            .try_init();
    });
}

/// An engine with `capacity` thread slots under `policy`
pub fn engine(policy: PolicyKind, capacity: usize) -> RtEngine {
    init_test_logging();
    RtEngine::new(SchedulerConfig {
        policy,
        max_threads: capacity,
        ..SchedulerConfig::default()
    })
}

/// Spawns a thread with the given attributes and makes it ready at tick 0
pub fn spawn_ready(engine: &RtEngine, attrs: SchedAttrs) -> ThreadId {
    let id = engine.spawn(attrs).expect("Failed to spawn thread");
    engine.make_ready(id, 0).expect("Failed to make thread ready");
    id
}

/// Order in which `select_next` would hand out the ready threads
///
/// Pops by dispatching and blocking each selected thread in turn, so it
/// exercises the real selection path rather than a sorted copy.
pub fn drain_selection_order(engine: &RtEngine) -> Vec<ThreadId> {
    let mut order = Vec::new();
    while let Some(id) = engine.scheduler().select_next() {
        engine.dispatch(id, 0).expect("Failed to dispatch");
        engine.block(id).expect("Failed to block");
        order.push(id);
    }
    order
}

/// Attributes where every policy computes the same key
pub fn uniform_attrs() -> SchedAttrs {
    SchedAttrs::new(100, 2, 10)
}
