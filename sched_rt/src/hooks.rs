//! Scheduling event hooks
//!
//! [`RtEngine`] is the context object a dispatcher talks to. It owns both
//! protection domains: the [`Scheduler`] (attributes and ready set, one
//! lock) and the [`StatsEngine`] (one lock per thread). Each event takes
//! the dispatch lock first, releases it, and only then records statistics,
//! so statistics never extend a dispatch critical section. Only `spawn` and
//! `exit` nest the two, always dispatch lock first.

use crate::attributes::SchedAttrs;
use crate::config::SchedulerConfig;
use crate::error::SchedError;
use crate::scheduler::{Dispatch, Scheduler};
use crate::stats::{RtStats, StatsEngine, SystemTotals};
use core_types::{Target, ThreadId};
use serde::{Deserialize, Serialize};

/// Event reported by the dispatcher or the workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedEvent {
    /// A new job was released
    Activated { thread: Target, now: u64 },
    /// The thread became runnable
    Ready { thread: Target, now: u64 },
    /// The dispatcher switched to this thread
    Dispatched { thread: ThreadId, now: u64 },
    /// Time advanced while the thread ran
    Executed { thread: Target, elapsed: u64 },
    /// A job finished
    Completed {
        thread: Target,
        response: u64,
        waiting: u64,
        now: u64,
    },
    DeadlineMissed { thread: Target },
    Preempted { thread: Target },
    ContextSwitched { thread: Target },
    PriorityInversion { thread: Target },
    /// The thread stopped being runnable
    Blocked { thread: Target },
}

/// Real-time scheduling engine
pub struct RtEngine {
    config: SchedulerConfig,
    scheduler: Scheduler,
    stats: StatsEngine,
}

impl RtEngine {
    /// Builds both domains, pre-allocating `max_threads` slots in each
    pub fn new(config: SchedulerConfig) -> Self {
        let scheduler = Scheduler::new(&config);
        let stats = StatsEngine::new(config.max_threads, config.stats);
        Self {
            config,
            scheduler,
            stats,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Dispatch domain
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Statistics domain
    pub fn stats(&self) -> &StatsEngine {
        &self.stats
    }

    pub fn policy_name(&self) -> &'static str {
        self.scheduler.policy_name()
    }

    /// Resolves a target, including `Current`, to a live handle
    pub fn resolve(&self, target: impl Into<Target>) -> Result<ThreadId, SchedError> {
        self.scheduler.lock().resolve(target.into())
    }

    /// Registers a thread in both domains
    ///
    /// The dispatch lock is held across both, so a slot freed by a
    /// concurrent `exit` is never handed out before its record is detached.
    pub fn spawn(&self, attrs: SchedAttrs) -> Result<ThreadId, SchedError> {
        let mut core = self.scheduler.lock();
        let id = core.spawn(attrs)?;
        if let Err(err) = self.stats.attach(id) {
            core.exit(Target::Thread(id))?;
            return Err(err);
        }
        Ok(id)
    }

    /// Unregisters a thread, returning its final statistics
    pub fn exit(&self, target: impl Into<Target>) -> Result<RtStats, SchedError> {
        let mut core = self.scheduler.lock();
        let id = core.exit(target.into())?;
        self.stats.detach(id)
    }

    /// Routes an event to the dispatch and statistics domains
    pub fn notify(&self, event: SchedEvent) -> Result<(), SchedError> {
        log::trace!("event {:?}", event);
        match event {
            SchedEvent::Activated { thread, now } => {
                let id = self.resolve(thread)?;
                self.stats.record_activation(id, now)
            }
            SchedEvent::Ready { thread, now } => self.make_ready(thread, now).map(|_| ()),
            SchedEvent::Dispatched { thread, now } => self.dispatch(thread, now).map(|_| ()),
            SchedEvent::Executed { thread, elapsed } => self.execute(thread, elapsed),
            SchedEvent::Completed {
                thread,
                response,
                waiting,
                now,
            } => self.complete(thread, response, waiting, now),
            SchedEvent::DeadlineMissed { thread } => {
                let id = self.resolve(thread)?;
                self.stats.record_deadline_miss(id)
            }
            SchedEvent::Preempted { thread } => {
                let id = self.resolve(thread)?;
                self.stats.record_preemption(id)
            }
            SchedEvent::ContextSwitched { thread } => {
                let id = self.resolve(thread)?;
                self.stats.record_context_switch(id)
            }
            SchedEvent::PriorityInversion { thread } => {
                let id = self.resolve(thread)?;
                self.stats.record_priority_inversion(id)
            }
            SchedEvent::Blocked { thread } => self.block(thread).map(|_| ()),
        }
    }

    /// Releases a new job: deadline `relative` ticks after `now`, budget
    /// reset, activation counted, thread made ready
    ///
    /// Returns the stored absolute deadline.
    pub fn release(
        &self,
        target: impl Into<Target>,
        relative: u64,
        now: u64,
    ) -> Result<u64, SchedError> {
        let target = target.into();
        let (id, deadline) = {
            let mut core = self.scheduler.lock();
            let id = core.resolve(target)?;
            let deadline = core.set_relative_deadline(target, relative, now)?;
            core.make_ready(target)?;
            (id, deadline)
        };
        self.stats.record_activation(id, now)?;
        self.stats.record_ready(id, now)?;
        Ok(deadline)
    }

    /// Makes a thread ready and stamps the ready time
    pub fn make_ready(&self, target: impl Into<Target>, now: u64) -> Result<ThreadId, SchedError> {
        let target = target.into();
        let id = {
            let mut core = self.scheduler.lock();
            let id = core.resolve(target)?;
            core.make_ready(target)?;
            id
        };
        self.stats.record_ready(id, now)?;
        Ok(id)
    }

    /// Takes a thread off the ready set or stops it running
    pub fn block(&self, target: impl Into<Target>) -> Result<ThreadId, SchedError> {
        let target = target.into();
        let mut core = self.scheduler.lock();
        let id = core.resolve(target)?;
        core.remove(target)?;
        Ok(id)
    }

    /// Runs a ready thread
    ///
    /// Counts a context switch for the incoming thread and a preemption for
    /// the outgoing one if it was still runnable.
    pub fn dispatch(&self, id: ThreadId, now: u64) -> Result<Dispatch, SchedError> {
        let dispatch = self.scheduler.dispatch(id)?;
        self.account_dispatch(&dispatch, now)?;
        Ok(dispatch)
    }

    /// Runs the best ready thread, if any
    pub fn dispatch_next(&self, now: u64) -> Result<Option<Dispatch>, SchedError> {
        let dispatch = self.scheduler.lock().dispatch_next()?;
        if let Some(dispatch) = &dispatch {
            self.account_dispatch(dispatch, now)?;
        }
        Ok(dispatch)
    }

    fn account_dispatch(&self, dispatch: &Dispatch, now: u64) -> Result<(), SchedError> {
        self.stats.record_start(dispatch.next, now)?;
        self.stats.record_context_switch(dispatch.next)?;
        if let (Some(previous), true) = (dispatch.previous, dispatch.preempted) {
            self.stats.record_preemption(previous)?;
            self.stats.record_ready(previous, now)?;
        }
        Ok(())
    }

    /// True if a ready thread strictly outranks the running one
    pub fn should_preempt(&self) -> bool {
        self.scheduler.lock().should_preempt()
    }

    /// Charges `elapsed` ticks of execution to a thread
    pub fn execute(&self, target: impl Into<Target>, elapsed: u64) -> Result<(), SchedError> {
        let target = target.into();
        let id = {
            let mut core = self.scheduler.lock();
            let id = core.resolve(target)?;
            core.charge(target, elapsed)?;
            id
        };
        self.stats.record_execution(id, elapsed)
    }

    /// Records a completed job and blocks the thread until its next release
    pub fn complete(
        &self,
        target: impl Into<Target>,
        response: u64,
        waiting: u64,
        now: u64,
    ) -> Result<(), SchedError> {
        let id = self.block(target)?;
        self.stats.record_completion_at(id, response, waiting, now)
    }

    pub fn snapshot(&self, target: impl Into<Target>) -> Result<RtStats, SchedError> {
        let id = self.resolve(target)?;
        self.stats.snapshot(id)
    }

    pub fn reset(&self, target: impl Into<Target>) -> Result<(), SchedError> {
        let id = self.resolve(target)?;
        self.stats.reset(id)
    }

    pub fn system_totals(&self) -> SystemTotals {
        self.stats.system_totals()
    }
}
