//! Attribute store and ready-set ordering
//!
//! Both live behind one spin lock: "read all ready keys and pick the
//! minimum" and "mutate a key" must never interleave, so they share a single
//! critical section. [`Scheduler::lock`] returns a [`SchedGuard`]; every
//! operation in [`SchedCore`] runs while that guard is held, and the
//! convenience methods on [`Scheduler`] take the lock for exactly one
//! operation.
//!
//! ## Invariants
//!
//! - A thread has a ready entry iff its state is [`ThreadState::Ready`].
//! - Every attribute mutation of a ready thread re-keys its entry before
//!   the lock is released; cached keys are never stale.
//! - At most one thread is [`ThreadState::Running`], and it is `current`.
//! - No operation allocates: slots, the free list and the heap are sized at
//!   construction.

use crate::attributes::{normalize_weight, SchedAttrs};
use crate::config::SchedulerConfig;
use crate::error::SchedError;
use crate::policy::{KeyFn, KeyPolicy, PriorityKey};
use crate::ready_set::ReadySet;
use core_types::{Target, ThreadId};
use serde::{Deserialize, Serialize};
use spin::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};

/// Thread state as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    /// Not runnable (sleeping, waiting for its next release, ...)
    Blocked,
    /// Runnable, has a ready entry
    Ready,
    /// Dispatched; not in the ready set
    Running,
}

/// Result of a dispatch decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Thread now running
    pub next: ThreadId,
    /// Thread that was running before, if different
    pub previous: Option<ThreadId>,
    /// True if `previous` was still runnable and went back to the ready set
    pub preempted: bool,
}

#[derive(Debug)]
struct ThreadControl {
    attrs: SchedAttrs,
    state: ThreadState,
}

#[derive(Debug)]
struct ThreadSlot {
    generation: u32,
    thread: Option<ThreadControl>,
}

/// State protected by the dispatch lock
pub struct SchedCore {
    key_fn: KeyFn,
    policy_name: &'static str,
    slots: Box<[ThreadSlot]>,
    free: Vec<u32>,
    ready: ReadySet,
    current: Option<ThreadId>,
}

impl SchedCore {
    fn new(capacity: usize, key_fn: KeyFn, policy_name: &'static str) -> Self {
        let slots: Vec<ThreadSlot> = (0..capacity)
            .map(|_| ThreadSlot {
                generation: 0,
                thread: None,
            })
            .collect();
        // Lowest slot is handed out first.
        let free: Vec<u32> = (0..capacity as u32).rev().collect();

        Self {
            key_fn,
            policy_name,
            slots: slots.into_boxed_slice(),
            free,
            ready: ReadySet::with_capacity(capacity),
            current: None,
        }
    }

    // ------------------------------------------------------------------
    // Thread life cycle
    // ------------------------------------------------------------------

    /// Registers a thread; it starts blocked, with no ready entry
    pub fn spawn(&mut self, attrs: SchedAttrs) -> Result<ThreadId, SchedError> {
        let slot = self.free.pop().ok_or(SchedError::CapacityExhausted {
            capacity: self.slots.len(),
        })?;
        let entry = &mut self.slots[slot as usize];
        entry.thread = Some(ThreadControl {
            attrs,
            state: ThreadState::Blocked,
        });
        let id = ThreadId::new(slot, entry.generation);
        log::debug!("spawned {} ({} policy)", id, self.policy_name);
        Ok(id)
    }

    /// Unregisters a thread, dropping its ready entry
    ///
    /// The slot generation is bumped, so the old handle stops resolving.
    pub fn exit(&mut self, target: Target) -> Result<ThreadId, SchedError> {
        let id = self.resolve(target)?;
        self.ready.remove(id.slot());
        if self.current == Some(id) {
            self.current = None;
        }
        let entry = &mut self.slots[id.slot()];
        entry.thread = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.slot() as u32);
        log::debug!("exited {}", id);
        Ok(id)
    }

    /// Resolves a target to a live thread handle
    pub fn resolve(&self, target: Target) -> Result<ThreadId, SchedError> {
        let id = match target {
            Target::Current => self.current.ok_or(SchedError::InvalidThread(target))?,
            Target::Thread(id) => id,
        };
        match self.slots.get(id.slot()) {
            Some(entry) if entry.generation == id.generation() && entry.thread.is_some() => {
                Ok(id)
            }
            _ => Err(SchedError::InvalidThread(target)),
        }
    }

    fn control(&self, target: Target) -> Result<&ThreadControl, SchedError> {
        let id = self.resolve(target)?;
        self.slots[id.slot()]
            .thread
            .as_ref()
            .ok_or(SchedError::InvalidThread(target))
    }

    /// Applies `f` to a thread's attributes and re-keys its ready entry
    fn mutate<R>(
        &mut self,
        target: Target,
        f: impl FnOnce(&mut SchedAttrs) -> R,
    ) -> Result<R, SchedError> {
        let id = self.resolve(target)?;
        let thread = self.slots[id.slot()]
            .thread
            .as_mut()
            .ok_or(SchedError::InvalidThread(target))?;
        let result = f(&mut thread.attrs);
        if thread.state == ThreadState::Ready {
            let key = (self.key_fn)(&thread.attrs);
            self.ready.rekey(id.slot(), key);
            log::trace!("rekeyed {} -> {}", id, key);
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Attribute store
    // ------------------------------------------------------------------

    /// Sets the weight; zero is stored as 1
    pub fn set_weight(&mut self, target: Target, weight: u32) -> Result<(), SchedError> {
        let weight = normalize_weight(weight);
        self.mutate(target, |attrs| attrs.weight = weight)
    }

    pub fn get_weight(&self, target: Target) -> Result<u32, SchedError> {
        Ok(self.control(target)?.attrs.weight.get())
    }

    /// Sets the expected execution time of future jobs
    pub fn set_exec_time(&mut self, target: Target, exec_time: u64) -> Result<(), SchedError> {
        self.mutate(target, |attrs| attrs.exec_time = exec_time)
    }

    pub fn get_exec_time(&self, target: Target) -> Result<u64, SchedError> {
        Ok(self.control(target)?.attrs.exec_time)
    }

    /// Overrides the remaining budget of the current job
    pub fn set_time_left(&mut self, target: Target, time_left: u64) -> Result<(), SchedError> {
        self.mutate(target, |attrs| attrs.time_left = time_left)
    }

    pub fn get_time_left(&self, target: Target) -> Result<u64, SchedError> {
        Ok(self.control(target)?.attrs.time_left)
    }

    /// Starts a new job due at absolute `deadline`
    ///
    /// Resets the remaining budget to the expected execution time. A
    /// deadline earlier than the stored one is clamped; the stored value is
    /// returned.
    pub fn set_deadline(&mut self, target: Target, deadline: u64) -> Result<u64, SchedError> {
        self.mutate(target, |attrs| attrs.start_job(deadline))
    }

    /// Starts a new job due `relative` ticks after `now`
    pub fn set_relative_deadline(
        &mut self,
        target: Target,
        relative: u64,
        now: u64,
    ) -> Result<u64, SchedError> {
        self.set_deadline(target, now.saturating_add(relative))
    }

    pub fn get_deadline(&self, target: Target) -> Result<u64, SchedError> {
        Ok(self.control(target)?.attrs.deadline)
    }

    /// Copy of all attributes
    pub fn attributes(&self, target: Target) -> Result<SchedAttrs, SchedError> {
        Ok(self.control(target)?.attrs)
    }

    /// Charges `elapsed` ticks of execution
    ///
    /// Decrements the remaining budget, grows the accumulated runtime and
    /// re-keys the thread if it is ready.
    pub fn charge(&mut self, target: Target, elapsed: u64) -> Result<(), SchedError> {
        self.mutate(target, |attrs| attrs.consume(elapsed))
    }

    // ------------------------------------------------------------------
    // Priority keys
    // ------------------------------------------------------------------

    /// Name of the active policy
    pub fn policy_name(&self) -> &'static str {
        self.policy_name
    }

    /// Key of a thread under the active policy
    pub fn key_of(&self, target: Target) -> Result<PriorityKey, SchedError> {
        Ok((self.key_fn)(&self.control(target)?.attrs))
    }

    /// Slack of a thread at `now`
    pub fn laxity(&self, target: Target, now: u64) -> Result<i128, SchedError> {
        Ok(self.control(target)?.attrs.laxity(now))
    }

    /// Recomputes a thread's key and fixes its ready entry
    ///
    /// Mutators already do this; exposed for callers that change inputs
    /// the store cannot see.
    pub fn rekey(&mut self, target: Target) -> Result<PriorityKey, SchedError> {
        self.mutate(target, |_| ())?;
        self.key_of(target)
    }

    // ------------------------------------------------------------------
    // Ready set
    // ------------------------------------------------------------------

    /// Marks a thread runnable and inserts it into the ready set
    ///
    /// A thread that is already ready keeps its place in ready order. If the
    /// running thread is made ready it stops being current (a yield).
    pub fn make_ready(&mut self, target: Target) -> Result<PriorityKey, SchedError> {
        let id = self.resolve(target)?;
        let thread = self.slots[id.slot()]
            .thread
            .as_mut()
            .ok_or(SchedError::InvalidThread(target))?;
        let key = (self.key_fn)(&thread.attrs);
        thread.state = ThreadState::Ready;
        self.ready.insert(id.slot(), key);
        if self.current == Some(id) {
            self.current = None;
        }
        log::trace!("{} ready with key {}", id, key);
        Ok(key)
    }

    /// The thread that should run next, without removing it
    pub fn select_next(&self) -> Option<ThreadId> {
        let entry = self.ready.peek()?;
        let slot = entry.slot as usize;
        Some(ThreadId::new(entry.slot, self.slots[slot].generation))
    }

    /// Key of the thread [`select_next`](Self::select_next) would return
    pub fn next_key(&self) -> Option<PriorityKey> {
        self.ready.peek().map(|entry| entry.key)
    }

    /// Takes a thread off the ready set (block or exit path)
    ///
    /// If the thread is running it stops being current. Returns true if a
    /// ready entry was removed.
    pub fn remove(&mut self, target: Target) -> Result<bool, SchedError> {
        let id = self.resolve(target)?;
        let removed = self.ready.remove(id.slot()).is_some();
        if let Some(thread) = self.slots[id.slot()].thread.as_mut() {
            thread.state = ThreadState::Blocked;
        }
        if self.current == Some(id) {
            self.current = None;
        }
        Ok(removed)
    }

    /// Runs a ready thread
    ///
    /// Removes its ready entry and makes it current. A different thread
    /// that was still running goes back to the ready set (preempted).
    pub fn dispatch(&mut self, id: ThreadId) -> Result<Dispatch, SchedError> {
        self.resolve(Target::Thread(id))?;
        if !self.ready.contains(id.slot()) {
            return Err(SchedError::NotReady(id));
        }

        let previous = self.current.filter(|&prev| prev != id);
        let mut preempted = false;
        if let Some(prev) = previous {
            if self.state(Target::Thread(prev))? == ThreadState::Running {
                self.make_ready(Target::Thread(prev))?;
                preempted = true;
            }
        }

        self.ready.remove(id.slot());
        if let Some(thread) = self.slots[id.slot()].thread.as_mut() {
            thread.state = ThreadState::Running;
        }
        self.current = Some(id);
        log::trace!("dispatched {} (previous {:?}, preempted {})", id, previous, preempted);

        Ok(Dispatch {
            next: id,
            previous,
            preempted,
        })
    }

    /// Dispatches whatever [`select_next`](Self::select_next) returns
    pub fn dispatch_next(&mut self) -> Result<Option<Dispatch>, SchedError> {
        match self.select_next() {
            Some(id) => self.dispatch(id).map(Some),
            None => Ok(None),
        }
    }

    /// True if a ready thread strictly outranks the running one
    ///
    /// Equal keys never preempt. With nothing running, true iff anything
    /// is ready.
    pub fn should_preempt(&self) -> bool {
        let Some(best) = self.next_key() else {
            return false;
        };
        match self.current {
            Some(current) => match self.key_of(Target::Thread(current)) {
                Ok(running) => best < running,
                Err(_) => true,
            },
            None => true,
        }
    }

    /// The running thread
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    pub fn state(&self, target: Target) -> Result<ThreadState, SchedError> {
        Ok(self.control(target)?.state)
    }

    pub fn is_ready(&self, target: Target) -> Result<bool, SchedError> {
        let id = self.resolve(target)?;
        Ok(self.ready.contains(id.slot()))
    }

    /// Number of ready threads
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Ready threads in selection order (allocates; diagnostics only)
    pub fn ready_order(&self) -> Vec<ThreadId> {
        self.ready
            .ordered()
            .into_iter()
            .map(|entry| ThreadId::new(entry.slot, self.slots[entry.slot as usize].generation))
            .collect()
    }

    /// Number of thread slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live threads
    pub fn live_threads(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// Proof that the dispatch lock is held
///
/// Its lifetime brackets a critical section; every [`SchedCore`] operation
/// is reachable only through it.
pub struct SchedGuard<'a> {
    core: MutexGuard<'a, SchedCore>,
}

impl Deref for SchedGuard<'_> {
    type Target = SchedCore;

    fn deref(&self) -> &SchedCore {
        &self.core
    }
}

impl DerefMut for SchedGuard<'_> {
    fn deref_mut(&mut self) -> &mut SchedCore {
        &mut self.core
    }
}

/// Dispatch-domain half of the engine
pub struct Scheduler {
    core: Mutex<SchedCore>,
}

impl Scheduler {
    /// Creates a scheduler from a configuration
    pub fn new(config: &SchedulerConfig) -> Self {
        Self::with_key_fn(config.max_threads, config.policy.key_fn(), config.policy.name())
    }

    /// Creates a scheduler ranking by a statically known policy
    pub fn with_policy<P: KeyPolicy>(capacity: usize) -> Self {
        Self::with_key_fn(capacity, P::key, P::NAME)
    }

    /// Creates a scheduler from a resolved key function
    pub fn with_key_fn(capacity: usize, key_fn: KeyFn, policy_name: &'static str) -> Self {
        log::debug!("scheduler: {} policy, {} slots", policy_name, capacity);
        Self {
            core: Mutex::new(SchedCore::new(capacity, key_fn, policy_name)),
        }
    }

    /// Enters the critical section
    pub fn lock(&self) -> SchedGuard<'_> {
        SchedGuard {
            core: self.core.lock(),
        }
    }

    /// Enters the critical section if it is free
    ///
    /// For callers that must not spin, such as an interrupt handler that
    /// found the lock taken by the code it interrupted.
    pub fn try_lock(&self) -> Option<SchedGuard<'_>> {
        self.core.try_lock().map(|core| SchedGuard { core })
    }

    pub fn spawn(&self, attrs: SchedAttrs) -> Result<ThreadId, SchedError> {
        self.lock().spawn(attrs)
    }

    pub fn exit(&self, target: impl Into<Target>) -> Result<ThreadId, SchedError> {
        self.lock().exit(target.into())
    }

    pub fn set_weight(&self, target: impl Into<Target>, weight: u32) -> Result<(), SchedError> {
        self.lock().set_weight(target.into(), weight)
    }

    pub fn get_weight(&self, target: impl Into<Target>) -> Result<u32, SchedError> {
        self.lock().get_weight(target.into())
    }

    pub fn set_exec_time(&self, target: impl Into<Target>, exec_time: u64) -> Result<(), SchedError> {
        self.lock().set_exec_time(target.into(), exec_time)
    }

    pub fn get_exec_time(&self, target: impl Into<Target>) -> Result<u64, SchedError> {
        self.lock().get_exec_time(target.into())
    }

    pub fn set_time_left(&self, target: impl Into<Target>, time_left: u64) -> Result<(), SchedError> {
        self.lock().set_time_left(target.into(), time_left)
    }

    pub fn get_time_left(&self, target: impl Into<Target>) -> Result<u64, SchedError> {
        self.lock().get_time_left(target.into())
    }

    pub fn set_deadline(&self, target: impl Into<Target>, deadline: u64) -> Result<u64, SchedError> {
        self.lock().set_deadline(target.into(), deadline)
    }

    pub fn get_deadline(&self, target: impl Into<Target>) -> Result<u64, SchedError> {
        self.lock().get_deadline(target.into())
    }

    pub fn attributes(&self, target: impl Into<Target>) -> Result<SchedAttrs, SchedError> {
        self.lock().attributes(target.into())
    }

    pub fn charge(&self, target: impl Into<Target>, elapsed: u64) -> Result<(), SchedError> {
        self.lock().charge(target.into(), elapsed)
    }

    pub fn key_of(&self, target: impl Into<Target>) -> Result<PriorityKey, SchedError> {
        self.lock().key_of(target.into())
    }

    pub fn rekey(&self, target: impl Into<Target>) -> Result<PriorityKey, SchedError> {
        self.lock().rekey(target.into())
    }

    pub fn make_ready(&self, target: impl Into<Target>) -> Result<PriorityKey, SchedError> {
        self.lock().make_ready(target.into())
    }

    pub fn select_next(&self) -> Option<ThreadId> {
        self.lock().select_next()
    }

    pub fn remove(&self, target: impl Into<Target>) -> Result<bool, SchedError> {
        self.lock().remove(target.into())
    }

    pub fn dispatch(&self, id: ThreadId) -> Result<Dispatch, SchedError> {
        self.lock().dispatch(id)
    }

    pub fn current(&self) -> Option<ThreadId> {
        self.lock().current()
    }

    pub fn policy_name(&self) -> &'static str {
        self.lock().policy_name()
    }
}
