// packages/dispatch/src/dispatcher/single_thread.rs
//! Single-thread dispatcher
//!
//! One dedicated worker thread runs the event handlers of every agent bound
//! to the dispatcher. Producers only enqueue; they never run agent code.
//! Because a single thread executes everything, access to each bound
//! agent's state is serialised without any locking on the agent's side.
//!
//! # Architecture
//!
//! ```text
//! producer A ─┐            ┌─ default lane ─┐
//! producer B ─┼──push──▶   ├─ binder lane 1 ├─ round robin ──pop_blocking──▶ worker thread
//! producer C ─┘            └─ binder lane 2 ┘   (BoundQueue)                  │
//!                                                               handler(s) ◀──┤
//!                                                               error hook ◀──┘ (on failure)
//! ```
//!
//! `bind` uses the default lane. A [`QueueBinder`] from
//! [`SingleThreadDispatcher::binder`] owns a lane with its own
//! [`DemandQueue`] policy; agents bound through it are ordered by that
//! policy, and the worker alternates between non-empty lanes.
//!
//! # Shutdown
//!
//! `shutdown` closes every binding and the queue. The worker drains what
//! was queued (or the queue is cleared first under
//! [`ShutdownPolicy::Discard`]), then exits; an in-flight handler always
//! runs to completion.

use crate::dispatcher::agent::AgentRef;
use crate::dispatcher::binding::{BindingHandle, BindingState};
use crate::dispatcher::error_hook::{ErrorHook, ErrorReaction};
use crate::dispatcher::registry::DispatcherRegistry;
use crate::dispatcher::state::{DispatcherState, Lifecycle};
use crate::dispatcher::traits::{Dispatcher, DispatcherKind, DispatcherStats};
use crate::queue::bound_queue::{BoundQueue, LaneId, QueueStats};
use crate::queue::demand::Demand;
use crate::queue::policy::DemandQueue;
use crate::utils::config::{DispatcherConfig, ShutdownPolicy, UnbindPolicy};
use crate::utils::errors::{DispatchError, HandlerExecutionError, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use ulid::Ulid;

#[derive(Default)]
struct Counters {
    executed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    discarded: AtomicU64,
}

/// State shared between the dispatcher and its worker thread
struct Shared {
    config: DispatcherConfig,
    queue: Arc<BoundQueue>,
    lifecycle: Lifecycle,
    bindings: DashMap<Ulid, Arc<BindingState>>,
    error_hook: Option<Arc<dyn ErrorHook>>,
    counters: Counters,
    worker_id: OnceLock<ThreadId>,
}

impl Shared {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn stopped_error(&self) -> DispatchError {
        DispatchError::DispatcherStopped(self.config.name.clone())
    }

    /// Bind `agent` so its demands go to `lane`
    fn bind_on(&self, agent: &AgentRef, lane: LaneId) -> Result<BindingHandle> {
        // Held so shutdown cannot close bindings halfway through
        let state = self.lifecycle.lock();
        if !state.accepts_bindings() {
            return Err(self.stopped_error());
        }

        agent.claim_binding(self.name())?;

        let binding = BindingState::new(agent.clone(), self.name());
        self.bindings.insert(agent.id(), Arc::clone(&binding));
        drop(state);

        debug!(dispatcher = %self.name(), agent = %agent, lane = lane.index(), "Agent bound");
        Ok(BindingHandle::new(binding, Arc::clone(&self.queue), lane))
    }

    /// Worker thread body
    fn run(&self) {
        let _ = self.worker_id.set(thread::current().id());
        let _stopped = StopOnExit(&self.lifecycle);
        info!(dispatcher = %self.name(), "Worker thread started");

        while let Some(demand) = self.queue.pop_blocking() {
            self.execute(demand);
        }

        info!(dispatcher = %self.name(), "Worker thread finished");
    }

    /// Run one demand; never lets a handler failure escape
    fn execute(&self, demand: Demand) {
        if let Some(reason) = demand.binding().and_then(|b| b.state().skip_reason()) {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("dispatch_demands_skipped_total", "dispatcher" => self.config.name.clone())
                .increment(1);
            trace!(
                dispatcher = %self.name(),
                "Skipping {:?} ({:?})",
                demand,
                reason
            );
            return;
        }

        // Token is dropped after the handler so `pending` covers execution
        let (agent, kind, handler, token) = demand.into_parts();
        trace!(dispatcher = %self.name(), agent = %agent, event = kind.label(), "Executing demand");

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(handler));
        let elapsed = started.elapsed();

        self.counters.executed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("dispatch_demands_executed_total", "dispatcher" => self.config.name.clone())
            .increment(1);

        if let Some(threshold) = self.config.slow_demand_threshold() {
            if elapsed > threshold {
                warn!(
                    dispatcher = %self.name(),
                    agent = %agent,
                    event = kind.label(),
                    "Slow handler took {:?} (threshold {:?})",
                    elapsed,
                    threshold
                );
            }
        }

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(source)) => Some(HandlerExecutionError::Failed {
                agent: agent.name().to_string(),
                source,
            }),
            Err(payload) => Some(HandlerExecutionError::from_panic(agent.name(), payload)),
        };

        if let Some(failure) = failure {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("dispatch_demands_failed_total", "dispatcher" => self.config.name.clone())
                .increment(1);

            if self.react_to_failure(&agent, &failure) == ErrorReaction::Deactivate {
                if let Some(token) = token.as_ref() {
                    token.state().deactivate();
                    warn!(dispatcher = %self.name(), agent = %agent, "Agent deactivated after handler failure");
                }
            }
        }

        drop(token);
    }

    /// Route a failure to the error hook; fall back to logging
    fn react_to_failure(&self, agent: &AgentRef, failure: &HandlerExecutionError) -> ErrorReaction {
        let Some(hook) = self.error_hook.as_ref() else {
            error!(dispatcher = %self.name(), agent = %agent, "{}", failure);
            return ErrorReaction::Ignore;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| hook.on_handler_error(agent, failure))) {
            Ok(Ok(reaction)) => reaction,
            Ok(Err(e)) => {
                error!(
                    dispatcher = %self.name(),
                    agent = %agent,
                    "Error hook failed ({:#}) while handling: {}",
                    e,
                    failure
                );
                ErrorReaction::Ignore
            }
            Err(_) => {
                error!(
                    dispatcher = %self.name(),
                    agent = %agent,
                    "Error hook panicked while handling: {}",
                    failure
                );
                ErrorReaction::Ignore
            }
        }
    }
}

/// Marks the dispatcher stopped when the worker exits, even by unwinding
struct StopOnExit<'a>(&'a Lifecycle);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        while *state != DispatcherState::Stopped {
            self.0.advance(&mut state);
        }
    }
}

/// Binds agents to a dispatcher through a dedicated demand queue
///
/// All agents bound through one binder share its queue and its ordering
/// policy. Unbind them through the dispatcher as usual.
#[derive(Clone)]
pub struct QueueBinder {
    shared: Arc<Shared>,
    lane: LaneId,
}

impl QueueBinder {
    /// Name of the dispatcher this binder belongs to
    pub fn dispatcher(&self) -> &str {
        self.shared.name()
    }

    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// Bind `agent`; its demands are ordered by this binder's queue
    pub fn bind(&self, agent: &AgentRef) -> Result<BindingHandle> {
        self.shared.bind_on(agent, self.lane)
    }
}

impl std::fmt::Debug for QueueBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueBinder")
            .field("dispatcher", &self.shared.name())
            .field("lane", &self.lane)
            .finish()
    }
}

/// Builder for [`SingleThreadDispatcher`]
pub struct SingleThreadDispatcherBuilder {
    config: DispatcherConfig,
    policy: Option<Box<dyn DemandQueue>>,
    error_hook: Option<Arc<dyn ErrorHook>>,
}

impl SingleThreadDispatcherBuilder {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for a default configuration under `name`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let config = DispatcherConfig::named(name);
        self.config.name = config.name;
        self.config.thread_name = config.thread_name;
        self
    }

    /// Order the default lane with a custom policy (default: FIFO)
    pub fn queue_policy<Q: DemandQueue + 'static>(mut self, policy: Q) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    pub fn error_hook<H: ErrorHook + 'static>(mut self, hook: H) -> Self {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    pub fn shared_error_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.error_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<SingleThreadDispatcher> {
        self.config.validate()?;

        let queue = match self.policy {
            Some(policy) => BoundQueue::from_boxed(policy),
            None => BoundQueue::new(),
        };

        debug!(dispatcher = %self.config.name, "Dispatcher created");

        Ok(SingleThreadDispatcher {
            shared: Arc::new(Shared {
                config: self.config,
                queue: Arc::new(queue),
                lifecycle: Lifecycle::new(),
                bindings: DashMap::new(),
                error_hook: self.error_hook,
                counters: Counters::default(),
                worker_id: OnceLock::new(),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Build and register under the configured name
    pub fn register(self, registry: &DispatcherRegistry) -> Result<Arc<SingleThreadDispatcher>> {
        let dispatcher = Arc::new(self.build()?);
        registry.register(dispatcher.clone())?;
        Ok(dispatcher)
    }
}

/// Dispatcher running all bound agents on one worker thread
pub struct SingleThreadDispatcher {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SingleThreadDispatcher {
    /// Create a FIFO dispatcher with the given configuration
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Create a FIFO dispatcher and register it in `registry`
    pub fn create(registry: &DispatcherRegistry, config: DispatcherConfig) -> Result<Arc<Self>> {
        Self::builder().config(config).register(registry)
    }

    pub fn builder() -> SingleThreadDispatcherBuilder {
        SingleThreadDispatcherBuilder {
            config: DispatcherConfig::default(),
            policy: None,
            error_hook: None,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    pub fn is_bound(&self, agent: &AgentRef) -> bool {
        self.shared.bindings.contains_key(&agent.id())
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.shared.queue.stats()
    }

    /// Create a binder with its own demand queue on this dispatcher
    pub fn binder<Q: DemandQueue + 'static>(&self, queue: Q) -> QueueBinder {
        let lane = self.shared.queue.add_lane(Box::new(queue));
        debug!(dispatcher = %self.name(), lane = lane.index(), "Binder created");

        QueueBinder {
            shared: Arc::clone(&self.shared),
            lane,
        }
    }

    /// Wait up to `timeout` for the dispatcher to stop; true if it did.
    ///
    /// Pair with `shutdown(false)` for a bounded shutdown.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        if !self.shared.lifecycle.wait_stopped_timeout(timeout) {
            return false;
        }
        // Reap the thread; it is past its last statement once Stopped is set
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!(dispatcher = %self.shared.name(), "Worker thread panicked");
            }
        }
        true
    }

    fn spawn_worker(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);

        let handle = thread::Builder::new()
            .name(self.shared.config.thread_name.clone())
            .spawn(move || shared.run())
            .map_err(DispatchError::ThreadSpawn)?;

        *self.worker.lock() = Some(handle);
        Ok(())
    }

    fn on_worker_thread(&self) -> bool {
        self.shared.worker_id.get() == Some(&thread::current().id())
    }
}

impl Dispatcher for SingleThreadDispatcher {
    fn name(&self) -> &str {
        self.shared.name()
    }

    fn kind(&self) -> DispatcherKind {
        DispatcherKind::SingleThread
    }

    fn state(&self) -> DispatcherState {
        self.shared.lifecycle.get()
    }

    fn bind(&self, agent: &AgentRef) -> Result<BindingHandle> {
        self.shared.bind_on(agent, LaneId::DEFAULT)
    }

    fn unbind(&self, agent: &AgentRef) -> Result<()> {
        let state = self.shared.lifecycle.lock();
        if !state.accepts_bindings() {
            return Err(self.shared.stopped_error());
        }

        let (_, binding) = self
            .shared
            .bindings
            .remove(&agent.id())
            .ok_or_else(|| DispatchError::NotBound {
                agent: agent.name().to_string(),
                dispatcher: self.name().to_string(),
            })?;

        // The agent's slot stays claimed until its queued demands are gone
        let discard = self.shared.config.unbind_policy == UnbindPolicy::Discard;
        binding.close(discard);
        drop(state);

        debug!(
            dispatcher = %self.name(),
            agent = %agent,
            pending = binding.pending(),
            "Agent unbound ({})",
            if discard { "discarding pending demands" } else { "draining pending demands" }
        );
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut state = self.shared.lifecycle.lock();

        match *state {
            DispatcherState::Created => {
                self.spawn_worker()?;
                self.shared.lifecycle.advance(&mut state);
                info!(dispatcher = %self.name(), "Dispatcher started");
                Ok(())
            }
            DispatcherState::Running => Ok(()),
            DispatcherState::ShuttingDown | DispatcherState::Stopped => Err(self.shared.stopped_error()),
        }
    }

    fn shutdown(&self, wait: bool) -> Result<()> {
        {
            let mut state = self.shared.lifecycle.lock();

            // A never-started dispatcher still passes through Running and
            // gets a worker to drain what was queued before start
            let needs_worker = match *state {
                DispatcherState::Created => {
                    self.shared.lifecycle.advance(&mut state);
                    true
                }
                DispatcherState::Running => false,
                DispatcherState::ShuttingDown | DispatcherState::Stopped => {
                    drop(state);
                    return if wait { self.join() } else { Ok(()) };
                }
            };

            self.shared.lifecycle.advance(&mut state);
            info!(dispatcher = %self.name(), "Dispatcher shutting down");

            for entry in self.shared.bindings.iter() {
                entry.value().close(false);
            }
            self.shared.bindings.clear();

            if self.shared.config.shutdown_policy == ShutdownPolicy::Discard {
                let discarded = self.shared.queue.clear();
                self.shared
                    .counters
                    .discarded
                    .fetch_add(discarded as u64, Ordering::Relaxed);
                if discarded > 0 {
                    warn!(dispatcher = %self.name(), "Discarded {} pending demands", discarded);
                }
            }

            self.shared.queue.close();

            // Spawned only now so a discarding shutdown never runs anything
            if needs_worker {
                if let Err(e) = self.spawn_worker() {
                    self.shared.lifecycle.advance(&mut state);
                    return Err(e);
                }
            }
        }

        if wait {
            self.join()
        } else {
            Ok(())
        }
    }

    fn join(&self) -> Result<()> {
        if self.on_worker_thread() {
            warn!(dispatcher = %self.name(), "join() called from the worker thread; not waiting");
            return Ok(());
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| DispatchError::WorkerPanicked(self.name().to_string()))?;
        }

        // Another caller may own the handle
        self.shared.lifecycle.wait_stopped();
        info!(dispatcher = %self.name(), "Dispatcher stopped");
        Ok(())
    }

    fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.counters;
        DispatcherStats {
            executed: counters.executed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            bound_agents: self.shared.bindings.len(),
            queued: self.shared.queue.len(),
        }
    }
}

impl Drop for SingleThreadDispatcher {
    fn drop(&mut self) {
        // Best-effort blocking shutdown
        if self.state() != DispatcherState::Stopped {
            if let Err(e) = self.shutdown(true) {
                error!(dispatcher = %self.name(), "Shutdown on drop failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for SingleThreadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleThreadDispatcher")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
