// packages/dispatch/src/dispatcher/binding.rs
//! Agent bindings
//!
//! A binding links one agent to one dispatcher. The framework's delivery
//! path holds a [`BindingHandle`] and pushes demands through it; the
//! dispatcher keeps the shared [`BindingState`] to close the binding on
//! unbind and to decide at execution time whether a demand still runs.
//!
//! The agent's binding slot is held until the binding is closed *and* its
//! last queued demand is gone. Until then the agent cannot bind anywhere
//! else, so its handlers never run on two workers at once.
//!
//! ```text
//! BindingHandle ──push──▶ BoundQueue ──pop──▶ worker
//!      │                                        │
//!      └──────────── Arc<BindingState> ◀────────┘
//!                    (open / discard / deactivated / pending)
//! ```

use crate::dispatcher::agent::AgentRef;
use crate::queue::bound_queue::{BoundQueue, LaneId};
use crate::queue::demand::{Demand, DemandKind};
use crate::utils::errors::{DispatchError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Why the worker skipped a demand instead of running it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The agent was unbound under the discard policy
    Unbound,

    /// The error hook deactivated the agent
    Deactivated,
}

/// State shared by a binding's handles, its queued demands and the dispatcher
pub(crate) struct BindingState {
    agent: AgentRef,
    dispatcher: String,
    open: RwLock<bool>,
    closed: AtomicBool,
    slot_released: AtomicBool,
    discard_pending: AtomicBool,
    deactivated: AtomicBool,
    pending: AtomicUsize,
}

impl BindingState {
    pub(crate) fn new(agent: AgentRef, dispatcher: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            dispatcher: dispatcher.into(),
            open: RwLock::new(true),
            closed: AtomicBool::new(false),
            slot_released: AtomicBool::new(false),
            discard_pending: AtomicBool::new(false),
            deactivated: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
        })
    }

    pub(crate) fn agent(&self) -> &AgentRef {
        &self.agent
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.open.read()
    }

    /// Refuse further pushes. Once this returns no push can still succeed.
    ///
    /// The agent's slot is released now if nothing is pending, otherwise
    /// when the last pending demand is dropped.
    pub(crate) fn close(&self, discard_pending: bool) {
        {
            let mut open = self.open.write();
            *open = false;
            if discard_pending {
                self.discard_pending.store(true, Ordering::Release);
            }
            self.closed.store(true, Ordering::SeqCst);
        }
        self.release_slot_if_drained();
    }

    /// Whether the agent's slot has been handed back
    pub(crate) fn is_released(&self) -> bool {
        self.slot_released.load(Ordering::SeqCst)
    }

    fn release_slot_if_drained(&self) {
        if !self.closed.load(Ordering::SeqCst) || self.pending.load(Ordering::SeqCst) != 0 {
            return;
        }
        if !self.slot_released.swap(true, Ordering::SeqCst) {
            self.agent.release_binding(&self.dispatcher);
        }
    }

    pub(crate) fn deactivate(&self) {
        self.deactivated.store(true, Ordering::Release);
    }

    pub(crate) fn is_deactivated(&self) -> bool {
        self.deactivated.load(Ordering::Acquire)
    }

    /// Whether a queued demand of this binding must be skipped
    pub(crate) fn skip_reason(&self) -> Option<SkipReason> {
        if self.deactivated.load(Ordering::Acquire) {
            Some(SkipReason::Deactivated)
        } else if self.discard_pending.load(Ordering::Acquire) {
            Some(SkipReason::Unbound)
        } else {
            None
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Ties a queued demand to its binding's pending count.
///
/// The count drops when the demand is gone: executed, skipped, cleared or
/// rejected by a closed queue.
pub(crate) struct BindingToken(Arc<BindingState>);

impl BindingToken {
    fn new(state: Arc<BindingState>) -> Self {
        state.pending.fetch_add(1, Ordering::SeqCst);
        Self(state)
    }

    pub(crate) fn state(&self) -> &BindingState {
        &self.0
    }
}

impl Drop for BindingToken {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.release_slot_if_drained();
        }
    }
}

/// Queue-binding handle returned by `bind`
///
/// Used by the framework's message-delivery path to enqueue demands for
/// the bound agent. Clones share the binding.
#[derive(Clone)]
pub struct BindingHandle {
    state: Arc<BindingState>,
    queue: Arc<BoundQueue>,
    lane: LaneId,
}

impl BindingHandle {
    pub(crate) fn new(state: Arc<BindingState>, queue: Arc<BoundQueue>, lane: LaneId) -> Self {
        Self { state, queue, lane }
    }

    pub fn agent(&self) -> &AgentRef {
        &self.state.agent
    }

    /// Name of the dispatcher this binding belongs to
    pub fn dispatcher(&self) -> &str {
        &self.state.dispatcher
    }

    /// False after unbind or dispatcher shutdown
    pub fn is_open(&self) -> bool {
        self.state.is_open() && !self.queue.is_closed()
    }

    /// Queue lane this binding pushes into
    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// Demands pushed through this binding that have not finished yet
    pub fn pending(&self) -> usize {
        self.state.pending()
    }

    pub fn is_deactivated(&self) -> bool {
        self.state.is_deactivated()
    }

    /// True once the binding is closed and drained; the agent may bind again
    pub fn is_released(&self) -> bool {
        self.state.is_released()
    }

    /// Enqueue an event for the bound agent
    pub fn push<F>(&self, kind: DemandKind, handler: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push_demand(Demand::new(self.state.agent.clone(), kind, handler))
    }

    /// Enqueue a message event of type `M`
    pub fn send_message<M: 'static, F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push(DemandKind::message::<M>(), handler)
    }

    pub fn push_start<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push(DemandKind::Start, handler)
    }

    pub fn push_finish<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push(DemandKind::Finish, handler)
    }

    /// Enqueue a prepared demand; it must target the bound agent
    pub fn push_demand(&self, mut demand: Demand) -> Result<()> {
        if demand.agent() != &self.state.agent {
            return Err(DispatchError::NotBound {
                agent: demand.agent().name().to_string(),
                dispatcher: self.state.dispatcher.clone(),
            });
        }

        // Held across the push so unbind cannot slip in between
        let open = self.state.open.read();
        if !*open {
            return Err(DispatchError::QueueClosed);
        }

        demand.attach_binding(BindingToken::new(Arc::clone(&self.state)));
        self.queue.push_to(self.lane, demand)
    }
}

impl std::fmt::Debug for BindingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingHandle")
            .field("agent", &self.state.agent)
            .field("dispatcher", &self.state.dispatcher)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(agent: &AgentRef) -> (BindingHandle, Arc<BindingState>, Arc<BoundQueue>) {
        let state = BindingState::new(agent.clone(), "test");
        let queue = Arc::new(BoundQueue::new());
        (
            BindingHandle::new(Arc::clone(&state), Arc::clone(&queue), LaneId::DEFAULT),
            state,
            queue,
        )
    }

    #[test]
    fn test_push_tracks_pending() {
        let agent = AgentRef::new("alice");
        let (handle, _state, queue) = handle(&agent);

        handle.push_start(|| Ok(())).unwrap();
        handle.send_message::<u32, _>(|| Ok(())).unwrap();
        assert_eq!(handle.pending(), 2);
        assert_eq!(queue.len(), 2);

        let demand = queue.try_pop().unwrap();
        assert!(demand.binding().is_some());
        assert_eq!(handle.pending(), 2);
        drop(demand);
        assert_eq!(handle.pending(), 1);

        assert_eq!(queue.clear(), 1);
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test_closed_binding_rejects_push() {
        let agent = AgentRef::new("alice");
        let (handle, state, queue) = handle(&agent);

        state.close(false);
        assert!(!handle.is_open());

        let result = handle.push_finish(|| Ok(()));
        assert!(matches!(result, Err(DispatchError::QueueClosed)));
        assert_eq!(handle.pending(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_closed_queue_rejects_push() {
        let agent = AgentRef::new("alice");
        let (handle, _state, queue) = handle(&agent);

        queue.close();
        assert!(!handle.is_open());
        assert!(matches!(
            handle.push_start(|| Ok(())),
            Err(DispatchError::QueueClosed)
        ));
        // The rejected demand released its token
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test_foreign_demand_rejected() {
        let alice = AgentRef::new("alice");
        let bob = AgentRef::new("bob");
        let (handle, _state, _queue) = handle(&alice);

        let result = handle.push_demand(Demand::on_start(bob, || Ok(())));
        assert!(matches!(result, Err(DispatchError::NotBound { .. })));
    }

    #[test]
    fn test_skip_reasons() {
        let agent = AgentRef::new("alice");
        let (_handle, state, _queue) = handle(&agent);

        assert_eq!(state.skip_reason(), None);

        state.close(false);
        assert_eq!(state.skip_reason(), None);

        state.close(true);
        assert_eq!(state.skip_reason(), Some(SkipReason::Unbound));

        state.deactivate();
        assert_eq!(state.skip_reason(), Some(SkipReason::Deactivated));
    }

    #[test]
    fn test_slot_held_until_drained() {
        let agent = AgentRef::new("alice");
        agent.claim_binding("test").unwrap();
        let (handle, state, queue) = handle(&agent);

        handle.push_start(|| Ok(())).unwrap();
        handle.push_finish(|| Ok(())).unwrap();
        state.close(false);

        // Closed but still draining: nobody else may claim the agent
        assert!(!handle.is_released());
        assert!(matches!(
            agent.claim_binding("other"),
            Err(DispatchError::AlreadyBound { .. })
        ));

        let first = queue.try_pop().unwrap();
        drop(first);
        assert!(agent.is_bound());

        let last = queue.try_pop().unwrap();
        drop(last);
        assert!(handle.is_released());
        assert!(!agent.is_bound());
        agent.claim_binding("other").unwrap();
    }

    #[test]
    fn test_idle_binding_released_on_close() {
        let agent = AgentRef::new("alice");
        agent.claim_binding("test").unwrap();
        let (handle, state, _queue) = handle(&agent);

        state.close(true);
        assert!(handle.is_released());
        assert!(!agent.is_bound());
    }

    #[test]
    fn test_push_to_own_lane() {
        let agent = AgentRef::new("alice");
        let state = BindingState::new(agent.clone(), "test");
        let queue = Arc::new(BoundQueue::new());
        let lane = queue.add_lane(Box::new(crate::queue::FifoQueue::new()));
        let handle = BindingHandle::new(state, Arc::clone(&queue), lane);

        assert_eq!(handle.lane(), lane);
        handle.push_start(|| Ok(())).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_pop().unwrap().kind(), DemandKind::Start);
    }
}
