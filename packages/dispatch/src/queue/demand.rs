// packages/dispatch/src/queue/demand.rs
//! Execution demands
//!
//! A demand is one unit of scheduled work: the target agent plus the
//! closure that runs the agent's event handler. It is created on the
//! delivery path, moved through a bound queue and consumed exactly once
//! by the worker thread.

use crate::dispatcher::agent::AgentRef;
use crate::dispatcher::binding::BindingToken;
use std::any::TypeId;
use std::fmt;
use std::time::Instant;

/// Event handler closure carried by a demand
pub type EventHandler = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// What kind of event a demand represents
///
/// Only queue policies look at this; the dispatcher itself never inspects
/// message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandKind {
    /// Agent start hook
    Start,

    /// Regular event for a message of the given type
    Message {
        type_id: TypeId,
        type_name: &'static str,
    },

    /// Agent finish hook
    Finish,
}

impl DemandKind {
    /// Kind for a message of type `M`
    pub fn message<M: 'static>() -> Self {
        DemandKind::Message {
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            DemandKind::Start => "start",
            DemandKind::Message { type_name, .. } => type_name,
            DemandKind::Finish => "finish",
        }
    }
}

/// A unit of work for an agent
pub struct Demand {
    agent: AgentRef,
    kind: DemandKind,
    handler: EventHandler,
    enqueued_at: Instant,
    binding: Option<BindingToken>,
}

impl Demand {
    pub fn new<F>(agent: AgentRef, kind: DemandKind, handler: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            agent,
            kind,
            handler: Box::new(handler),
            enqueued_at: Instant::now(),
            binding: None,
        }
    }

    pub fn on_start<F>(agent: AgentRef, handler: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::new(agent, DemandKind::Start, handler)
    }

    pub fn message<M: 'static, F>(agent: AgentRef, handler: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::new(agent, DemandKind::message::<M>(), handler)
    }

    pub fn on_finish<F>(agent: AgentRef, handler: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::new(agent, DemandKind::Finish, handler)
    }

    pub fn agent(&self) -> &AgentRef {
        &self.agent
    }

    pub fn kind(&self) -> DemandKind {
        self.kind
    }

    /// When the demand was created
    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn is_start(&self) -> bool {
        self.kind == DemandKind::Start
    }

    pub fn is_finish(&self) -> bool {
        self.kind == DemandKind::Finish
    }

    /// Whether this demand carries a message of type `M`
    pub fn is_message<M: 'static>(&self) -> bool {
        matches!(self.kind, DemandKind::Message { type_id, .. } if type_id == TypeId::of::<M>())
    }

    pub(crate) fn attach_binding(&mut self, token: BindingToken) {
        self.binding = Some(token);
    }

    pub(crate) fn binding(&self) -> Option<&BindingToken> {
        self.binding.as_ref()
    }

    /// Split into the handler and everything else.
    ///
    /// The returned token must outlive the handler call so the binding's
    /// pending count drops only after execution.
    pub(crate) fn into_parts(self) -> (AgentRef, DemandKind, EventHandler, Option<BindingToken>) {
        (self.agent, self.kind, self.handler, self.binding)
    }
}

impl fmt::Debug for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Demand")
            .field("agent", &self.agent)
            .field("kind", &self.kind.label())
            .finish_non_exhaustive()
    }
}
