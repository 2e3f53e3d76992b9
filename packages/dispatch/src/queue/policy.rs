// packages/dispatch/src/queue/policy.rs
//! Demand queue policies
//!
//! A [`DemandQueue`] decides the order in which pending demands leave a
//! bound queue. The bound queue serialises every call behind its own lock,
//! so implementations need no synchronisation of their own. State shared
//! with the outside world (like [`AgentPriorities`]) must protect itself.
//!
//! # Policies
//!
//! - [`FifoQueue`]: strict arrival order (default)
//! - [`PriorityQueue`]: highest [`Priority`] first, FIFO among equals
//! - [`AgentPriorities`]: per-agent, per-message priority table usable as a
//!   [`PriorityQueue`] classifier

use crate::dispatcher::agent::AgentRef;
use crate::queue::demand::{Demand, DemandKind};
use dashmap::DashMap;
use std::any::TypeId;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use ulid::Ulid;

/// Storage and ordering strategy for pending demands
pub trait DemandQueue: Send {
    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;

    /// Store a demand
    fn push(&mut self, demand: Demand);

    /// Remove the next demand to execute, if any
    fn try_extract(&mut self) -> Option<Demand>;
}

/// Strict FIFO storage
#[derive(Debug, Default)]
pub struct FifoQueue {
    items: VecDeque<Demand>,
}

impl FifoQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DemandQueue for FifoQueue {
    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn push(&mut self, demand: Demand) {
        self.items.push_back(demand);
    }

    fn try_extract(&mut self) -> Option<Demand> {
        self.items.pop_front()
    }
}

/// Demand priority (higher = executed first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

/// Function ranking a demand
pub type Classifier = Box<dyn Fn(&Demand) -> Priority + Send + 'static>;

struct Ranked {
    priority: Priority,
    seq: u64,
    demand: Demand,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then the older sequence number
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority-ordered storage
///
/// Demands of equal priority keep their arrival order.
pub struct PriorityQueue {
    heap: BinaryHeap<Ranked>,
    classifier: Classifier,
    next_seq: u64,
}

impl PriorityQueue {
    /// Create a queue ranking demands with `classifier`
    pub fn new<F>(classifier: F) -> Self
    where
        F: Fn(&Demand) -> Priority + Send + 'static,
    {
        Self {
            heap: BinaryHeap::new(),
            classifier: Box::new(classifier),
            next_seq: 0,
        }
    }
}

impl DemandQueue for PriorityQueue {
    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn push(&mut self, demand: Demand) {
        let priority = (self.classifier)(&demand);
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(Ranked {
            priority,
            seq,
            demand,
        });
    }

    fn try_extract(&mut self) -> Option<Demand> {
        self.heap.pop().map(|ranked| ranked.demand)
    }
}

/// Per-agent message priorities
///
/// Start demands always rank [`Priority::Highest`] and finish demands
/// [`Priority::Lowest`]. A finish demand also forgets the agent's table,
/// since nothing more will be delivered to it. Unknown pairs rank
/// [`Priority::Normal`].
#[derive(Clone, Default)]
pub struct AgentPriorities {
    table: Arc<DashMap<Ulid, HashMap<TypeId, Priority>>>,
}

impl AgentPriorities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority of message type `M` for `agent`
    pub fn define_priority<M: 'static>(&self, agent: &AgentRef, priority: Priority) {
        self.table
            .entry(agent.id())
            .or_default()
            .insert(TypeId::of::<M>(), priority);
    }

    /// Number of agents with a priority table
    pub fn agent_count(&self) -> usize {
        self.table.len()
    }

    /// Rank a demand, forgetting the agent on its finish demand
    pub fn classify(&self, demand: &Demand) -> Priority {
        match demand.kind() {
            DemandKind::Start => Priority::Highest,
            DemandKind::Finish => {
                self.table.remove(&demand.agent().id());
                Priority::Lowest
            }
            DemandKind::Message { type_id, .. } => self
                .table
                .get(&demand.agent().id())
                .and_then(|prios| prios.get(&type_id).copied())
                .unwrap_or_default(),
        }
    }

    /// Classifier closure sharing this table
    pub fn classifier(&self) -> impl Fn(&Demand) -> Priority + Send + Sync + 'static {
        let prios = self.clone();
        move |demand| prios.classify(demand)
    }

    /// A [`PriorityQueue`] driven by this table
    pub fn queue(&self) -> PriorityQueue {
        PriorityQueue::new(self.classifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hello;
    struct Bye;

    fn demand(agent: &AgentRef, kind: DemandKind) -> Demand {
        Demand::new(agent.clone(), kind, || Ok(()))
    }

    fn drain_kinds(queue: &mut dyn DemandQueue) -> Vec<DemandKind> {
        let mut kinds = vec![];
        while let Some(d) = queue.try_extract() {
            kinds.push(d.kind());
        }
        kinds
    }

    #[test]
    fn test_fifo_order() {
        let agent = AgentRef::new("alice");
        let mut queue = FifoQueue::new();

        queue.push(demand(&agent, DemandKind::Start));
        queue.push(demand(&agent, DemandKind::message::<Hello>()));
        queue.push(demand(&agent, DemandKind::Finish));
        assert_eq!(queue.len(), 3);

        assert_eq!(
            drain_kinds(&mut queue),
            vec![DemandKind::Start, DemandKind::message::<Hello>(), DemandKind::Finish]
        );
        assert!(queue.is_empty());
    }


    #[test]
    fn test_priority_order_and_stability() {
        let agent = AgentRef::new("alice");
        let mut queue = PriorityQueue::new(|d: &Demand| {
            if d.is_message::<Bye>() {
                Priority::High
            } else {
                Priority::Normal
            }
        });

        queue.push(demand(&agent, DemandKind::Start));
        queue.push(demand(&agent, DemandKind::message::<Hello>()));
        queue.push(demand(&agent, DemandKind::message::<Bye>()));
        queue.push(demand(&agent, DemandKind::Finish));

        assert_eq!(
            drain_kinds(&mut queue),
            vec![
                DemandKind::message::<Bye>(),
                DemandKind::Start,
                DemandKind::message::<Hello>(),
                DemandKind::Finish,
            ]
        );
    }

    #[test]
    fn test_agent_priorities() {
        let alice = AgentRef::new("alice");
        let bob = AgentRef::new("bob");
        let prios = AgentPriorities::new();

        prios.define_priority::<Hello>(&alice, Priority::Low);
        prios.define_priority::<Bye>(&alice, Priority::High);
        prios.define_priority::<Hello>(&bob, Priority::High);
        prios.define_priority::<Bye>(&bob, Priority::Low);
        assert_eq!(prios.agent_count(), 2);

        let hello_a = demand(&alice, DemandKind::message::<Hello>());
        let hello_b = demand(&bob, DemandKind::message::<Hello>());
        assert_eq!(prios.classify(&hello_a), Priority::Low);
        assert_eq!(prios.classify(&hello_b), Priority::High);

        struct Other;
        let other = demand(&alice, DemandKind::message::<Other>());
        assert_eq!(prios.classify(&other), Priority::Normal);

        assert_eq!(prios.classify(&demand(&alice, DemandKind::Start)), Priority::Highest);

        // Finish forgets the agent
        assert_eq!(prios.classify(&demand(&alice, DemandKind::Finish)), Priority::Lowest);
        assert_eq!(prios.agent_count(), 1);
        assert_eq!(prios.classify(&hello_a), Priority::Normal);
    }

    #[test]
    fn test_agent_priorities_queue() {
        let alice = AgentRef::new("alice");
        let prios = AgentPriorities::new();
        prios.define_priority::<Bye>(&alice, Priority::High);
        prios.define_priority::<Hello>(&alice, Priority::Low);

        let mut queue = prios.queue();
        queue.push(demand(&alice, DemandKind::message::<Hello>()));
        queue.push(demand(&alice, DemandKind::message::<Bye>()));
        queue.push(demand(&alice, DemandKind::Start));

        assert_eq!(
            drain_kinds(&mut queue),
            vec![
                DemandKind::Start,
                DemandKind::message::<Bye>(),
                DemandKind::message::<Hello>(),
            ]
        );
    }
}
