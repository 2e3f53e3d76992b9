// packages/dispatch/src/queue/mod.rs
//! Demand queues
//!
//! - **Demand**: one unit of work (agent + event handler)
//! - **Policy**: ordering strategies for pending demands (FIFO, priorities)
//! - **Bound Queue**: the lock-guarded MPSC channel the worker drains
//!
//! # Architecture
//!
//! ```text
//! producers ──push_to(lane)──▶ BoundQueue ──pop_blocking──▶ worker
//!                               │
//!                               └─ lanes: Box<dyn DemandQueue> each, served round robin
//!                                  (FifoQueue | PriorityQueue | custom)
//! ```

pub mod bound_queue;
pub mod demand;
pub mod policy;

// Re-export commonly used types
pub use bound_queue::{BoundQueue, LaneId, QueueStats};
pub use demand::{Demand, DemandKind, EventHandler};
pub use policy::{AgentPriorities, Classifier, DemandQueue, FifoQueue, Priority, PriorityQueue};
