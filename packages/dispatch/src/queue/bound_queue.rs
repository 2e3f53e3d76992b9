// packages/dispatch/src/queue/bound_queue.rs
//! Bound queue: multi-producer, single-consumer demand channel
//!
//! Producers (framework delivery paths) push demands; the dispatcher's
//! worker thread pops them. The only shared mutable state is the storage
//! behind one `parking_lot` mutex; producers hold it just long enough to
//! append, the consumer parks on a condvar while the queue is empty.
//!
//! # Lanes
//!
//! Storage is split into lanes, each with its own [`DemandQueue`] policy.
//! Every dispatcher queue has a default lane; binders add more. Non-empty
//! lanes wait in a ready ring and are served one demand per turn, so a busy
//! lane cannot starve the others while each lane keeps its own order.
//!
//! ```text
//! ready: [lane 2] ─▶ [lane 0] ─▶ [lane 1]
//!           │
//!           └─ try_extract() one demand, back to the tail if still non-empty
//! ```
//!
//! # Closure
//!
//! ```text
//! open ──close()──▶ closed, draining ──last pop──▶ closed, drained
//!  push: Ok          push: QueueClosed              pop: None (forever)
//! ```

use crate::queue::demand::Demand;
use crate::queue::policy::{DemandQueue, FifoQueue};
use crate::utils::errors::{DispatchError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Identifies one lane of a [`BoundQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneId(usize);

impl LaneId {
    /// The lane every queue is created with
    pub const DEFAULT: LaneId = LaneId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

struct State {
    lanes: Vec<Box<dyn DemandQueue>>,
    /// Non-empty lanes in service order; each appears at most once
    ready: VecDeque<usize>,
    len: usize,
    closed: bool,
}

impl State {
    /// Next demand in round-robin lane order
    fn extract(&mut self) -> Option<Demand> {
        while let Some(lane) = self.ready.pop_front() {
            let items = &mut self.lanes[lane];
            let demand = items.try_extract();
            if !items.is_empty() {
                self.ready.push_back(lane);
            }
            if demand.is_some() {
                self.len -= 1;
                return demand;
            }
        }
        None
    }
}

/// Ordered, thread-safe container of pending demands
pub struct BoundQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    push_count: AtomicU64,
    pop_count: AtomicU64,
    reject_count: AtomicU64,
}

impl BoundQueue {
    /// Create a queue whose default lane is FIFO
    pub fn new() -> Self {
        Self::with_policy(FifoQueue::new())
    }

    /// Create a queue whose default lane uses a custom policy
    pub fn with_policy<Q: DemandQueue + 'static>(policy: Q) -> Self {
        Self::from_boxed(Box::new(policy))
    }

    /// Create a queue whose default lane uses an already boxed policy
    pub fn from_boxed(policy: Box<dyn DemandQueue>) -> Self {
        Self {
            state: Mutex::new(State {
                lanes: vec![policy],
                ready: VecDeque::new(),
                len: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            reject_count: AtomicU64::new(0),
        }
    }

    /// Add a lane ordered by `policy`
    pub fn add_lane(&self, policy: Box<dyn DemandQueue>) -> LaneId {
        let mut state = self.state.lock();
        state.lanes.push(policy);
        LaneId(state.lanes.len() - 1)
    }

    pub fn lane_count(&self) -> usize {
        self.state.lock().lanes.len()
    }

    /// Append a demand to the default lane
    pub fn push(&self, demand: Demand) -> Result<()> {
        self.push_to(LaneId::DEFAULT, demand)
    }

    /// Append a demand to `lane` and wake the consumer.
    ///
    /// Fails with [`DispatchError::QueueClosed`] once the queue is closed;
    /// the rejected demand is dropped without running. Unknown lanes are
    /// served through the default lane.
    pub fn push_to(&self, lane: LaneId, demand: Demand) -> Result<()> {
        let mut state = self.state.lock();

        if state.closed {
            drop(state);
            self.reject_count.fetch_add(1, Ordering::Relaxed);
            trace!("Rejected {:?}: queue closed", demand);
            return Err(DispatchError::QueueClosed);
        }

        let lane = if lane.0 < state.lanes.len() { lane.0 } else { 0 };
        let items = &mut state.lanes[lane];
        let was_empty = items.is_empty();
        items.push(demand);
        if was_empty {
            state.ready.push_back(lane);
        }
        state.len += 1;
        drop(state);

        self.push_count.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the next demand, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained, and on every
    /// call after that.
    pub fn pop_blocking(&self) -> Option<Demand> {
        let mut state = self.state.lock();

        loop {
            if let Some(demand) = state.extract() {
                self.pop_count.fetch_add(1, Ordering::Relaxed);
                return Some(demand);
            }

            if state.closed {
                return None;
            }

            self.not_empty.wait(&mut state);
        }
    }

    /// Like [`pop_blocking`](Self::pop_blocking) but gives up after `timeout`.
    ///
    /// `None` means either the timeout elapsed or the queue is closed and
    /// drained; check [`is_closed`](Self::is_closed) to tell them apart.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Demand> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if let Some(demand) = state.extract() {
                self.pop_count.fetch_add(1, Ordering::Relaxed);
                return Some(demand);
            }

            if state.closed {
                return None;
            }

            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                let demand = state.extract();
                if demand.is_some() {
                    self.pop_count.fetch_add(1, Ordering::Relaxed);
                }
                return demand;
            }
        }
    }

    /// Remove the next demand without blocking
    pub fn try_pop(&self) -> Option<Demand> {
        let demand = self.state.lock().extract();

        if demand.is_some() {
            self.pop_count.fetch_add(1, Ordering::Relaxed);
        }

        demand
    }

    /// Refuse further pushes and wake any blocked consumer.
    ///
    /// Already-queued demands stay retrievable. Returns `false` if the
    /// queue was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let newly_closed = !state.closed;
        state.closed = true;
        drop(state);

        self.not_empty.notify_all();
        newly_closed
    }

    /// Drop every pending demand in every lane, returning how many were dropped
    pub fn clear(&self) -> usize {
        // Dropped outside the lock: demand destructors touch binding state
        let mut drained = Vec::new();
        {
            let mut state = self.state.lock();
            while let Some(demand) = state.extract() {
                drained.push(demand);
            }
        }
        drained.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        let (current_len, lanes) = {
            let state = self.state.lock();
            (state.len, state.lanes.len())
        };

        QueueStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            reject_count: self.reject_count.load(Ordering::Relaxed),
            current_len,
            lanes,
        }
    }
}

impl Default for BoundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Total demands accepted
    pub push_count: u64,

    /// Total demands handed to a consumer
    pub pop_count: u64,

    /// Total pushes refused because the queue was closed
    pub reject_count: u64,

    /// Demands currently waiting
    pub current_len: usize,

    /// Lanes, including the default one
    pub lanes: usize,
}
