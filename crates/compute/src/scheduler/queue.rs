//! Shared counting queue of pending work-item indices.
//!
//! Delivers every enqueued index to exactly one caller of
//! [`WorkQueue::try_dequeue`]. [`WorkQueue::join`] blocks until every
//! enqueued index has been dequeued and marked done.

use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::QueueError;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<usize>,
    in_flight: HashSet<usize>,
}

impl QueueState {
    fn is_settled(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    settled: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue pre-filled with `0..count`.
    pub fn with_indices(count: usize) -> Self {
        let queue = Self::new();
        queue.lock().pending.extend(0..count);
        queue
    }

    // Every update is a single collection call, so a poisoned state is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next pending index, or `None` once the queue is drained.
    pub fn try_dequeue(&self) -> Option<usize> {
        let mut state = self.lock();
        let index = state.pending.pop_front()?;
        state.in_flight.insert(index);
        Some(index)
    }

    /// Like [`try_dequeue`](Self::try_dequeue), but the returned guard
    /// marks the index done when dropped, even during a panic.
    pub fn dequeue_guarded(&self) -> Option<Completion<'_>> {
        self.try_dequeue().map(|index| Completion { queue: self, index })
    }

    /// Record that a dequeued index has been fully processed.
    pub fn mark_done(&self, index: usize) -> Result<(), QueueError> {
        let mut state = self.lock();
        if !state.in_flight.remove(&index) {
            return Err(QueueError::NotInFlight(index));
        }
        if state.is_settled() {
            self.settled.notify_all();
        }
        Ok(())
    }

    /// Block until every enqueued index has been marked done.
    pub fn join(&self) {
        let state = self.lock();
        let _settled = self
            .settled
            .wait_while(state, |s| !s.is_settled())
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Indices not yet dequeued.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Indices dequeued but not yet marked done.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }
}

/// Ownership of one dequeued index; marks it done on drop.
#[derive(Debug)]
pub struct Completion<'q> {
    queue: &'q WorkQueue,
    index: usize,
}

impl Completion<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        // Only fails if someone already marked this index done by hand.
        let _ = self.queue.mark_done(self.index);
    }
}
