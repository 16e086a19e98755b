//! In-process FIFO hand-off of jobs to a consuming worker.
//!
//! Nothing here is persisted: jobs are registered with the
//! [`JobRegistry`](crate::registry::JobRegistry) first and only then handed to
//! the queue. The queue has no knowledge of the registry.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use imgjobs_core::Job;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Nothing queued right now (non-blocking dequeue).
    #[error("dispatch queue is empty")]
    Empty,

    /// The queue was closed; no more items will arrive.
    #[error("dispatch queue is closed")]
    Closed,

    /// A bounded wait ran out before an item arrived.
    #[error("timed out waiting for a queued item")]
    Timeout,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded, strictly FIFO, mutex-guarded queue.
///
/// - `enqueue` never blocks
/// - `dequeue` blocks until an item arrives or the queue is closed
/// - after `close`, already-queued items are still delivered
pub struct DispatchQueue<T = Job> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append to the tail and wake one waiting consumer.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        state.items.push_back(item);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Remove and return the head, blocking while the queue is empty.
    ///
    /// Returns `QueueError::Closed` once the queue is closed and drained.
    pub fn dequeue(&self) -> Result<T, QueueError> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            self.available.wait(&mut state);
        }
    }

    /// Remove and return the head without waiting.
    pub fn try_dequeue(&self) -> Result<T, QueueError> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(item) => Ok(item),
            None if state.closed => Err(QueueError::Closed),
            None => Err(QueueError::Empty),
        }
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.dequeue();
        };
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            // Spurious wakeups loop back; the deadline decides.
            if self.available.wait_until(&mut state, deadline).timed_out()
                && state.items.is_empty()
            {
                return Err(if state.closed {
                    QueueError::Closed
                } else {
                    QueueError::Timeout
                });
            }
        }
    }

    /// Head of the queue without removing it.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.state.lock().items.front().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Stop accepting items and wake every waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Copy of the current contents, head first.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.state.lock().items.iter().cloned().collect()
    }

    /// Log the current contents at debug level.
    pub fn display(&self)
    where
        T: fmt::Debug,
    {
        let state = self.state.lock();
        tracing::debug!(len = state.items.len(), closed = state.closed, "dispatch queue");
        for (position, item) in state.items.iter().enumerate() {
            tracing::debug!(position, ?item, "queued");
        }
    }
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for DispatchQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DispatchQueue")
            .field("items", &state.items)
            .field("closed", &state.closed)
            .finish()
    }
}
