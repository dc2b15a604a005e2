//! Condition-variable work queue.
//!
//! The queue is the sole arbiter of the handoff between the
//! transport's handler thread and the worker thread: items go in
//! under the mutex, the worker blocks on the condvar, and shutdown is
//! a stop flag plus a broadcast.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use inferlink_backend::InferRequest;

/// A queued, not-yet-processed inference request.
#[derive(Debug)]
pub struct WorkItem {
    pub req: InferRequest,
}

struct QueueInner {
    items: VecDeque<WorkItem>,
    stopped: bool,
}

/// FIFO queue with blocking pop and explicit shutdown.
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                stopped: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Append one item and wake the worker. Returns false when the
    /// queue has been shut down (the item is discarded).
    pub fn push(&self, item: WorkItem) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.stopped {
            return false;
        }
        inner.items.push_back(item);
        self.cv.notify_one();
        true
    }

    /// Block until an item is available or the queue is shut down.
    /// Returns `None` on shutdown; items queued before shutdown are
    /// still drained first.
    pub fn pop(&self) -> Option<WorkItem> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.stopped {
                return None;
            }
            inner = self.cv.wait(inner).unwrap();
        }
    }

    /// Set the stop flag and wake every waiter.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stopped = true;
        self.cv.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
