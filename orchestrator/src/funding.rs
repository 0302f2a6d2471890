//! The funding queue: workers waiting for a treasury refund.
//!
//! Many worker tasks push (multiple producers); only the orchestrator's
//! refund loop pops (single consumer). A worker is tracked as pending from
//! the moment it is pushed until the refund loop calls
//! [`FundingQueue::complete`], so it can never be queued twice at once, even
//! while its funding transfer is in flight.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::worker::WorkerHandle;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Arc<WorkerHandle>>,
    pending: HashSet<u64>,
}

/// FIFO of low-on-funds workers.
#[derive(Default)]
pub struct FundingQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl FundingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a worker. Returns `false` if it is already queued or being funded.
    pub fn push(&self, worker: Arc<WorkerHandle>) -> bool {
        {
            let mut state = self.lock();
            if !state.pending.insert(worker.id()) {
                return false;
            }
            state.queue.push_back(worker);
        }
        self.notify.notify_one();
        true
    }

    /// Take the next worker to fund. It stays pending until [`complete`](Self::complete).
    pub fn pop(&self) -> Option<Arc<WorkerHandle>> {
        self.lock().queue.pop_front()
    }

    /// Put a worker whose funding failed at the back of the queue.
    pub fn requeue(&self, worker: Arc<WorkerHandle>) {
        {
            let mut state = self.lock();
            state.pending.insert(worker.id());
            state.queue.push_back(worker);
        }
        self.notify.notify_one();
    }

    /// Mark a popped worker as done; it may be queued again afterwards.
    pub fn complete(&self, worker_id: u64) {
        self.lock().pending.remove(&worker_id);
    }

    /// Number of workers queued or in flight.
    pub fn depth(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of workers waiting to be popped.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Resolves after the next push.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
