//! Coalescing reconcile-request queue.
//!
//! A set keyed by cluster identity with FIFO order: any number of events
//! for one cluster collapse into at most one pending entry, and an
//! identity checked out by a worker is handed out again at most once more
//! no matter how many events arrived while the attempt ran.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use converge_core::ObjectId;
use metrics::counter;
use rustc_hash::FxHashSet;
use tokio::sync::Notify;

#[derive(Default)]
struct State {
    pending: FxHashSet<ObjectId>,
    order: VecDeque<ObjectId>,
    /// Checked out by a worker right now.
    active: FxHashSet<ObjectId>,
    /// Events arrived while active; re-enqueued on `done`.
    dirty: FxHashSet<ObjectId>,
}

/// Shared work queue; hold it in an `Arc`, one clone per producer and
/// worker.
#[derive(Default)]
pub struct RequestQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("queue lock poisoned")
    }

    /// Enqueue a reconcile request. Identities already pending coalesce;
    /// identities currently being reconciled are marked dirty and
    /// re-enqueued once when their attempt finishes.
    pub fn enqueue(&self, id: ObjectId) {
        let mut state = self.lock();
        if state.active.contains(&id) {
            state.dirty.insert(id);
            return;
        }
        if state.pending.insert(id.clone()) {
            state.order.push_back(id);
            counter!("queue_enqueued", 1u64);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Non-blocking checkout; the returned identity stays active until
    /// [`RequestQueue::done`].
    pub fn try_next(&self) -> Option<ObjectId> {
        let mut state = self.lock();
        let id = state.order.pop_front()?;
        state.pending.remove(&id);
        state.active.insert(id.clone());
        Some(id)
    }

    /// Await the next identity.
    pub async fn next(&self) -> ObjectId {
        loop {
            let notified = self.notify.notified();
            if let Some(id) = self.try_next() {
                return id;
            }
            notified.await;
        }
    }

    /// Release an identity after an attempt; re-enqueues it if events
    /// arrived while it was active.
    pub fn done(&self, id: &ObjectId) {
        let mut state = self.lock();
        state.active.remove(id);
        let dirty = state.dirty.remove(id);
        drop(state);
        if dirty {
            self.enqueue(id.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
