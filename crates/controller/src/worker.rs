//! Worker pool: pulls identities from the queue, runs attempts, schedules
//! backoff requeues on failure.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use converge_core::ObjectId;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::queue::RequestQueue;
use crate::reconcile::{Outcome, Reconciler};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Consecutive-failure counts per identity, reset on success.
#[derive(Default)]
struct Failures(Mutex<FxHashMap<ObjectId, u32>>);

impl Failures {
    fn bump(&self, id: &ObjectId) -> u32 {
        let mut map = self.0.lock().expect("failure map lock poisoned");
        let count = map.entry(id.clone()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset(&self, id: &ObjectId) {
        self.0.lock().expect("failure map lock poisoned").remove(id);
    }
}

fn backoff(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    BACKOFF_BASE.saturating_mul(1 << shift).min(BACKOFF_CAP)
}

/// Spawn `count` workers sharing one queue and reconciler. Each worker
/// runs attempts to completion; a failed identity is re-enqueued after an
/// exponential delay.
pub fn spawn_workers(
    count: usize,
    queue: Arc<RequestQueue>,
    reconciler: Arc<Reconciler>,
) -> Vec<JoinHandle<()>> {
    let failures = Arc::new(Failures::default());
    (0..count.max(1))
        .map(|worker| {
            let queue = Arc::clone(&queue);
            let reconciler = Arc::clone(&reconciler);
            let failures = Arc::clone(&failures);
            tokio::spawn(async move {
                debug!(worker, "worker started");
                loop {
                    let id = queue.next().await;
                    let result = reconciler.reconcile(&id).await;
                    queue.done(&id);
                    match result {
                        Ok(outcome) => {
                            failures.reset(&id);
                            if outcome == Outcome::Gone {
                                debug!(cluster = %id, "dropped deleted cluster");
                            }
                        }
                        Err(err) => {
                            let attempt = failures.bump(&id);
                            let delay = backoff(attempt);
                            warn!(
                                cluster = %id,
                                error = %err,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "reconcile failed; requeueing"
                            );
                            let queue = Arc::clone(&queue);
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                queue.enqueue(id);
                            });
                        }
                    }
                }
            })
        })
        .collect()
}
