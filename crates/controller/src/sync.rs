//! Ordered child-resource synchronization with optimistic writes.

use converge_core::Syncer;
use converge_store::{ObjectStore, StoreError};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info};

/// Bounded retries for optimistic-write conflicts; each retry re-reads.
const CONFLICT_RETRIES: usize = 3;

/// Errors from one syncer pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("computing desired {kind}: {source}")]
    Desired {
        kind: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Executes an ordered syncer sequence against the store, stopping at the
/// first failure. Children already converged stay converged; the next
/// attempt resumes from scratch.
pub struct SyncOrchestrator<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    pub async fn run(&self, syncers: &mut [Box<dyn Syncer>]) -> Result<(), SyncError> {
        for syncer in syncers {
            self.sync_one(syncer.as_mut()).await?;
        }
        Ok(())
    }

    async fn sync_one(&self, syncer: &mut dyn Syncer) -> Result<(), SyncError> {
        let target = syncer.object_ref();
        let mut conflicts = 0;
        loop {
            let current = self.store.get(&target).await?;
            let desired = syncer
                .desired_body(current.as_ref().map(|c| &c.body))
                .map_err(|source| SyncError::Desired { kind: syncer.child().kind(), source })?;

            let result = match &current {
                None => self.store.create(&target, desired).await,
                Some(existing) => {
                    if bodies_equal(&existing.body, &desired) {
                        debug!(target = %target, "in sync");
                        syncer.publish_revision(existing.revision.clone());
                        return Ok(());
                    }
                    self.store.update(&target, &existing.revision, desired).await
                }
            };

            match result {
                Ok(revision) => {
                    info!(target = %target, revision = %revision, created = current.is_none(), "child synced");
                    counter!("child_sync_writes", 1u64);
                    syncer.publish_revision(revision);
                    return Ok(());
                }
                // A benign race with another writer; re-read and retry.
                Err(StoreError::Conflict(msg)) if conflicts < CONFLICT_RETRIES => {
                    conflicts += 1;
                    counter!("child_sync_conflicts", 1u64);
                    debug!(target = %target, attempt = conflicts, %msg, "write conflict; re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Structural comparison modulo server-managed fields.
fn bodies_equal(current: &Value, desired: &Value) -> bool {
    normalized(current) == normalized(desired)
}

fn normalized(body: &Value) -> Value {
    let mut v = body.clone();
    if let Some(obj) = v.as_object_mut() {
        obj.remove("status");
    }
    if let Some(meta) = v.get_mut("metadata").and_then(Value::as_object_mut) {
        for key in ["uid", "resourceVersion", "generation", "creationTimestamp", "managedFields"] {
            meta.remove(key);
        }
    }
    v
}
