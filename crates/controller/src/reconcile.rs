//! Per-cluster reconciliation: fetch, default, sync children in order,
//! record status.

use std::sync::Arc;
use std::time::Instant;

use converge_core::{
    set_defaults, ChildResource, DbCluster, DbClusterStatus, ObjectId, ObjectRef, Options, Syncer,
    CLUSTER_GVK,
};
use converge_store::{ObjectStore, StoreError};
use converge_syncer::{
    ConfigSyncer, CredentialSyncer, DisruptionBudgetSyncer, ServiceSyncer, WorkloadSyncer,
};
use metrics::{counter, histogram};
use tracing::{debug, error, info};

use crate::sync::{SyncError, SyncOrchestrator};

/// Terminal result of a successful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// All children converged; wait for the next watch event.
    Converged,
    /// The cluster no longer exists; nothing to do.
    Gone,
}

/// Shared dependencies for reconcile attempts, built once at startup.
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub options: Arc<Options>,
}

pub struct Reconciler {
    ctx: Context,
}

impl Reconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Run one attempt to completion. Errors are retryable; the caller
    /// re-enqueues with backoff.
    pub async fn reconcile(&self, id: &ObjectId) -> Result<Outcome, SyncError> {
        let started = Instant::now();
        counter!("reconcile_attempts", 1u64);

        let target = cluster_ref(id);
        let Some(stored) = self.ctx.store.get(&target).await? else {
            // Children cascade away via owner references; nothing to undo.
            debug!(cluster = %id, "cluster gone");
            return Ok(Outcome::Gone);
        };
        let mut cluster: DbCluster = serde_json::from_value(stored.body).map_err(|err| {
            SyncError::Store(StoreError::Backend(format!("decoding cluster {id}: {err}")))
        })?;

        set_defaults(&mut cluster.spec, &self.ctx.options);
        info!(cluster = %id, "syncing cluster");

        let before = cluster.status.clone().unwrap_or_default();
        let mut status = before.clone();

        let result = self.sync_children(&cluster, &mut status).await;
        match &result {
            Ok(()) => {
                status.set_condition("Ready", "True", "ChildrenSynced", "all child resources converged");
            }
            Err(err) => {
                status.set_condition("Ready", "False", "SyncFailed", &err.to_string());
            }
        }

        // One status write, and only when something actually changed. A
        // failure here self-heals: the next attempt recomputes the same
        // diff from scratch.
        if status != before {
            match serde_json::to_value(&status) {
                Ok(value) => {
                    if let Err(err) = self.ctx.store.update_status(&target, value).await {
                        error!(cluster = %id, error = %err, "failed to update cluster status");
                    }
                }
                Err(err) => error!(cluster = %id, error = %err, "failed to encode cluster status"),
            }
        }

        histogram!("reconcile_latency_ms", started.elapsed().as_secs_f64() * 1000.0);
        match result {
            Ok(()) => Ok(Outcome::Converged),
            Err(err) => {
                counter!("reconcile_errors", 1u64);
                Err(err)
            }
        }
    }

    async fn sync_children(
        &self,
        cluster: &DbCluster,
        status: &mut DbClusterStatus,
    ) -> Result<(), SyncError> {
        let orchestrator = SyncOrchestrator::new(self.ctx.store.as_ref());

        // Config and credentials first; their revisions gate the workload
        // rollout.
        let mut head: Vec<Box<dyn Syncer>> = vec![
            Box::new(ConfigSyncer::new(cluster)),
            Box::new(CredentialSyncer::new(cluster)),
        ];
        orchestrator.run(&mut head).await?;

        let config_revision = head[0].revision().unwrap_or_default().to_string();
        let secret_revision = head[1].revision().unwrap_or_default().to_string();

        let mut rest: Vec<Box<dyn Syncer>> = vec![
            Box::new(ServiceSyncer::headless(cluster)),
            Box::new(ServiceSyncer::primary(cluster)),
            Box::new(ServiceSyncer::healthy(cluster)),
            Box::new(WorkloadSyncer::new(
                cluster,
                &config_revision,
                &secret_revision,
                &self.ctx.options,
            )),
        ];
        if cluster.has_disruption_budget() {
            rest.push(Box::new(DisruptionBudgetSyncer::new(cluster)));
        }
        orchestrator.run(&mut rest).await?;

        if !cluster.has_disruption_budget() {
            self.remove_disruption_budget(cluster).await?;
        }

        status.synced_revisions.clear();
        for syncer in head.iter().chain(rest.iter()) {
            if let Some(revision) = syncer.revision() {
                let target = syncer.object_ref();
                status
                    .synced_revisions
                    .insert(format!("{}/{}", syncer.child().kind(), target.name), revision.to_string());
            }
        }
        Ok(())
    }

    /// The budget is the one child whose lifetime tracks a spec field:
    /// clearing the constraint deletes the object rather than leaving it
    /// around until cluster deletion.
    async fn remove_disruption_budget(&self, cluster: &DbCluster) -> Result<(), SyncError> {
        let target = cluster.child_ref(ChildResource::DisruptionBudget);
        if self.ctx.store.get(&target).await?.is_some() {
            match self.ctx.store.delete(&target).await {
                Ok(()) => info!(target = %target, "disruption budget removed"),
                Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

fn cluster_ref(id: &ObjectId) -> ObjectRef {
    ObjectRef {
        gvk: CLUSTER_GVK.to_string(),
        namespace: id.namespace.clone(),
        name: id.name.clone(),
    }
}
