//! PodDisruptionBudget syncer; only built when the spec sets a non-empty
//! `minAvailable`.

use converge_core::{ChildResource, DbCluster, ObjectRef, Syncer};
use serde_json::{json, Value};

use crate::child_metadata;

pub struct DisruptionBudgetSyncer {
    cluster: DbCluster,
    revision: Option<String>,
}

impl DisruptionBudgetSyncer {
    pub fn new(cluster: &DbCluster) -> Self {
        Self { cluster: cluster.clone(), revision: None }
    }
}

impl Syncer for DisruptionBudgetSyncer {
    fn child(&self) -> ChildResource {
        ChildResource::DisruptionBudget
    }

    fn object_ref(&self) -> ObjectRef {
        self.cluster.child_ref(ChildResource::DisruptionBudget)
    }

    fn desired_body(&self, _current: Option<&Value>) -> anyhow::Result<Value> {
        // minAvailable is an IntOrString on the wire; the spec string
        // ("1", "50%") passes through as-is.
        let min_available = self.cluster.spec.min_available.clone().unwrap_or_default();
        Ok(json!({
            "apiVersion": "policy/v1",
            "kind": "PodDisruptionBudget",
            "metadata": child_metadata(&self.cluster, ChildResource::DisruptionBudget)?,
            "spec": {
                "minAvailable": min_available,
                "selector": {"matchLabels": self.cluster.labels()},
            },
        }))
    }

    fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    fn publish_revision(&mut self, revision: String) {
        self.revision = Some(revision);
    }
}
