//! Service syncers: the three endpoint sets in front of the workload.

use converge_core::{ChildResource, DbCluster, ObjectRef, Syncer};
use serde_json::{json, Value};

use crate::child_metadata;

pub const DB_PORT: u16 = 3306;

/// Which endpoint set a [`ServiceSyncer`] maintains.
#[derive(Debug, Clone, Copy)]
enum Variant {
    /// DNS backbone for the stateful set: one record per pod, ready or not.
    Headless,
    /// Routes writes to the current primary replica.
    Primary,
    /// Load-balances reads across replicas passing health checks.
    Healthy,
}

pub struct ServiceSyncer {
    cluster: DbCluster,
    variant: Variant,
    revision: Option<String>,
}

impl ServiceSyncer {
    pub fn headless(cluster: &DbCluster) -> Self {
        Self { cluster: cluster.clone(), variant: Variant::Headless, revision: None }
    }

    pub fn primary(cluster: &DbCluster) -> Self {
        Self { cluster: cluster.clone(), variant: Variant::Primary, revision: None }
    }

    pub fn healthy(cluster: &DbCluster) -> Self {
        Self { cluster: cluster.clone(), variant: Variant::Healthy, revision: None }
    }
}

impl Syncer for ServiceSyncer {
    fn child(&self) -> ChildResource {
        match self.variant {
            Variant::Headless => ChildResource::HeadlessService,
            Variant::Primary => ChildResource::PrimaryService,
            Variant::Healthy => ChildResource::HealthyService,
        }
    }

    fn object_ref(&self) -> ObjectRef {
        self.cluster.child_ref(self.child())
    }

    fn desired_body(&self, _current: Option<&Value>) -> anyhow::Result<Value> {
        let mut selector = self.cluster.labels();
        let mut spec = json!({
            "ports": [{"name": "db", "port": DB_PORT, "targetPort": DB_PORT}],
        });

        match self.variant {
            Variant::Headless => {
                // Pods must be resolvable before they are ready so
                // replication can bootstrap.
                spec["clusterIP"] = json!("None");
                spec["publishNotReadyAddresses"] = json!(true);
            }
            Variant::Primary => {
                selector.insert("db.converge.dev/role".to_string(), "primary".to_string());
            }
            Variant::Healthy => {
                selector.insert("db.converge.dev/healthy".to_string(), "yes".to_string());
            }
        }
        spec["selector"] = json!(selector);

        Ok(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": child_metadata(&self.cluster, self.child())?,
            "spec": spec,
        }))
    }

    fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    fn publish_revision(&mut self, revision: String) {
        self.revision = Some(revision);
    }
}
