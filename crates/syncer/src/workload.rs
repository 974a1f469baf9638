//! StatefulSet syncer: the workload itself, keyed to the config and
//! credential revisions.

use converge_core::{ChildResource, DbCluster, ObjectRef, Options, Syncer};
use serde_json::{json, Value};

use crate::child_metadata;
use crate::service::DB_PORT;

/// Pod-template annotation carrying the config artifact revision.
pub const CONFIG_REVISION_ANNOTATION: &str = "db.converge.dev/config-revision";
/// Pod-template annotation carrying the credential artifact revision.
pub const SECRET_REVISION_ANNOTATION: &str = "db.converge.dev/secret-revision";

/// Maintains the StatefulSet. The config and credential revisions are
/// threaded into the pod template as annotations, so any change to either
/// artifact produces a new template and rolls the pods.
pub struct WorkloadSyncer {
    cluster: DbCluster,
    config_revision: String,
    secret_revision: String,
    options: Options,
    revision: Option<String>,
}

impl WorkloadSyncer {
    pub fn new(
        cluster: &DbCluster,
        config_revision: &str,
        secret_revision: &str,
        options: &Options,
    ) -> Self {
        Self {
            cluster: cluster.clone(),
            config_revision: config_revision.to_string(),
            secret_revision: secret_revision.to_string(),
            options: options.clone(),
            revision: None,
        }
    }
}

impl Syncer for WorkloadSyncer {
    fn child(&self) -> ChildResource {
        ChildResource::Workload
    }

    fn object_ref(&self) -> ObjectRef {
        self.cluster.child_ref(ChildResource::Workload)
    }

    fn desired_body(&self, _current: Option<&Value>) -> anyhow::Result<Value> {
        let spec = &self.cluster.spec;
        let labels = self.cluster.labels();
        let image = spec.image.as_deref().unwrap_or(&self.options.default_image);
        let sizing = spec.resources.clone().unwrap_or_default();
        let cpu = sizing.cpu.as_deref().unwrap_or(&self.options.cpu_floor);
        let memory = sizing.memory.as_deref().unwrap_or(&self.options.memory_floor);

        let config_name = self.cluster.child_ref(ChildResource::Config).name;
        let secret_name = self.cluster.child_ref(ChildResource::Credentials).name;
        let headless_name = self.cluster.child_ref(ChildResource::HeadlessService).name;

        Ok(json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": child_metadata(&self.cluster, ChildResource::Workload)?,
            "spec": {
                "replicas": spec.replicas.unwrap_or(1),
                "serviceName": headless_name,
                "selector": {"matchLabels": labels},
                "template": {
                    "metadata": {
                        "labels": labels,
                        "annotations": {
                            (CONFIG_REVISION_ANNOTATION): self.config_revision,
                            (SECRET_REVISION_ANNOTATION): self.secret_revision,
                        },
                    },
                    "spec": {
                        "containers": [{
                            "name": "db",
                            "image": image,
                            "ports": [{"name": "db", "containerPort": DB_PORT}],
                            "envFrom": [{"secretRef": {"name": secret_name}}],
                            "volumeMounts": [{"name": "config", "mountPath": "/etc/db"}],
                            "resources": {"requests": {"cpu": cpu, "memory": memory}},
                        }],
                        "volumes": [{"name": "config", "configMap": {"name": config_name}}],
                    },
                },
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
