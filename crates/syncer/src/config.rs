//! ConfigMap syncer: renders the engine configuration file.

use std::collections::BTreeMap;

use converge_core::{ChildResource, DbCluster, DbClusterSpec, ObjectRef, Syncer};
use serde_json::{json, Value};

use crate::child_metadata;

/// Maintains the engine configuration ConfigMap.
pub struct ConfigSyncer {
    cluster: DbCluster,
    revision: Option<String>,
}

impl ConfigSyncer {
    pub fn new(cluster: &DbCluster) -> Self {
        Self { cluster: cluster.clone(), revision: None }
    }
}

impl Syncer for ConfigSyncer {
    fn child(&self) -> ChildResource {
        ChildResource::Config
    }

    fn object_ref(&self) -> ObjectRef {
        self.cluster.child_ref(ChildResource::Config)
    }

    fn desired_body(&self, _current: Option<&Value>) -> anyhow::Result<Value> {
        Ok(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": child_metadata(&self.cluster, ChildResource::Config)?,
            "data": {
                "db.cnf": render_config(&self.cluster.spec),
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

/// Render base parameters overlaid with user params into one INI-style
/// document. BTreeMap iteration keeps the output stable across attempts.
fn render_config(spec: &DbClusterSpec) -> String {
    let mut params: BTreeMap<String, String> = BTreeMap::new();
    params.insert("datadir".to_string(), "/var/lib/db/data".to_string());
    params.insert("skip-name-resolve".to_string(), "ON".to_string());
    params.extend(spec.params.clone());

    let mut out = String::from("[mysqld]\n");
    for (key, value) in &params {
        out.push_str(&format!("{key} = {value}\n"));
    }
    out
}
