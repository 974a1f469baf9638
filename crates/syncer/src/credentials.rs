//! Secret syncer: credential material for the database and replication.

use converge_core::{ChildResource, DbCluster, ObjectRef, Syncer};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::child_metadata;

/// Maintains the credential Secret. Material is generated exactly once,
/// when no persisted body exists; after that the stored values are carried
/// forward verbatim, so reconciling never rotates credentials.
pub struct CredentialSyncer {
    cluster: DbCluster,
    revision: Option<String>,
}

impl CredentialSyncer {
    pub fn new(cluster: &DbCluster) -> Self {
        Self { cluster: cluster.clone(), revision: None }
    }
}

impl Syncer for CredentialSyncer {
    fn child(&self) -> ChildResource {
        ChildResource::Credentials
    }

    fn object_ref(&self) -> ObjectRef {
        self.cluster.child_ref(ChildResource::Credentials)
    }

    fn desired_body(&self, current: Option<&Value>) -> anyhow::Result<Value> {
        let mut body = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": child_metadata(&self.cluster, ChildResource::Credentials)?,
            "type": "Opaque",
        });

        match current.filter(|c| has_material(c)) {
            Some(existing) => {
                // Carry the persisted material in whichever representation
                // the store returned it.
                for key in ["data", "stringData"] {
                    if let Some(values) = existing.get(key) {
                        body[key] = values.clone();
                    }
                }
            }
            None => {
                body["stringData"] = json!({
                    "ROOT_PASSWORD": random_secret(),
                    "REPLICATION_PASSWORD": random_secret(),
                });
            }
        }
        Ok(body)
    }

    fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    fn publish_revision(&mut self, revision: String) {
        self.revision = Some(revision);
    }
}

fn has_material(body: &Value) -> bool {
    body.get("data").is_some() || body.get("stringData").is_some()
}

fn random_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_cluster;

    #[test]
    fn generates_material_only_on_first_create() {
        let cluster = test_cluster("orders");
        let syncer = CredentialSyncer::new(&cluster);

        let first = syncer.desired_body(None).unwrap();
        let root = first["stringData"]["ROOT_PASSWORD"].as_str().unwrap().to_string();
        assert_eq!(root.len(), 32);

        let second = syncer.desired_body(Some(&first)).unwrap();
        assert_eq!(second["stringData"]["ROOT_PASSWORD"].as_str().unwrap(), root);
        assert_eq!(first, second);
    }

    #[test]
    fn preserves_server_side_representation() {
        let cluster = test_cluster("orders");
        let syncer = CredentialSyncer::new(&cluster);
        let stored = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "data": {"ROOT_PASSWORD": "c2VjcmV0"},
        });
        let desired = syncer.desired_body(Some(&stored)).unwrap();
        assert_eq!(desired["data"]["ROOT_PASSWORD"], "c2VjcmV0");
        assert!(desired.get("stringData").is_none());
    }
}
