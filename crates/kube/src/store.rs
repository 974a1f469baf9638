//! [`ObjectStore`] over dynamic-typed API calls.

use async_trait::async_trait;
use converge_core::ObjectRef;
use converge_store::{ObjectStore, Revision, StoreError, StoreResult, StoredObject};
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use serde_json::{json, Value};
use tracing::debug;

/// Resolve a GVK key to its group/version/kind plus plural. The kind set
/// is closed, so no discovery round-trip is needed.
pub(crate) fn parse_gvk(key: &str) -> StoreResult<(GroupVersionKind, &'static str)> {
    let parts: Vec<_> = key.split('/').collect();
    let gvk = match parts.as_slice() {
        [version, kind] => GroupVersionKind {
            group: String::new(),
            version: (*version).to_string(),
            kind: (*kind).to_string(),
        },
        [group, version, kind] => GroupVersionKind {
            group: (*group).to_string(),
            version: (*version).to_string(),
            kind: (*kind).to_string(),
        },
        _ => return Err(StoreError::Backend(format!("invalid gvk key: {key}"))),
    };
    let plural = match (gvk.group.as_str(), gvk.kind.as_str()) {
        ("", "ConfigMap") => "configmaps",
        ("", "Secret") => "secrets",
        ("", "Service") => "services",
        ("apps", "StatefulSet") => "statefulsets",
        ("policy", "PodDisruptionBudget") => "poddisruptionbudgets",
        ("db.converge.dev", "DbCluster") => "dbclusters",
        _ => return Err(StoreError::Backend(format!("unsupported gvk: {key}"))),
    };
    Ok((gvk, plural))
}

/// Live [`ObjectStore`] backed by the cluster API.
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, target: &ObjectRef) -> StoreResult<Api<DynamicObject>> {
        let (gvk, plural) = parse_gvk(&target.gvk)?;
        let ar = ApiResource::from_gvk_with_plural(&gvk, plural);
        Ok(Api::namespaced_with(self.client.clone(), &target.namespace, &ar))
    }
}

fn map_err(err: kube::Error, target: &ObjectRef) -> StoreError {
    match err {
        kube::Error::Api(ref resp) if resp.code == 404 => StoreError::NotFound(target.to_string()),
        kube::Error::Api(ref resp) if resp.code == 409 => {
            StoreError::Conflict(format!("{target}: {}", resp.message))
        }
        other => StoreError::Backend(format!("{target}: {other}")),
    }
}

fn strip_managed_fields(v: &mut Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

fn revision_of(obj: &DynamicObject) -> Revision {
    obj.metadata.resource_version.clone().unwrap_or_default()
}

fn decode(target: &ObjectRef, body: Value) -> StoreResult<DynamicObject> {
    serde_json::from_value(body)
        .map_err(|err| StoreError::Backend(format!("{target}: encoding body: {err}")))
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, target: &ObjectRef) -> StoreResult<Option<StoredObject>> {
        let api = self.api(target)?;
        match api.get_opt(&target.name).await.map_err(|e| map_err(e, target))? {
            Some(obj) => {
                let revision = revision_of(&obj);
                let mut body = serde_json::to_value(&obj)
                    .map_err(|err| StoreError::Backend(format!("{target}: {err}")))?;
                strip_managed_fields(&mut body);
                Ok(Some(StoredObject { revision, body }))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, target: &ObjectRef, body: Value) -> StoreResult<Revision> {
        let api = self.api(target)?;
        let mut obj = decode(target, body)?;
        obj.metadata.resource_version = None;
        let created = api
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| map_err(e, target))?;
        debug!(target = %target, "created");
        Ok(revision_of(&created))
    }

    async fn update(&self, target: &ObjectRef, expected: &str, body: Value) -> StoreResult<Revision> {
        let api = self.api(target)?;
        let mut obj = decode(target, body)?;
        // The server rejects the replace with a conflict when this
        // revision is stale.
        obj.metadata.resource_version = Some(expected.to_string());
        let updated = api
            .replace(&target.name, &PostParams::default(), &obj)
            .await
            .map_err(|e| map_err(e, target))?;
        Ok(revision_of(&updated))
    }

    async fn update_status(&self, target: &ObjectRef, status: Value) -> StoreResult<Revision> {
        let api = self.api(target)?;
        let patch = json!({ "status": status });
        let updated = api
            .patch_status(&target.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_err(e, target))?;
        Ok(revision_of(&updated))
    }

    async fn delete(&self, target: &ObjectRef) -> StoreResult<()> {
        let api = self.api(target)?;
        api.delete(&target.name, &DeleteParams::default())
            .await
            .map_err(|e| map_err(e, target))?;
        Ok(())
    }
}
