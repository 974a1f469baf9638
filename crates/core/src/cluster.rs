//! The DbCluster custom resource and the naming scheme for its children.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ObjectId, ObjectRef};

pub const API_VERSION: &str = "db.converge.dev/v1alpha1";
pub const CLUSTER_KIND: &str = "DbCluster";

/// GVK key for the cluster resource, in `group/version/Kind` form.
pub const CLUSTER_GVK: &str = "db.converge.dev/v1alpha1/DbCluster";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "db.converge.dev",
    version = "v1alpha1",
    kind = "DbCluster",
    plural = "dbclusters",
    shortname = "dbc",
    namespaced,
    status = "DbClusterStatus",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterSpec {
    /// Number of database replicas. Defaulted to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// PodDisruptionBudget minAvailable (count or percentage). Absent or
    /// empty disables the budget entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<String>,

    /// Database server image; falls back to the operator-wide default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSizing>,

    /// Engine parameters rendered into the config artifact.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// Container resource requests. Values below the operator floors are left
/// alone; only missing values are filled in.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSizing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClusterCondition>,

    /// Store revision last applied per child, keyed `Kind/name`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub synced_revisions: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl DbClusterStatus {
    /// Upsert a condition. The transition timestamp only moves when the
    /// condition value actually flips, so rewriting an unchanged status
    /// stays a no-op.
    pub fn set_condition(&mut self, type_: &str, status: &str, reason: &str, message: &str) {
        let stamp = || Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        if let Some(cond) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if cond.status != status {
                cond.last_transition_time = stamp();
            }
            cond.status = status.to_string();
            cond.reason = Some(reason.to_string());
            cond.message = Some(message.to_string());
        } else {
            self.conditions.push(ClusterCondition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: Some(reason.to_string()),
                message: Some(message.to_string()),
                last_transition_time: stamp(),
            });
        }
    }
}

/// The seven dependent resources maintained for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildResource {
    Config,
    Credentials,
    HeadlessService,
    PrimaryService,
    HealthyService,
    Workload,
    DisruptionBudget,
}

impl ChildResource {
    /// Kinds the event router needs watches for (Service appears once).
    pub const WATCHED_GVKS: &'static [&'static str] = &[
        "v1/ConfigMap",
        "v1/Secret",
        "v1/Service",
        "apps/v1/StatefulSet",
        "policy/v1/PodDisruptionBudget",
    ];

    /// GVK key in the `version/Kind` / `group/version/Kind` form used
    /// across the workspace.
    pub fn gvk_key(self) -> &'static str {
        match self {
            ChildResource::Config => "v1/ConfigMap",
            ChildResource::Credentials => "v1/Secret",
            ChildResource::HeadlessService
            | ChildResource::PrimaryService
            | ChildResource::HealthyService => "v1/Service",
            ChildResource::Workload => "apps/v1/StatefulSet",
            ChildResource::DisruptionBudget => "policy/v1/PodDisruptionBudget",
        }
    }

    pub fn api_version(self) -> &'static str {
        match self {
            ChildResource::Workload => "apps/v1",
            ChildResource::DisruptionBudget => "policy/v1",
            _ => "v1",
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            ChildResource::Config => "ConfigMap",
            ChildResource::Credentials => "Secret",
            ChildResource::HeadlessService
            | ChildResource::PrimaryService
            | ChildResource::HealthyService => "Service",
            ChildResource::Workload => "StatefulSet",
            ChildResource::DisruptionBudget => "PodDisruptionBudget",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ChildResource::Config => "-db-config",
            ChildResource::Credentials => "-db-secret",
            ChildResource::HeadlessService => "-db",
            ChildResource::PrimaryService => "-db-primary",
            ChildResource::HealthyService => "-db-healthy",
            ChildResource::Workload => "-db",
            ChildResource::DisruptionBudget => "-db",
        }
    }

    /// Deterministic child name for a cluster.
    pub fn name_for(self, cluster: &str) -> String {
        format!("{}{}", cluster, self.suffix())
    }
}

impl DbCluster {
    pub fn id(&self) -> ObjectId {
        ObjectId {
            namespace: self.metadata.namespace.clone().unwrap_or_default(),
            name: self.metadata.name.clone().unwrap_or_default(),
        }
    }

    pub fn child_ref(&self, child: ChildResource) -> ObjectRef {
        let id = self.id();
        ObjectRef {
            gvk: child.gvk_key().to_string(),
            namespace: id.namespace,
            name: child.name_for(&id.name),
        }
    }

    /// Label set stamped on every child resource; also the pod selector.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("app.kubernetes.io/name".to_string(), "db".to_string());
        labels.insert(
            "app.kubernetes.io/instance".to_string(),
            self.metadata.name.clone().unwrap_or_default(),
        );
        labels.insert("app.kubernetes.io/managed-by".to_string(), "converge".to_string());
        labels
    }

    /// Controller owner reference pointing at this cluster; drives both
    /// event routing and cascade deletion.
    pub fn owner_ref(&self) -> OwnerReference {
        OwnerReference {
            api_version: API_VERSION.to_string(),
            kind: CLUSTER_KIND.to_string(),
            name: self.metadata.name.clone().unwrap_or_default(),
            uid: self.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Whether the spec asks for a disruption budget (non-empty
    /// `minAvailable`).
    pub fn has_disruption_budget(&self) -> bool {
        self.spec.min_available.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str) -> DbCluster {
        let mut c = DbCluster::new(name, DbClusterSpec::default());
        c.metadata.namespace = Some("prod".into());
        c
    }

    #[test]
    fn child_names_are_deterministic() {
        let c = cluster("orders");
        assert_eq!(c.child_ref(ChildResource::Config).name, "orders-db-config");
        assert_eq!(c.child_ref(ChildResource::Credentials).name, "orders-db-secret");
        assert_eq!(c.child_ref(ChildResource::HeadlessService).name, "orders-db");
        assert_eq!(c.child_ref(ChildResource::PrimaryService).name, "orders-db-primary");
        assert_eq!(c.child_ref(ChildResource::Workload).gvk, "apps/v1/StatefulSet");
        assert_eq!(c.child_ref(ChildResource::Workload).namespace, "prod");
    }

    #[test]
    fn disruption_budget_requires_non_empty_constraint() {
        let mut c = cluster("orders");
        assert!(!c.has_disruption_budget());
        c.spec.min_available = Some(String::new());
        assert!(!c.has_disruption_budget());
        c.spec.min_available = Some("50%".into());
        assert!(c.has_disruption_budget());
    }

    #[test]
    fn condition_transition_time_moves_only_on_flips() {
        let mut status = DbClusterStatus::default();
        status.set_condition("Ready", "True", "ChildrenSynced", "ok");
        let first = status.conditions[0].last_transition_time.clone();
        status.set_condition("Ready", "True", "ChildrenSynced", "ok");
        assert_eq!(status.conditions[0].last_transition_time, first);
        status.set_condition("Ready", "False", "SyncFailed", "boom");
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "False");
    }

    #[test]
    fn status_equality_is_structural() {
        let mut a = DbClusterStatus::default();
        let mut b = DbClusterStatus::default();
        a.synced_revisions.insert("ConfigMap/orders-db-config".into(), "12".into());
        assert_ne!(a, b);
        b.synced_revisions.insert("ConfigMap/orders-db-config".into(), "12".into());
        assert_eq!(a, b);
    }
}
