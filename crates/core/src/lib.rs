//! Converge core types: the DbCluster resource, operator options, child
//! resource naming and the syncer contract.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

mod cluster;
mod defaults;
mod options;
mod syncer;

pub use cluster::{
    ChildResource, ClusterCondition, DbCluster, DbClusterSpec, DbClusterStatus, ResourceSizing,
    API_VERSION, CLUSTER_GVK, CLUSTER_KIND,
};
pub use defaults::set_defaults;
pub use options::Options;
pub use syncer::Syncer;

/// Namespace+name identity of a cluster; the unit of queueing and of
/// per-cluster mutual exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Full reference to one stored object: GVK key (`v1/Kind` or
/// `group/v1/Kind`) plus namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub gvk: String,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.gvk, self.namespace, self.name)
    }
}

/// A raw object event from the watch layer, tagged with its GVK key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub gvk: String,
    pub raw: serde_json::Value,
}
