//! Syncer implementations: one per child resource of a DbCluster.
//!
//! Each syncer builds the full desired body of its child as raw JSON; the
//! orchestrator owns all reads and writes.

#![forbid(unsafe_code)]

mod budget;
mod config;
mod credentials;
mod service;
mod workload;

pub use budget::DisruptionBudgetSyncer;
pub use config::ConfigSyncer;
pub use credentials::CredentialSyncer;
pub use service::ServiceSyncer;
pub use workload::{WorkloadSyncer, CONFIG_REVISION_ANNOTATION, SECRET_REVISION_ANNOTATION};

use anyhow::Context as _;
use converge_core::{ChildResource, DbCluster};
use serde_json::{json, Value};

/// Object metadata shared by every child: deterministic name, the cluster
/// namespace, the common label set and a controller owner reference.
fn child_metadata(cluster: &DbCluster, child: ChildResource) -> anyhow::Result<Value> {
    let target = cluster.child_ref(child);
    let owner = serde_json::to_value(cluster.owner_ref()).context("encoding owner reference")?;
    Ok(json!({
        "name": target.name,
        "namespace": target.namespace,
        "labels": cluster.labels(),
        "ownerReferences": [owner],
    }))
}

#[cfg(test)]
fn test_cluster(name: &str) -> DbCluster {
    let mut cluster = DbCluster::new(name, converge_core::DbClusterSpec::default());
    cluster.metadata.namespace = Some("prod".to_string());
    cluster.metadata.uid = Some("6f1f87e4-9d2b-4f6e-9a3e-000000000042".to_string());
    converge_core::set_defaults(&mut cluster.spec, &converge_core::Options::default());
    cluster
}
