//! Maps raw watch events to the owning cluster identity.

use std::sync::Arc;

use converge_core::{ObjectId, WatchEvent, API_VERSION, CLUSTER_GVK, CLUSTER_KIND};
use metrics::counter;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::queue::RequestQueue;

/// Resolve the cluster that owns an event, if any.
///
/// Cluster events map to their own identity; child events map through the
/// controller owner reference. Objects we do not own yield `None`.
pub fn route(event: &WatchEvent) -> Option<ObjectId> {
    let meta = event.raw.get("metadata")?;
    let namespace = meta.get("namespace").and_then(Value::as_str)?.to_string();

    if event.gvk == CLUSTER_GVK {
        let name = meta.get("name").and_then(Value::as_str)?.to_string();
        return Some(ObjectId { namespace, name });
    }

    let owners = meta.get("ownerReferences").and_then(Value::as_array)?;
    for owner in owners {
        let is_controller = owner.get("controller").and_then(Value::as_bool).unwrap_or(false);
        let api_version = owner.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
        let kind = owner.get("kind").and_then(Value::as_str).unwrap_or_default();
        if is_controller && api_version == API_VERSION && kind == CLUSTER_KIND {
            let name = owner.get("name").and_then(Value::as_str)?.to_string();
            return Some(ObjectId { namespace, name });
        }
    }
    None
}

/// Drain watch events into the queue until every sender is dropped.
pub async fn run_router(mut rx: mpsc::Receiver<WatchEvent>, queue: Arc<RequestQueue>) {
    while let Some(event) = rx.recv().await {
        match route(&event) {
            Some(id) => {
                debug!(cluster = %id, gvk = %event.gvk, "event routed");
                queue.enqueue(id);
            }
            None => {
                counter!("router_dropped_events", 1u64);
            }
        }
    }
    warn!("router channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(gvk: &str, raw: Value) -> WatchEvent {
        WatchEvent { gvk: gvk.to_string(), raw }
    }

    #[test]
    fn cluster_events_route_to_themselves() {
        let ev = event(
            CLUSTER_GVK,
            json!({"metadata": {"namespace": "prod", "name": "orders"}}),
        );
        assert_eq!(
            route(&ev),
            Some(ObjectId { namespace: "prod".into(), name: "orders".into() })
        );
    }

    #[test]
    fn child_events_route_through_the_controller_owner() {
        let ev = event(
            "apps/v1/StatefulSet",
            json!({"metadata": {
                "namespace": "prod",
                "name": "orders-db",
                "ownerReferences": [
                    {"apiVersion": "batch/v1", "kind": "CronJob", "name": "x", "controller": true},
                    {"apiVersion": API_VERSION, "kind": CLUSTER_KIND, "name": "orders", "controller": true},
                ],
            }}),
        );
        assert_eq!(route(&ev).map(|id| id.name), Some("orders".to_string()));
    }

    #[test]
    fn foreign_and_non_controller_owners_are_dropped() {
        let foreign = event(
            "v1/ConfigMap",
            json!({"metadata": {
                "namespace": "prod",
                "name": "other",
                "ownerReferences": [{"apiVersion": "v1", "kind": "Pod", "name": "p", "controller": true}],
            }}),
        );
        assert_eq!(route(&foreign), None);

        let not_controller = event(
            "v1/ConfigMap",
            json!({"metadata": {
                "namespace": "prod",
                "name": "orders-db-config",
                "ownerReferences": [{"apiVersion": API_VERSION, "kind": CLUSTER_KIND, "name": "orders"}],
            }}),
        );
        assert_eq!(route(&not_controller), None);
    }

    #[test]
    fn unowned_objects_are_dropped() {
        let ev = event("v1/Secret", json!({"metadata": {"namespace": "prod", "name": "loose"}}));
        assert_eq!(route(&ev), None);
    }
}
