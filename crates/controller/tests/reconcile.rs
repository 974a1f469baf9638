#![forbid(unsafe_code)]

use std::sync::Arc;

use converge_controller::{Context, Outcome, Reconciler};
use converge_core::{ChildResource, ObjectId, ObjectRef, Options, CLUSTER_GVK};
use converge_store::{MemStore, ObjectStore, Op, StoreError};
use converge_syncer::{CONFIG_REVISION_ANNOTATION, SECRET_REVISION_ANNOTATION};
use serde_json::{json, Value};

fn id() -> ObjectId {
    ObjectId { namespace: "prod".to_string(), name: "orders".to_string() }
}

fn cluster_ref(id: &ObjectId) -> ObjectRef {
    ObjectRef { gvk: CLUSTER_GVK.to_string(), namespace: id.namespace.clone(), name: id.name.clone() }
}

fn child_ref(id: &ObjectId, child: ChildResource) -> ObjectRef {
    ObjectRef {
        gvk: child.gvk_key().to_string(),
        namespace: id.namespace.clone(),
        name: child.name_for(&id.name),
    }
}

fn cluster_body(min_available: Option<&str>) -> Value {
    let mut spec = json!({
        "replicas": 2,
        "params": {"max_connections": "300"},
    });
    if let Some(value) = min_available {
        spec["minAvailable"] = json!(value);
    }
    json!({
        "apiVersion": "db.converge.dev/v1alpha1",
        "kind": "DbCluster",
        "metadata": {
            "name": "orders",
            "namespace": "prod",
            "uid": "6f1f87e4-9d2b-4f6e-9a3e-000000000042",
        },
        "spec": spec,
    })
}

fn harness(store: &Arc<MemStore>) -> Reconciler {
    let dyn_store: Arc<dyn ObjectStore> = Arc::clone(store) as Arc<dyn ObjectStore>;
    Reconciler::new(Context { store: dyn_store, options: Arc::new(Options::default()) })
}

fn writes(ops: &[Op]) -> Vec<&Op> {
    ops.iter().filter(|op| op.is_write()).collect()
}

#[tokio::test]
async fn first_reconcile_creates_every_child_and_records_status() {
    let store = Arc::new(MemStore::new());
    let id = id();
    store.seed(&cluster_ref(&id), cluster_body(None));

    let outcome = harness(&store).reconcile(&id).await.unwrap();
    assert_eq!(outcome, Outcome::Converged);

    for child in [
        ChildResource::Config,
        ChildResource::Credentials,
        ChildResource::HeadlessService,
        ChildResource::PrimaryService,
        ChildResource::HealthyService,
        ChildResource::Workload,
    ] {
        assert!(store.contains(&child_ref(&id, child)), "missing {child:?}");
    }
    assert!(!store.contains(&child_ref(&id, ChildResource::DisruptionBudget)));

    let status = &store.body_of(&cluster_ref(&id)).unwrap()["status"];
    assert_eq!(status["conditions"][0]["type"], "Ready");
    assert_eq!(status["conditions"][0]["status"], "True");
    assert_eq!(status["syncedRevisions"].as_object().unwrap().len(), 6);
}

#[tokio::test]
async fn second_reconcile_is_a_pure_no_op() {
    let store = Arc::new(MemStore::new());
    let id = id();
    store.seed(&cluster_ref(&id), cluster_body(None));
    let reconciler = harness(&store);

    reconciler.reconcile(&id).await.unwrap();
    store.take_ops();

    let outcome = reconciler.reconcile(&id).await.unwrap();
    assert_eq!(outcome, Outcome::Converged);

    // No creates, no updates, and in particular no status write.
    let ops = store.take_ops();
    assert!(writes(&ops).is_empty(), "unexpected writes: {:?}", writes(&ops));
}

#[tokio::test]
async fn workload_template_tracks_artifact_revisions() {
    let store = Arc::new(MemStore::new());
    let id = id();
    store.seed(&cluster_ref(&id), cluster_body(None));
    let reconciler = harness(&store);
    reconciler.reconcile(&id).await.unwrap();

    let workload_ref = child_ref(&id, ChildResource::Workload);
    let config_ref = child_ref(&id, ChildResource::Config);
    let secret_ref = child_ref(&id, ChildResource::Credentials);

    let annotations = |body: &Value| body["spec"]["template"]["metadata"]["annotations"].clone();
    let first = annotations(&store.body_of(&workload_ref).unwrap());
    assert_eq!(first[CONFIG_REVISION_ANNOTATION], json!(store.revision_of(&config_ref).unwrap()));
    assert_eq!(first[SECRET_REVISION_ANNOTATION], json!(store.revision_of(&secret_ref).unwrap()));

    // Spec change that only touches the config artifact.
    store.tamper(&cluster_ref(&id), |body| {
        body["spec"]["params"]["max_connections"] = json!("500");
    });
    reconciler.reconcile(&id).await.unwrap();

    let second = annotations(&store.body_of(&workload_ref).unwrap());
    assert_eq!(second[CONFIG_REVISION_ANNOTATION], json!(store.revision_of(&config_ref).unwrap()));
    assert_ne!(second[CONFIG_REVISION_ANNOTATION], first[CONFIG_REVISION_ANNOTATION]);
    assert_eq!(second[SECRET_REVISION_ANNOTATION], first[SECRET_REVISION_ANNOTATION]);
}

#[tokio::test]
async fn adding_the_constraint_creates_exactly_one_budget() {
    let store = Arc::new(MemStore::new());
    let id = id();
    store.seed(&cluster_ref(&id), cluster_body(None));
    let reconciler = harness(&store);
    reconciler.reconcile(&id).await.unwrap();

    store.tamper(&cluster_ref(&id), |body| {
        body["spec"]["minAvailable"] = json!("1");
    });
    store.take_ops();
    reconciler.reconcile(&id).await.unwrap();

    let ops = store.take_ops();
    let creates: Vec<_> = ops.iter().filter(|op| matches!(op, Op::Create(_))).collect();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].target(), &child_ref(&id, ChildResource::DisruptionBudget));
    // No other child was touched.
    assert!(ops.iter().all(|op| !matches!(op, Op::Update(_))));
}

#[tokio::test]
async fn clearing_the_constraint_deletes_the_budget() {
    let store = Arc::new(MemStore::new());
    let id = id();
    store.seed(&cluster_ref(&id), cluster_body(Some("1")));
    let reconciler = harness(&store);
    reconciler.reconcile(&id).await.unwrap();
    assert!(store.contains(&child_ref(&id, ChildResource::DisruptionBudget)));

    store.tamper(&cluster_ref(&id), |body| {
        body["spec"].as_object_mut().unwrap().remove("minAvailable");
    });
    reconciler.reconcile(&id).await.unwrap();
    assert!(!store.contains(&child_ref(&id, ChildResource::DisruptionBudget)));
}

#[tokio::test]
async fn credential_failure_stops_the_sequence() {
    let store = Arc::new(MemStore::new());
    let id = id();
    store.seed(&cluster_ref(&id), cluster_body(None));
    store.fail_next_write(
        &child_ref(&id, ChildResource::Credentials),
        StoreError::Backend("boom".to_string()),
    );

    let err = harness(&store).reconcile(&id).await.unwrap_err();
    assert!(err.to_string().contains("boom"));

    // The config artifact, synced earlier, keeps its committed state.
    assert!(store.contains(&child_ref(&id, ChildResource::Config)));
    for child in [
        ChildResource::HeadlessService,
        ChildResource::PrimaryService,
        ChildResource::HealthyService,
        ChildResource::Workload,
    ] {
        assert!(!store.contains(&child_ref(&id, child)), "{child:?} written after failure");
    }

    // The failure is still reflected on status.
    let status = &store.body_of(&cluster_ref(&id)).unwrap()["status"];
    assert_eq!(status["conditions"][0]["status"], "False");
    assert_eq!(status["conditions"][0]["reason"], "SyncFailed");
    assert!(status.get("syncedRevisions").is_none());
}

#[tokio::test]
async fn deleted_cluster_is_success_with_no_writes() {
    let store = Arc::new(MemStore::new());
    let id = id();

    let outcome = harness(&store).reconcile(&id).await.unwrap();
    assert_eq!(outcome, Outcome::Gone);

    let ops = store.take_ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], Op::Get(_)));
}

#[tokio::test]
async fn write_conflicts_converge_within_the_attempt() {
    let store = Arc::new(MemStore::new());
    let id = id();
    store.seed(&cluster_ref(&id), cluster_body(None));
    let reconciler = harness(&store);
    reconciler.reconcile(&id).await.unwrap();

    store.tamper(&cluster_ref(&id), |body| {
        body["spec"]["params"]["max_connections"] = json!("900");
    });
    let config_ref = child_ref(&id, ChildResource::Config);
    store.fail_next_write(&config_ref, StoreError::Conflict("stale".to_string()));

    reconciler.reconcile(&id).await.unwrap();
    let config = store.body_of(&config_ref).unwrap();
    assert!(config["data"]["db.cnf"].as_str().unwrap().contains("max_connections = 900"));
}

#[tokio::test]
async fn status_write_failure_is_swallowed_and_healed() {
    let store = Arc::new(MemStore::new());
    let id = id();
    store.seed(&cluster_ref(&id), cluster_body(None));
    store.fail_next_write(&cluster_ref(&id), StoreError::Backend("etcd flake".to_string()));
    let reconciler = harness(&store);

    // Children converge even though the status write fails.
    let outcome = reconciler.reconcile(&id).await.unwrap();
    assert_eq!(outcome, Outcome::Converged);
    assert!(store.body_of(&cluster_ref(&id)).unwrap().get("status").is_none());

    // The next attempt recomputes the same diff and lands it.
    reconciler.reconcile(&id).await.unwrap();
    let status = &store.body_of(&cluster_ref(&id)).unwrap()["status"];
    assert_eq!(status["conditions"][0]["status"], "True");
}
