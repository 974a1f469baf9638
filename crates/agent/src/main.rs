//! `converged`: the operator daemon. Wires watchers, router, queue and
//! workers together and runs until interrupted.

#![forbid(unsafe_code)]

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};

use converge_controller::{run_router, spawn_workers, Context, Reconciler, RequestQueue};
use converge_core::{ChildResource, Options, CLUSTER_GVK};
use converge_kube::KubeStore;
use converge_store::ObjectStore;

#[derive(Parser, Debug)]
#[command(name = "converged", version, about = "Converge database cluster operator")]
struct Cli {
    /// Namespace to watch (default: all namespaces)
    #[arg(long = "ns")]
    namespace: Option<String>,

    /// Number of reconcile workers
    #[arg(long = "workers", default_value_t = 2)]
    workers: usize,

    /// Image applied to clusters that do not pin one
    #[arg(
        long = "default-image",
        env = "CONVERGE_DEFAULT_IMAGE",
        default_value = "ghcr.io/converge/db:8.0.36"
    )]
    default_image: String,

    /// Floor for container CPU requests
    #[arg(long = "cpu-floor", default_value = "100m")]
    cpu_floor: String,

    /// Floor for container memory requests
    #[arg(long = "memory-floor", default_value = "256Mi")]
    memory_floor: String,
}

fn init_tracing() {
    let env = std::env::var("CONVERGE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CONVERGE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CONVERGE_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let options = Arc::new(Options {
        default_image: cli.default_image.clone(),
        cpu_floor: cli.cpu_floor.clone(),
        memory_floor: cli.memory_floor.clone(),
    });

    let client = converge_kube::client().await?;
    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone()));

    let queue = Arc::new(RequestQueue::new());
    let (tx, rx) = mpsc::channel(1024);

    // One watcher per kind we react to: the cluster resource itself plus
    // every child kind, all funneled through the router.
    let mut watched = vec![CLUSTER_GVK];
    watched.extend_from_slice(ChildResource::WATCHED_GVKS);
    for gvk in watched {
        let client = client.clone();
        let tx = tx.clone();
        let namespace = cli.namespace.clone();
        tokio::spawn(async move {
            if let Err(err) = converge_kube::start_watcher(client, gvk, namespace.as_deref(), tx).await
            {
                error!(gvk = %gvk, error = ?err, "watcher exited");
            }
        });
    }
    drop(tx);

    tokio::spawn(run_router(rx, Arc::clone(&queue)));

    let reconciler = Arc::new(Reconciler::new(Context { store, options }));
    let workers = spawn_workers(cli.workers, Arc::clone(&queue), reconciler);
    info!(workers = workers.len(), ns = ?cli.namespace, "converge agent started");

    signal::ctrl_c().await?;
    info!("shutdown requested");
    Ok(())
}
