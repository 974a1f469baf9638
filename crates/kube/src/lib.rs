//! Kubernetes plumbing: the live [`ObjectStore`] implementation and the
//! watcher wiring that feeds the event router.
//!
//! [`ObjectStore`]: converge_store::ObjectStore

#![forbid(unsafe_code)]

mod store;
mod watch;

pub use store::KubeStore;
pub use watch::start_watcher;

use anyhow::Result;
use kube::Client;

/// Build the default client from kubeconfig or in-cluster env.
pub async fn client() -> Result<Client> {
    Ok(Client::try_default().await?)
}
