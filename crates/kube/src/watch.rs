//! List+watch wiring: one watcher per GVK, forwarding raw objects into
//! the router channel.

use anyhow::Result;
use converge_core::WatchEvent;
use futures::TryStreamExt;
use kube::{
    api::Api,
    core::{ApiResource, DynamicObject},
    runtime::watcher::{self, Event},
    Client,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::store::parse_gvk;

/// Watch one GVK and forward every observed object, tagged with its key.
/// Runs until the stream or the channel closes.
pub async fn start_watcher(
    client: Client,
    gvk_key: &str,
    namespace: Option<&str>,
    tx: mpsc::Sender<WatchEvent>,
) -> Result<()> {
    let (gvk, plural) = parse_gvk(gvk_key)?;
    let ar = ApiResource::from_gvk_with_plural(&gvk, plural);
    let api: Api<DynamicObject> = match namespace {
        Some(ns) => Api::namespaced_with(client, ns, &ar),
        None => Api::all_with(client, &ar),
    };

    let cfg = watcher::Config::default();
    let stream = watcher::watcher(api, cfg);
    futures::pin_mut!(stream);
    info!(gvk = %gvk_key, ns = ?namespace, "watcher started");
    while let Some(event) = stream.try_next().await? {
        match event {
            Event::Applied(obj) | Event::Deleted(obj) => forward(gvk_key, &obj, &tx).await?,
            Event::Restarted(list) => {
                debug!(gvk = %gvk_key, count = list.len(), "watch restart");
                for obj in &list {
                    forward(gvk_key, obj, &tx).await?;
                }
            }
        }
    }
    warn!(gvk = %gvk_key, "watcher stream ended");
    Ok(())
}

async fn forward(gvk_key: &str, obj: &DynamicObject, tx: &mpsc::Sender<WatchEvent>) -> Result<()> {
    let raw = serde_json::to_value(obj)?;
    let _ = tx
        .send(WatchEvent { gvk: gvk_key.to_string(), raw })
        .await;
    Ok(())
}
