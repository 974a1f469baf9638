//! The contract between the reconcile loop and per-child syncers.

use serde_json::Value;

use crate::{ChildResource, ObjectRef};

/// One unit of convergence: knows the desired body of exactly one child
/// resource and receives the store revision after each successful sync.
///
/// Implementations must be pure given their construction inputs and
/// `current`; all side effects go through the orchestrator's own store
/// calls.
pub trait Syncer: Send {
    /// Which child this syncer maintains.
    fn child(&self) -> ChildResource;

    /// Target object reference (deterministic name, cluster namespace).
    fn object_ref(&self) -> ObjectRef;

    /// Compute the desired body. `current` is the persisted body, if any;
    /// the credential syncer is the one implementation that inspects it,
    /// to generate material only on first create.
    fn desired_body(&self, current: Option<&Value>) -> anyhow::Result<Value>;

    /// Store revision observed or assigned by the last successful sync.
    fn revision(&self) -> Option<&str>;

    /// Called by the orchestrator once the child is known to be in sync.
    fn publish_revision(&mut self, revision: String);
}
