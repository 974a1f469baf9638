//! Converge controller: the reconcile loop and everything that feeds it,
//! from the coalescing request queue and event routing to the ordered
//! syncer orchestration and the worker pool.

#![forbid(unsafe_code)]

pub mod queue;
pub mod reconcile;
pub mod router;
pub mod sync;
pub mod worker;

pub use queue::RequestQueue;
pub use reconcile::{Context, Outcome, Reconciler};
pub use router::{route, run_router};
pub use sync::{SyncError, SyncOrchestrator};
pub use worker::spawn_workers;
