//! Object-store seam: the trait the control loop talks to, its error
//! taxonomy, and an in-memory implementation for tests and local runs.

#![forbid(unsafe_code)]

mod mem;

pub use mem::{MemStore, Op};

use async_trait::async_trait;
use converge_core::ObjectRef;
use serde_json::Value;

/// Store-assigned revision token; opaque, compared only for equality.
pub type Revision = String;

/// One persisted object: revision token plus raw body.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub revision: Revision,
    pub body: Value,
}

/// Errors surfaced by store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A write targeted an object that no longer exists.
    #[error("not found: {0}")]
    NotFound(String),
    /// Optimistic write lost against a concurrent writer; safe to retry
    /// with a fresh read.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Minimal store API the reconcile loop needs. Absent objects read back as
/// `Ok(None)`; `update` checks the expected revision and fails with
/// [`StoreError::Conflict`] when it is stale.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, target: &ObjectRef) -> StoreResult<Option<StoredObject>>;

    async fn create(&self, target: &ObjectRef, body: Value) -> StoreResult<Revision>;

    async fn update(&self, target: &ObjectRef, expected: &str, body: Value) -> StoreResult<Revision>;

    /// Status-subpath write: replaces only `status` on the stored object.
    async fn update_status(&self, target: &ObjectRef, status: Value) -> StoreResult<Revision>;

    async fn delete(&self, target: &ObjectRef) -> StoreResult<()>;
}
