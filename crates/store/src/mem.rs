//! Deterministic in-memory store used by tests and local dry runs.

use std::sync::Mutex;

use converge_core::ObjectRef;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use crate::{ObjectStore, Revision, StoreError, StoreResult, StoredObject};

/// Operations attempted against a [`MemStore`], in call order. Failed
/// writes are recorded too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Get(ObjectRef),
    Create(ObjectRef),
    Update(ObjectRef),
    UpdateStatus(ObjectRef),
    Delete(ObjectRef),
}

impl Op {
    pub fn is_write(&self) -> bool {
        !matches!(self, Op::Get(_))
    }

    pub fn target(&self) -> &ObjectRef {
        match self {
            Op::Get(t) | Op::Create(t) | Op::Update(t) | Op::UpdateStatus(t) | Op::Delete(t) => t,
        }
    }
}

#[derive(Default)]
struct Inner {
    objects: FxHashMap<ObjectRef, (u64, Value)>,
    next_revision: u64,
    ops: Vec<Op>,
    fail_next_write: FxHashMap<ObjectRef, StoreError>,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn take_failure(&mut self, target: &ObjectRef) -> Option<StoreError> {
        self.fail_next_write.remove(target)
    }
}

/// In-memory [`ObjectStore`] with monotonic revisions, an operation log and
/// one-shot write-failure injection.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mem store lock poisoned")
    }

    /// Insert an object directly, bypassing the op log. Returns the
    /// assigned revision.
    pub fn seed(&self, target: &ObjectRef, body: Value) -> Revision {
        let mut inner = self.lock();
        let rev = inner.bump();
        inner.objects.insert(target.clone(), (rev, body));
        rev.to_string()
    }

    /// Mutate a stored body in place, as an out-of-band writer would; the
    /// revision is bumped.
    pub fn tamper(&self, target: &ObjectRef, mutate: impl FnOnce(&mut Value)) {
        let mut inner = self.lock();
        let rev = inner.bump();
        if let Some((stored_rev, body)) = inner.objects.get_mut(target) {
            *stored_rev = rev;
            mutate(body);
        }
    }

    /// Fail the next write (create/update/status/delete) against `target`
    /// with `err`; consumed once.
    pub fn fail_next_write(&self, target: &ObjectRef, err: StoreError) {
        self.lock().fail_next_write.insert(target.clone(), err);
    }

    pub fn contains(&self, target: &ObjectRef) -> bool {
        self.lock().objects.contains_key(target)
    }

    pub fn body_of(&self, target: &ObjectRef) -> Option<Value> {
        self.lock().objects.get(target).map(|(_, body)| body.clone())
    }

    pub fn revision_of(&self, target: &ObjectRef) -> Option<Revision> {
        self.lock().objects.get(target).map(|(rev, _)| rev.to_string())
    }

    /// Drain the recorded operation log.
    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut self.lock().ops)
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemStore {
    async fn get(&self, target: &ObjectRef) -> StoreResult<Option<StoredObject>> {
        let mut inner = self.lock();
        inner.ops.push(Op::Get(target.clone()));
        Ok(inner.objects.get(target).map(|(rev, body)| StoredObject {
            revision: rev.to_string(),
            body: body.clone(),
        }))
    }

    async fn create(&self, target: &ObjectRef, body: Value) -> StoreResult<Revision> {
        let mut inner = self.lock();
        inner.ops.push(Op::Create(target.clone()));
        if let Some(err) = inner.take_failure(target) {
            return Err(err);
        }
        if inner.objects.contains_key(target) {
            return Err(StoreError::Conflict(format!("{target}: already exists")));
        }
        let rev = inner.bump();
        inner.objects.insert(target.clone(), (rev, body));
        debug!(target = %target, revision = rev, "created");
        Ok(rev.to_string())
    }

    async fn update(&self, target: &ObjectRef, expected: &str, body: Value) -> StoreResult<Revision> {
        let mut inner = self.lock();
        inner.ops.push(Op::Update(target.clone()));
        if let Some(err) = inner.take_failure(target) {
            return Err(err);
        }
        let current_rev = match inner.objects.get(target) {
            Some((rev, _)) => *rev,
            None => return Err(StoreError::NotFound(target.to_string())),
        };
        if current_rev.to_string() != expected {
            return Err(StoreError::Conflict(format!(
                "{target}: revision {expected} is stale"
            )));
        }
        let rev = inner.bump();
        inner.objects.insert(target.clone(), (rev, body));
        Ok(rev.to_string())
    }

    async fn update_status(&self, target: &ObjectRef, status: Value) -> StoreResult<Revision> {
        let mut inner = self.lock();
        inner.ops.push(Op::UpdateStatus(target.clone()));
        if let Some(err) = inner.take_failure(target) {
            return Err(err);
        }
        let rev = inner.bump();
        let Some((stored_rev, body)) = inner.objects.get_mut(target) else {
            return Err(StoreError::NotFound(target.to_string()));
        };
        *stored_rev = rev;
        body["status"] = status;
        Ok(rev.to_string())
    }

    async fn delete(&self, target: &ObjectRef) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.ops.push(Op::Delete(target.clone()));
        if let Some(err) = inner.take_failure(target) {
            return Err(err);
        }
        if inner.objects.remove(target).is_none() {
            return Err(StoreError::NotFound(target.to_string()));
        }
        Ok(())
    }
}
