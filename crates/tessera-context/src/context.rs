//! Contexts
//!
//! A context is a shared mutable container. Every mutation goes through
//! `apply` (or `apply_async` for cooperative kinds), which notifies
//! observers and runs the resource pool installed for the context's kind.
//! Reads take the storage lock directly and never run hooks.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_core::{ContextId, TesseraError, TesseraResult, Value};
use tokio::sync::Notify;
use tracing::warn;

use crate::{ContextData, ContextKind, HookCall, LinkPolicy, Mutation, PoolTable};

/// When an observer is called relative to the mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

/// What observers see
#[derive(Debug)]
pub struct MutationEvent<'a> {
    pub context: ContextId,
    pub kind: ContextKind,
    pub mutation: &'a Mutation,
    pub phase: Phase,
    /// Only meaningful after the mutation
    pub failed: bool,
}

pub type Observer = dyn Fn(&MutationEvent<'_>) -> Result<(), String> + Send + Sync;

/// Shared mutable state
pub struct Context {
    id: ContextId,
    kind: ContextKind,
    link: LinkPolicy,
    data: RwLock<ContextData>,
    pools: Arc<PoolTable>,
    observers: RwLock<Vec<Arc<Observer>>>,
    ready: Notify,
}

impl Context {
    /// Create a context with a fresh id. Registries call this; a context
    /// made here directly is not part of any graph.
    pub fn new(kind: ContextKind, link: LinkPolicy, pools: Arc<PoolTable>) -> Self {
        Self {
            id: ContextId::fresh(),
            kind,
            link,
            data: RwLock::new(ContextData::new(kind)),
            pools,
            observers: RwLock::new(Vec::new()),
            ready: Notify::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn link_policy(&self) -> &LinkPolicy {
        &self.link
    }

    /// Register an observer called before and after every mutation
    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&MutationEvent<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    /// Instantiate the resource managers for this context, if its kind has a pool
    pub fn prepare(&self) -> bool {
        match self.pools.get(self.kind) {
            Some(pool) => {
                pool.prepare(self.id);
                true
            }
            None => false,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.pools
            .get(self.kind)
            .map(|pool| pool.is_prepared(self.id))
            .unwrap_or(false)
    }

    /// Apply a mutation with blocking hooks
    pub fn apply(&self, mutation: Mutation) -> TesseraResult<Option<Value>> {
        self.notify(&mutation, Phase::Before, false)?;

        let outcome = match self.pools.get(self.kind) {
            Some(pool) if pool.intercepts(mutation.method()) => {
                pool.run(self.hook_call(&mutation), || self.mutate(&mutation))
            }
            _ => self.mutate(&mutation),
        };

        self.finish(&mutation, outcome)
    }

    /// Apply a mutation with cooperative hooks
    pub async fn apply_async(&self, mutation: Mutation) -> TesseraResult<Option<Value>> {
        self.notify(&mutation, Phase::Before, false)?;

        let outcome = match self.pools.get(self.kind) {
            Some(pool) if pool.intercepts(mutation.method()) => {
                let body = async { self.mutate(&mutation) };
                pool.run_async(self.hook_call(&mutation), body).await
            }
            _ => self.mutate(&mutation),
        };

        self.finish(&mutation, outcome)
    }

    /// Dequeue, waiting until an item is available
    pub async fn take(&self) -> TesseraResult<Value> {
        loop {
            if let Some(value) = self.apply_async(Mutation::Take).await? {
                return Ok(value);
            }
            self.ready.notified().await;
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> TesseraResult<Option<Value>> {
        self.apply(Mutation::insert(key, value))
    }

    pub fn remove(&self, key: impl Into<String>) -> TesseraResult<Option<Value>> {
        self.apply(Mutation::remove(key))
    }

    pub fn push(&self, value: impl Into<Value>) -> TesseraResult<()> {
        self.apply(Mutation::Push(value.into())).map(|_| ())
    }

    pub fn put(&self, value: impl Into<Value>) -> TesseraResult<()> {
        self.apply(Mutation::Put(value.into())).map(|_| ())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key)
    }

    pub fn at(&self, index: isize) -> Option<Value> {
        self.data.read().at(index)
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        self.data.read().bytes().map(<[u8]>::to_vec)
    }

    /// Read the storage under the lock
    pub fn read<R>(&self, f: impl FnOnce(&ContextData) -> R) -> R {
        f(&self.data.read())
    }

    pub fn snapshot(&self) -> ContextData {
        self.data.read().clone()
    }

    /// Record the supercontext under the policy's up key
    pub fn bind_supercontext(&self, parent: ContextId) -> TesseraResult<()> {
        let Some(key) = self.link.up_key() else {
            return Ok(());
        };
        if self.get(key) == Some(Value::Link(parent)) {
            return Ok(());
        }
        self.apply(Mutation::insert(key, parent)).map(|_| ())
    }

    /// Record a subcontext under the policy's down key
    pub fn bind_subcontext(&self, child: ContextId) -> TesseraResult<()> {
        let Some((key, multi)) = self.link.down_key() else {
            return Ok(());
        };
        let current = self.get(key);
        let next = if multi {
            let mut links = current
                .as_ref()
                .and_then(Value::as_list)
                .map(<[Value]>::to_vec)
                .unwrap_or_default();
            if links.contains(&Value::Link(child)) {
                return Ok(());
            }
            links.push(Value::Link(child));
            Value::List(links)
        } else {
            if current == Some(Value::Link(child)) {
                return Ok(());
            }
            Value::Link(child)
        };
        self.apply(Mutation::insert(key, next)).map(|_| ())
    }

    fn hook_call(&self, mutation: &Mutation) -> HookCall {
        HookCall {
            context: self.id,
            kind: self.kind,
            method: mutation.method(),
        }
    }

    fn mutate(&self, mutation: &Mutation) -> TesseraResult<Option<Value>> {
        let out = self.data.write().apply(mutation, self.id, self.kind)?;
        if matches!(mutation, Mutation::Put(_)) {
            self.ready.notify_one();
        }
        Ok(out)
    }

    /// After-observers cannot undo a committed mutation, so their
    /// failures are logged and the mutation's own outcome is returned.
    fn finish(
        &self,
        mutation: &Mutation,
        outcome: TesseraResult<Option<Value>>,
    ) -> TesseraResult<Option<Value>> {
        if let Err(err) = self.notify(mutation, Phase::After, outcome.is_err()) {
            warn!("{}: observer failed after {}: {}", self.id, mutation.method(), err);
        }
        outcome
    }

    fn notify(&self, mutation: &Mutation, phase: Phase, failed: bool) -> TesseraResult<()> {
        let observers = self.observers.read().clone();
        if observers.is_empty() {
            return Ok(());
        }
        let event = MutationEvent {
            context: self.id,
            kind: self.kind,
            mutation,
            phase,
            failed,
        };
        for observer in observers {
            observer(&event).map_err(TesseraError::Observer)?;
        }
        Ok(())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.pools.forget(self.id);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("len", &self.len())
            .finish()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Context {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LockManager, ManagerFactory, ResourcePool};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn context(kind: ContextKind) -> Context {
        Context::new(kind, kind.default_link_policy(), Arc::new(PoolTable::new()))
    }

    #[test]
    fn test_identity_not_value_equality() {
        let a = context(ContextKind::Dict);
        let b = context(ContextKind::Dict);
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_observers_see_both_phases() {
        let ctx = context(ContextKind::Dict);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        ctx.observe(move |event| {
            sink.lock().push((event.phase, event.mutation.method(), event.failed));
            Ok(())
        });

        ctx.insert("a", 1).unwrap();
        assert!(ctx.apply(Mutation::Take).is_err());
        assert_eq!(
            *seen.lock(),
            vec![
                (Phase::Before, "insert", false),
                (Phase::After, "insert", false),
                (Phase::Before, "take", false),
                (Phase::After, "take", true),
            ]
        );
    }

    #[test]
    fn test_observer_failure_aborts_mutation() {
        let ctx = context(ContextKind::Dict);
        ctx.observe(|event| match event.phase {
            Phase::Before => Err("read only".to_string()),
            Phase::After => Ok(()),
        });
        let err = ctx.insert("a", 1).unwrap_err();
        assert!(matches!(err, TesseraError::Observer(ref msg) if msg == "read only"));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_after_observer_failure_keeps_committed_write() {
        let ctx = context(ContextKind::Dict);
        ctx.observe(|event| match event.phase {
            Phase::Before => Ok(()),
            Phase::After => Err("audit log unavailable".to_string()),
        });
        assert_eq!(ctx.apply(Mutation::insert("a", 1)).unwrap(), None);
        assert_eq!(ctx.get("a"), Some(Value::Int(1)));
    }

    #[test]
    fn test_mutation_runs_through_pool() {
        let pools = Arc::new(PoolTable::new());
        pools.install(
            ResourcePool::builder(ContextKind::Dict)
                .per_context(ManagerFactory::sync(LockManager::new))
                .build()
                .unwrap(),
        );
        let ctx = Context::new(ContextKind::Dict, LinkPolicy::None, pools.clone());
        assert!(!ctx.is_prepared());
        ctx.insert("k", "v").unwrap();
        assert!(ctx.is_prepared());
        assert_eq!(ctx.get("k"), Some(Value::from("v")));

        let id = ctx.id();
        drop(ctx);
        assert!(!pools.get(ContextKind::Dict).unwrap().is_prepared(id));
    }

    #[test]
    fn test_linking_is_idempotent() {
        let parent = Context::new(ContextKind::Dict, LinkPolicy::rooted_tree(), Arc::new(PoolTable::new()));
        let writes = Arc::new(Mutex::new(0));
        let counter = writes.clone();
        parent.observe(move |event| {
            if event.phase == Phase::After {
                *counter.lock() += 1;
            }
            Ok(())
        });

        let child = ContextId::new(99);
        parent.bind_subcontext(child).unwrap();
        parent.bind_subcontext(child).unwrap();
        assert_eq!(*writes.lock(), 1);
        assert_eq!(parent.get("__"), Some(Value::List(vec![Value::Link(child)])));
    }

    #[tokio::test]
    async fn test_take_waits_for_put() {
        let ctx = Arc::new(context(ContextKind::AsyncQueue));
        let consumer = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.take().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.apply_async(Mutation::Put(5.into())).await.unwrap();

        let taken = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(taken, Value::Int(5));
    }

    #[tokio::test]
    async fn test_take_on_non_queue_fails() {
        let ctx = context(ContextKind::List);
        assert!(matches!(ctx.take().await, Err(TesseraError::KindMismatch { .. })));
    }
}
