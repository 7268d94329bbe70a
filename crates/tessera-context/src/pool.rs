//! Hook / resource pool
//!
//! A pool is configured per context kind. Around every intercepted
//! mutation it acquires each resource manager in registration order,
//! runs the mutation, then releases them in reverse order. Releases run
//! on every exit path. The first release failure is reported once all
//! releases have been attempted, unless the mutation itself failed.
//!
//! Managers come from two lists of factories:
//! - per-kind factories, instantiated once and shared by every context
//! - per-context factories, instantiated the first time a context is touched

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tessera_core::{ContextId, TesseraError, TesseraResult};
use tracing::{debug, trace, warn};

use crate::{ContextKind, HookMode};

/// The intercepted call, as seen by a resource manager
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookCall {
    pub context: ContextId,
    pub kind: ContextKind,
    pub method: &'static str,
}

/// Whatever a manager needs to carry from acquire to release
#[derive(Default)]
pub struct Ticket(Option<Box<dyn Any + Send>>);

impl Ticket {
    pub fn empty() -> Self {
        Ticket(None)
    }

    pub fn new<T: Any + Send>(value: T) -> Self {
        Ticket(Some(Box::new(value)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn downcast<T: Any>(self) -> Option<T> {
        self.0.and_then(|b| b.downcast::<T>().ok()).map(|b| *b)
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Ticket(..)"),
            None => f.write_str("Ticket(empty)"),
        }
    }
}

/// Blocking resource manager
pub trait ResourceManager: Send + Sync {
    fn name(&self) -> &str;

    fn acquire(&self, call: &HookCall) -> TesseraResult<Ticket>;

    /// `failed` is true when the guarded mutation returned an error
    fn release(&self, call: &HookCall, ticket: Ticket, failed: bool) -> TesseraResult<()>;
}

/// Cooperative resource manager, awaited around async mutations
#[async_trait]
pub trait AsyncResourceManager: Send + Sync {
    fn name(&self) -> &str;

    async fn acquire(&self, call: &HookCall) -> TesseraResult<Ticket>;

    async fn release(&self, call: &HookCall, ticket: Ticket, failed: bool) -> TesseraResult<()>;

    /// Called instead of `release` when the operation was cancelled.
    /// Must not block.
    fn abandon(&self, _call: &HookCall, ticket: Ticket) {
        drop(ticket);
    }
}

/// An instantiated manager
#[derive(Clone)]
pub enum Manager {
    Sync(Arc<dyn ResourceManager>),
    Async(Arc<dyn AsyncResourceManager>),
}

impl Manager {
    pub fn name(&self) -> &str {
        match self {
            Manager::Sync(m) => m.name(),
            Manager::Async(m) => m.name(),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Manager::Async(_))
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Manager::Sync(m) => write!(f, "Sync({})", m.name()),
            Manager::Async(m) => write!(f, "Async({})", m.name()),
        }
    }
}

type SyncFactory = dyn Fn() -> Arc<dyn ResourceManager> + Send + Sync;
type AsyncFactory = dyn Fn() -> Arc<dyn AsyncResourceManager> + Send + Sync;

/// Builds managers on demand
#[derive(Clone)]
pub enum ManagerFactory {
    Sync(Arc<SyncFactory>),
    Async(Arc<AsyncFactory>),
}

impl ManagerFactory {
    pub fn sync<M, F>(factory: F) -> Self
    where
        M: ResourceManager + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        ManagerFactory::Sync(Arc::new(move || Arc::new(factory()) as Arc<dyn ResourceManager>))
    }

    pub fn asynchronous<M, F>(factory: F) -> Self
    where
        M: AsyncResourceManager + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        ManagerFactory::Async(Arc::new(move || {
            Arc::new(factory()) as Arc<dyn AsyncResourceManager>
        }))
    }

    pub fn build(&self) -> Manager {
        match self {
            ManagerFactory::Sync(f) => Manager::Sync(f()),
            ManagerFactory::Async(f) => Manager::Async(f()),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, ManagerFactory::Async(_))
    }
}

impl fmt::Debug for ManagerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerFactory::Sync(_) => f.write_str("ManagerFactory::Sync"),
            ManagerFactory::Async(_) => f.write_str("ManagerFactory::Async"),
        }
    }
}

/// Builder for [`ResourcePool`]
#[derive(Debug)]
pub struct ResourcePoolBuilder {
    kind: ContextKind,
    per_kind: Vec<ManagerFactory>,
    per_context: Vec<ManagerFactory>,
    methods: HashSet<String>,
}

impl ResourcePoolBuilder {
    pub fn per_kind(mut self, factory: ManagerFactory) -> Self {
        self.per_kind.push(factory);
        self
    }

    pub fn per_context(mut self, factory: ManagerFactory) -> Self {
        self.per_context.push(factory);
        self
    }

    /// Restrict interception to the named mutation methods
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.insert(method.into());
        self
    }

    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods.extend(methods.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> TesseraResult<ResourcePool> {
        if self.kind.hook_mode() == HookMode::Blocking
            && self.per_kind.iter().chain(&self.per_context).any(ManagerFactory::is_async)
        {
            return Err(TesseraError::HookConfig(format!(
                "async resource managers cannot guard blocking {} contexts",
                self.kind.name()
            )));
        }
        Ok(ResourcePool {
            kind: self.kind,
            per_kind: self.per_kind,
            per_context: self.per_context,
            methods: self.methods,
            shared: OnceLock::new(),
            prepared: Mutex::new(HashMap::new()),
        })
    }
}

/// Acquire/release interception for one context kind
pub struct ResourcePool {
    kind: ContextKind,
    per_kind: Vec<ManagerFactory>,
    per_context: Vec<ManagerFactory>,
    /// Empty means every method
    methods: HashSet<String>,
    shared: OnceLock<Vec<Manager>>,
    prepared: Mutex<HashMap<ContextId, Arc<Vec<Manager>>>>,
}

impl ResourcePool {
    pub fn builder(kind: ContextKind) -> ResourcePoolBuilder {
        ResourcePoolBuilder {
            kind,
            per_kind: Vec::new(),
            per_context: Vec::new(),
            methods: HashSet::new(),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn intercepts(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    pub fn is_prepared(&self, context: ContextId) -> bool {
        self.prepared.lock().contains_key(&context)
    }

    /// Drop the managers held for a context
    pub fn forget(&self, context: ContextId) {
        self.prepared.lock().remove(&context);
    }

    /// Managers for a context, instantiating them on first touch
    pub fn prepare(&self, context: ContextId) -> Arc<Vec<Manager>> {
        let mut prepared = self.prepared.lock();
        if let Some(managers) = prepared.get(&context) {
            return managers.clone();
        }

        let shared = self
            .shared
            .get_or_init(|| self.per_kind.iter().map(ManagerFactory::build).collect());
        let managers: Vec<Manager> = shared
            .iter()
            .cloned()
            .chain(self.per_context.iter().map(ManagerFactory::build))
            .collect();
        debug!(
            "Prepared {} resource manager(s) for {} ({})",
            managers.len(),
            context,
            self.kind.name()
        );

        let managers = Arc::new(managers);
        prepared.insert(context, managers.clone());
        managers
    }

    /// Run a blocking mutation between acquire and release
    pub fn run<R>(
        &self,
        call: HookCall,
        body: impl FnOnce() -> TesseraResult<R>,
    ) -> TesseraResult<R> {
        let managers = self.prepare(call.context);
        if managers.iter().any(Manager::is_async) {
            return Err(TesseraError::KindMismatch {
                context: call.context,
                kind: call.kind.name(),
                method: call.method,
            });
        }

        let mut held: Vec<(&Arc<dyn ResourceManager>, Ticket)> = Vec::with_capacity(managers.len());
        for manager in managers.iter() {
            let Manager::Sync(manager) = manager else {
                continue;
            };
            trace!("acquire {} for {} {}", manager.name(), call.context, call.method);
            match manager.acquire(&call) {
                Ok(ticket) => held.push((manager, ticket)),
                Err(err) => {
                    for (held_manager, ticket) in held.into_iter().rev() {
                        if let Err(release_err) = held_manager.release(&call, ticket, true) {
                            warn!(
                                "Release of {} failed after acquire error: {}",
                                held_manager.name(),
                                release_err
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        let outcome = body();
        let failed = outcome.is_err();

        let mut release_errors = Vec::new();
        for (manager, ticket) in held.into_iter().rev() {
            trace!("release {} for {} {}", manager.name(), call.context, call.method);
            if let Err(err) = manager.release(&call, ticket, failed) {
                release_errors.push((manager.name().to_string(), err));
            }
        }

        settle(outcome, release_errors)
    }

    /// Run a cooperative mutation between acquire and release.
    ///
    /// If the returned future is dropped early, every held ticket is
    /// abandoned in reverse order.
    pub async fn run_async<R, F>(&self, call: HookCall, body: F) -> TesseraResult<R>
    where
        F: Future<Output = TesseraResult<R>>,
    {
        let managers = self.prepare(call.context);
        let mut pending = PendingRelease {
            call,
            held: Vec::with_capacity(managers.len()),
        };

        for manager in managers.iter() {
            trace!("acquire {} for {} {}", manager.name(), call.context, call.method);
            let acquired = match manager {
                Manager::Sync(m) => m.acquire(&call),
                Manager::Async(m) => m.acquire(&call).await,
            };
            match acquired {
                Ok(ticket) => pending.held.push((manager.clone(), ticket)),
                Err(err) => {
                    while let Some((held, ticket)) = pending.held.pop() {
                        if let Err(release_err) = release_one(&held, &call, ticket, true).await {
                            warn!(
                                "Release of {} failed after acquire error: {}",
                                held.name(),
                                release_err
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        let outcome = body.await;
        let failed = outcome.is_err();

        let mut release_errors = Vec::new();
        while let Some((manager, ticket)) = pending.held.pop() {
            trace!("release {} for {} {}", manager.name(), call.context, call.method);
            if let Err(err) = release_one(&manager, &call, ticket, failed).await {
                release_errors.push((manager.name().to_string(), err));
            }
        }

        settle(outcome, release_errors)
    }

    /// Pool running `other`'s managers after this one's.
    ///
    /// Contexts already prepared keep their managers; only `other`'s are
    /// built for them, so per-context locks survive the merge.
    fn merged_with(&self, other: ResourcePool) -> ResourcePool {
        let methods = if self.methods.is_empty() || other.methods.is_empty() {
            HashSet::new()
        } else {
            self.methods.union(&other.methods).cloned().collect()
        };

        let (shared, prepared) = match self.shared.get() {
            Some(old_shared) => {
                let added: Vec<Manager> = other.per_kind.iter().map(ManagerFactory::build).collect();
                let prepared: HashMap<ContextId, Arc<Vec<Manager>>> = self
                    .prepared
                    .lock()
                    .iter()
                    .map(|(context, managers)| {
                        let (kind_wide, own) = managers.split_at(old_shared.len().min(managers.len()));
                        let merged: Vec<Manager> = kind_wide
                            .iter()
                            .chain(&added)
                            .chain(own)
                            .cloned()
                            .chain(other.per_context.iter().map(ManagerFactory::build))
                            .collect();
                        (*context, Arc::new(merged))
                    })
                    .collect();
                let shared: Vec<Manager> = old_shared.iter().chain(&added).cloned().collect();
                (OnceLock::from(shared), prepared)
            }
            // Nothing was prepared yet
            None => (OnceLock::new(), HashMap::new()),
        };

        ResourcePool {
            kind: self.kind,
            per_kind: self.per_kind.iter().cloned().chain(other.per_kind).collect(),
            per_context: self
                .per_context
                .iter()
                .cloned()
                .chain(other.per_context)
                .collect(),
            methods,
            shared,
            prepared: Mutex::new(prepared),
        }
    }
}

impl fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("kind", &self.kind)
            .field("per_kind", &self.per_kind.len())
            .field("per_context", &self.per_context.len())
            .field("methods", &self.methods)
            .finish()
    }
}

async fn release_one(
    manager: &Manager,
    call: &HookCall,
    ticket: Ticket,
    failed: bool,
) -> TesseraResult<()> {
    match manager {
        Manager::Sync(m) => m.release(call, ticket, failed),
        Manager::Async(m) => m.release(call, ticket, failed).await,
    }
}

/// The body's error wins; otherwise the first release error is reported
fn settle<R>(
    outcome: TesseraResult<R>,
    release_errors: Vec<(String, TesseraError)>,
) -> TesseraResult<R> {
    match outcome {
        Err(err) => {
            for (manager, release_err) in release_errors {
                warn!("Release of {} failed: {}", manager, release_err);
            }
            Err(err)
        }
        Ok(value) => match release_errors.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(value),
        },
    }
}

/// Tickets still held by an in-flight async call
struct PendingRelease {
    call: HookCall,
    held: Vec<(Manager, Ticket)>,
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        while let Some((manager, ticket)) = self.held.pop() {
            debug!(
                "Abandoning {} for cancelled {} on {}",
                manager.name(),
                self.call.method,
                self.call.context
            );
            match manager {
                Manager::Async(m) => m.abandon(&self.call, ticket),
                Manager::Sync(m) => {
                    if let Err(err) = m.release(&self.call, ticket, true) {
                        warn!("Release of {} failed during cancellation: {}", m.name(), err);
                    }
                }
            }
        }
    }
}

/// Per-kind pools, shared by a registry and every context it creates
#[derive(Debug, Default)]
pub struct PoolTable {
    pools: RwLock<HashMap<ContextKind, Arc<ResourcePool>>>,
}

impl PoolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ContextKind) -> Option<Arc<ResourcePool>> {
        self.pools.read().get(&kind).cloned()
    }

    /// Install a pool, merging it after any pool already set for the kind
    pub fn install(&self, pool: ResourcePool) -> Arc<ResourcePool> {
        let mut pools = self.pools.write();
        let kind = pool.kind;
        let pool = match pools.get(&kind) {
            Some(existing) => existing.merged_with(pool),
            None => pool,
        };
        debug!(
            "Installed resource pool for {} ({} per-kind, {} per-context)",
            kind.name(),
            pool.per_kind.len(),
            pool.per_context.len()
        );
        let pool = Arc::new(pool);
        pools.insert(kind, pool.clone());
        pool
    }

    pub fn forget(&self, context: ContextId) {
        for pool in self.pools.read().values() {
            pool.forget(context);
        }
    }
}

/// Per-context mutual exclusion for blocking kinds
#[derive(Debug, Default)]
pub struct LockManager {
    lock: Arc<Mutex<()>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceManager for LockManager {
    fn name(&self) -> &str {
        "lock"
    }

    fn acquire(&self, _call: &HookCall) -> TesseraResult<Ticket> {
        Ok(Ticket::new(self.lock.lock_arc()))
    }

    fn release(&self, _call: &HookCall, ticket: Ticket, _failed: bool) -> TesseraResult<()> {
        drop(ticket);
        Ok(())
    }
}

/// Per-context mutual exclusion for cooperative kinds
#[derive(Debug, Default)]
pub struct AsyncLockManager {
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl AsyncLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AsyncResourceManager for AsyncLockManager {
    fn name(&self) -> &str {
        "async-lock"
    }

    async fn acquire(&self, _call: &HookCall) -> TesseraResult<Ticket> {
        Ok(Ticket::new(self.lock.clone().lock_owned().await))
    }

    async fn release(&self, _call: &HookCall, ticket: Ticket, _failed: bool) -> TesseraResult<()> {
        drop(ticket);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Event {
        Acquire(usize),
        Release(usize, bool),
        Abandon(usize),
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    struct Recorder {
        id: usize,
        log: Log,
        fail_acquire: bool,
        fail_release: bool,
    }

    impl ResourceManager for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn acquire(&self, _call: &HookCall) -> TesseraResult<Ticket> {
            if self.fail_acquire {
                return Err(TesseraError::Resource {
                    manager: "recorder".into(),
                    reason: format!("acquire {}", self.id),
                });
            }
            self.log.lock().push(Event::Acquire(self.id));
            Ok(Ticket::new(self.id))
        }

        fn release(&self, _call: &HookCall, ticket: Ticket, failed: bool) -> TesseraResult<()> {
            assert_eq!(ticket.downcast::<usize>(), Some(self.id));
            self.log.lock().push(Event::Release(self.id, failed));
            if self.fail_release {
                return Err(TesseraError::Resource {
                    manager: "recorder".into(),
                    reason: format!("release {}", self.id),
                });
            }
            Ok(())
        }
    }

    struct AsyncRecorder {
        id: usize,
        log: Log,
    }

    #[async_trait]
    impl AsyncResourceManager for AsyncRecorder {
        fn name(&self) -> &str {
            "async-recorder"
        }

        async fn acquire(&self, _call: &HookCall) -> TesseraResult<Ticket> {
            tokio::task::yield_now().await;
            self.log.lock().push(Event::Acquire(self.id));
            Ok(Ticket::new(self.id))
        }

        async fn release(&self, _call: &HookCall, _ticket: Ticket, failed: bool) -> TesseraResult<()> {
            self.log.lock().push(Event::Release(self.id, failed));
            Ok(())
        }

        fn abandon(&self, _call: &HookCall, _ticket: Ticket) {
            self.log.lock().push(Event::Abandon(self.id));
        }
    }

    fn recorder(id: usize, log: &Log, fail_acquire: bool, fail_release: bool) -> ManagerFactory {
        let log = log.clone();
        ManagerFactory::sync(move || Recorder {
            id,
            log: log.clone(),
            fail_acquire,
            fail_release,
        })
    }

    fn call(kind: ContextKind) -> HookCall {
        HookCall {
            context: ContextId::new(7),
            kind,
            method: "insert",
        }
    }

    #[test]
    fn test_release_runs_in_reverse_order() {
        let log = Log::default();
        let pool = ResourcePool::builder(ContextKind::Dict)
            .per_kind(recorder(0, &log, false, false))
            .per_context(recorder(1, &log, false, false))
            .build()
            .unwrap();

        let out = pool.run(call(ContextKind::Dict), || Ok(42)).unwrap();
        assert_eq!(out, 42);
        assert_eq!(
            *log.lock(),
            vec![
                Event::Acquire(0),
                Event::Acquire(1),
                Event::Release(1, false),
                Event::Release(0, false),
            ]
        );
    }

    #[test]
    fn test_body_error_still_releases() {
        let log = Log::default();
        let pool = ResourcePool::builder(ContextKind::List)
            .per_context(recorder(0, &log, false, true))
            .build()
            .unwrap();

        let err = pool
            .run::<()>(call(ContextKind::List), || Err(TesseraError::NoContext))
            .unwrap_err();
        assert!(matches!(err, TesseraError::NoContext));
        assert_eq!(*log.lock(), vec![Event::Acquire(0), Event::Release(0, true)]);
    }

    #[test]
    fn test_first_release_error_reported_after_all_releases() {
        let log = Log::default();
        let pool = ResourcePool::builder(ContextKind::Dict)
            .per_context(recorder(0, &log, false, true))
            .per_context(recorder(1, &log, false, true))
            .build()
            .unwrap();

        let err = pool.run(call(ContextKind::Dict), || Ok(())).unwrap_err();
        match err {
            TesseraError::Resource { reason, .. } => assert_eq!(reason, "release 1"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn test_acquire_failure_releases_held() {
        let log = Log::default();
        let pool = ResourcePool::builder(ContextKind::Dict)
            .per_context(recorder(0, &log, false, false))
            .per_context(recorder(1, &log, true, false))
            .build()
            .unwrap();

        let mut ran = false;
        let result = pool.run(call(ContextKind::Dict), || {
            ran = true;
            Ok(())
        });
        assert!(result.is_err());
        assert!(!ran);
        assert_eq!(*log.lock(), vec![Event::Acquire(0), Event::Release(0, true)]);
    }

    #[test]
    fn test_prepare_once_per_context() {
        let built = Arc::new(Mutex::new(0usize));
        let counter = built.clone();
        let pool = ResourcePool::builder(ContextKind::Dict)
            .per_context(ManagerFactory::sync(move || {
                *counter.lock() += 1;
                LockManager::new()
            }))
            .build()
            .unwrap();

        let id = ContextId::new(1);
        assert!(!pool.is_prepared(id));
        for _ in 0..3 {
            pool.prepare(id);
        }
        pool.prepare(ContextId::new(2));
        assert!(pool.is_prepared(id));
        assert_eq!(*built.lock(), 2);

        pool.forget(id);
        assert!(!pool.is_prepared(id));
    }

    #[test]
    fn test_method_filter() {
        let pool = ResourcePool::builder(ContextKind::Dict)
            .method("insert")
            .build()
            .unwrap();
        assert!(pool.intercepts("insert"));
        assert!(!pool.intercepts("remove"));

        let all = ResourcePool::builder(ContextKind::Dict).build().unwrap();
        assert!(all.intercepts("remove"));
    }

    #[test]
    fn test_async_manager_rejected_on_blocking_kind() {
        let result = ResourcePool::builder(ContextKind::Queue)
            .per_context(ManagerFactory::asynchronous(AsyncLockManager::new))
            .build();
        assert!(matches!(result, Err(TesseraError::HookConfig(_))));
    }

    #[test]
    fn test_install_merges_pools() {
        let table = PoolTable::new();
        table.install(
            ResourcePool::builder(ContextKind::Dict)
                .per_context(ManagerFactory::sync(LockManager::new))
                .method("insert")
                .build()
                .unwrap(),
        );
        let merged = table.install(
            ResourcePool::builder(ContextKind::Dict)
                .per_context(ManagerFactory::sync(LockManager::new))
                .method("remove")
                .build()
                .unwrap(),
        );
        assert_eq!(merged.prepare(ContextId::new(1)).len(), 2);
        assert!(merged.intercepts("insert") && merged.intercepts("remove"));
        assert!(!merged.intercepts("clear"));
    }

    #[test]
    fn test_install_keeps_prepared_managers() {
        let built = Arc::new(Mutex::new(0usize));
        let counter = built.clone();
        let table = PoolTable::new();
        let first = table.install(
            ResourcePool::builder(ContextKind::Dict)
                .per_context(ManagerFactory::sync(move || {
                    *counter.lock() += 1;
                    LockManager::new()
                }))
                .build()
                .unwrap(),
        );
        let id = ContextId::new(1);
        let before = first.prepare(id);

        let merged = table.install(
            ResourcePool::builder(ContextKind::Dict)
                .per_context(ManagerFactory::sync(LockManager::new))
                .build()
                .unwrap(),
        );
        assert!(merged.is_prepared(id));
        let after = merged.prepare(id);
        assert_eq!(after.len(), 2);
        assert_eq!(*built.lock(), 1);
        match (&before[0], &after[0]) {
            (Manager::Sync(old), Manager::Sync(new)) => assert!(Arc::ptr_eq(old, new)),
            _ => panic!("expected blocking managers"),
        }

        merged.prepare(ContextId::new(2));
        assert_eq!(*built.lock(), 2);
    }

    #[tokio::test]
    async fn test_async_run_orders_hooks() {
        let log = Log::default();
        let async_log = log.clone();
        let pool = ResourcePool::builder(ContextKind::AsyncQueue)
            .per_context(recorder(0, &log, false, false))
            .per_context(ManagerFactory::asynchronous(move || AsyncRecorder {
                id: 1,
                log: async_log.clone(),
            }))
            .build()
            .unwrap();

        let out = pool
            .run_async(call(ContextKind::AsyncQueue), async { Ok("done") })
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(
            *log.lock(),
            vec![
                Event::Acquire(0),
                Event::Acquire(1),
                Event::Release(1, false),
                Event::Release(0, false),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_call_abandons_tickets() {
        let log = Log::default();
        let async_log = log.clone();
        let pool = ResourcePool::builder(ContextKind::AsyncQueue)
            .per_context(recorder(0, &log, false, false))
            .per_context(ManagerFactory::asynchronous(move || AsyncRecorder {
                id: 1,
                log: async_log.clone(),
            }))
            .build()
            .unwrap();

        let body = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        };
        let timed = tokio::time::timeout(
            Duration::from_millis(10),
            pool.run_async(call(ContextKind::AsyncQueue), body),
        )
        .await;
        assert!(timed.is_err());
        assert_eq!(
            *log.lock(),
            vec![
                Event::Acquire(0),
                Event::Acquire(1),
                Event::Abandon(1),
                Event::Release(0, true),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_call_frees_async_lock() {
        let pool = ResourcePool::builder(ContextKind::AsyncQueue)
            .per_context(ManagerFactory::asynchronous(AsyncLockManager::new))
            .build()
            .unwrap();
        let c = call(ContextKind::AsyncQueue);

        let stuck = tokio::time::timeout(
            Duration::from_millis(10),
            pool.run_async(c, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }),
        )
        .await;
        assert!(stuck.is_err());

        let next = tokio::time::timeout(Duration::from_secs(1), pool.run_async(c, async { Ok(1) })).await;
        assert_eq!(next.unwrap().unwrap(), 1);
    }

    proptest! {
        #[test]
        fn prop_acquires_balance_releases(
            managers in 1usize..6,
            outcomes in proptest::collection::vec(any::<bool>(), 1..20),
        ) {
            let log = Log::default();
            let mut builder = ResourcePool::builder(ContextKind::Dict);
            for id in 0..managers {
                builder = builder.per_context(recorder(id, &log, false, false));
            }
            let pool = builder.build().unwrap();

            for ok in outcomes {
                log.lock().clear();
                let _ = pool.run(call(ContextKind::Dict), || {
                    if ok { Ok(()) } else { Err(TesseraError::NoContext) }
                });

                let events = log.lock().clone();
                let acquired: Vec<usize> = events.iter().filter_map(|e| match e {
                    Event::Acquire(id) => Some(*id),
                    _ => None,
                }).collect();
                let mut released: Vec<usize> = events.iter().filter_map(|e| match e {
                    Event::Release(id, _) => Some(*id),
                    _ => None,
                }).collect();
                let release_flags_match = events.iter().all(|e| match e {
                    Event::Release(_, failed) => *failed == !ok,
                    _ => true,
                });
                prop_assert!(release_flags_match);
                prop_assert_eq!(acquired.len(), managers);
                released.reverse();
                prop_assert_eq!(acquired, released);
            }
        }
    }
}
