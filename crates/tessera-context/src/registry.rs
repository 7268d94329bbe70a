//! Context registry
//!
//! Contexts are tracked by handle. The registry records structure only:
//! it holds weak references, so a context lives exactly as long as the
//! arrangements and records that share it. Parent and child links are
//! both indexed, which keeps `children` proportional to the fan-out.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tessera_core::{ContextId, TesseraError, TesseraResult};
use tracing::debug;

use crate::{
    AsyncLockManager, Context, ContextKind, HookMode, LinkPolicy, LockManager, ManagerFactory,
    PoolTable, ResourcePool,
};

#[derive(Default)]
struct Graph {
    contexts: HashMap<ContextId, Weak<Context>>,
    parents: HashMap<ContextId, ContextId>,
    children: HashMap<ContextId, Vec<ContextId>>,
}

impl Graph {
    fn unlink(&mut self, child: ContextId) {
        if let Some(old) = self.parents.remove(&child) {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.retain(|id| *id != child);
                if siblings.is_empty() {
                    self.children.remove(&old);
                }
            }
        }
    }
}

/// Arena of contexts and their super/sub links
pub struct ContextRegistry {
    graph: RwLock<Graph>,
    pools: Arc<PoolTable>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(Graph::default()),
            pools: Arc::new(PoolTable::new()),
        }
    }

    /// The process-wide registry
    pub fn global() -> Arc<ContextRegistry> {
        static GLOBAL: OnceLock<Arc<ContextRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ContextRegistry::new())).clone()
    }

    /// Create a context with the kind's default link policy
    pub fn create(&self, kind: ContextKind) -> Arc<Context> {
        let context = Arc::new(Context::new(kind, kind.default_link_policy(), self.pools.clone()));
        self.track(&context);
        context
    }

    pub fn create_with(&self, kind: ContextKind, link: LinkPolicy) -> TesseraResult<Arc<Context>> {
        if link != LinkPolicy::None && !kind.is_mapping() {
            return Err(TesseraError::KindMismatch {
                context: ContextId::ZERO,
                kind: kind.name(),
                method: "link",
            });
        }
        let context = Arc::new(Context::new(kind, link, self.pools.clone()));
        self.track(&context);
        Ok(context)
    }

    fn track(&self, context: &Arc<Context>) {
        self.graph
            .write()
            .contexts
            .insert(context.id(), Arc::downgrade(context));
        debug!("Created context {} ({})", context.id(), context.kind().name());
    }

    pub fn resolve(&self, id: ContextId) -> Option<Arc<Context>> {
        self.graph.read().contexts.get(&id).and_then(Weak::upgrade)
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.resolve(id).is_some()
    }

    /// Set or clear a context's parent.
    ///
    /// Rejects any link that would make a context its own ancestor.
    pub fn set_parent(&self, child: ContextId, parent: Option<ContextId>) -> TesseraResult<()> {
        let mut graph = self.graph.write();
        if !graph.contexts.contains_key(&child) {
            return Err(TesseraError::UnknownContext(child));
        }

        let Some(parent) = parent else {
            graph.unlink(child);
            return Ok(());
        };

        if !graph.contexts.contains_key(&parent) {
            return Err(TesseraError::UnknownContext(parent));
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(TesseraError::CyclicContext { child, parent });
            }
            cursor = graph.parents.get(&id).copied();
        }

        if graph.parents.get(&child) == Some(&parent) {
            return Ok(());
        }
        graph.unlink(child);
        graph.parents.insert(child, parent);
        graph.children.entry(parent).or_default().push(child);
        Ok(())
    }

    pub fn parent_id(&self, id: ContextId) -> Option<ContextId> {
        self.graph.read().parents.get(&id).copied()
    }

    pub fn parent(&self, id: ContextId) -> Option<Arc<Context>> {
        let graph = self.graph.read();
        graph
            .parents
            .get(&id)
            .and_then(|parent| graph.contexts.get(parent))
            .and_then(Weak::upgrade)
    }

    /// Live children in link order
    pub fn children(&self, id: ContextId) -> Vec<Arc<Context>> {
        let graph = self.graph.read();
        graph
            .children
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|child| graph.contexts.get(child).and_then(Weak::upgrade))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parent chain, nearest first
    pub fn ancestors(&self, id: ContextId) -> Vec<ContextId> {
        let graph = self.graph.read();
        let mut out = Vec::new();
        let mut cursor = graph.parents.get(&id).copied();
        while let Some(parent) = cursor {
            out.push(parent);
            cursor = graph.parents.get(&parent).copied();
        }
        out
    }

    /// Set the parent and run both sides' link policies
    pub fn connect(&self, context: &Arc<Context>, parent: Option<&Arc<Context>>) -> TesseraResult<()> {
        self.set_parent(context.id(), parent.map(|p| p.id()))?;
        if let Some(parent) = parent {
            context.bind_supercontext(parent.id())?;
            parent.bind_subcontext(context.id())?;
            debug!("Connected {} under {}", context.id(), parent.id());
        }
        Ok(())
    }

    pub fn pools(&self) -> &Arc<PoolTable> {
        &self.pools
    }

    pub fn install_pool(&self, pool: ResourcePool) -> Arc<ResourcePool> {
        self.pools.install(pool)
    }

    pub fn pool(&self, kind: ContextKind) -> Option<Arc<ResourcePool>> {
        self.pools.get(kind)
    }

    /// Guard every mutation of `kind` with a per-context blocking lock
    pub fn thread_safe(&self, kind: ContextKind) -> TesseraResult<Arc<ResourcePool>> {
        let pool = ResourcePool::builder(kind)
            .per_context(ManagerFactory::sync(LockManager::new))
            .build()?;
        Ok(self.install_pool(pool))
    }

    /// Guard every mutation of a cooperative `kind` with a per-context async lock
    pub fn async_safe(&self, kind: ContextKind) -> TesseraResult<Arc<ResourcePool>> {
        if kind.hook_mode() != HookMode::Cooperative {
            return Err(TesseraError::HookConfig(format!(
                "{} contexts are not cooperative",
                kind.name()
            )));
        }
        let pool = ResourcePool::builder(kind)
            .per_context(ManagerFactory::asynchronous(AsyncLockManager::new))
            .build()?;
        Ok(self.install_pool(pool))
    }

    /// Drop bookkeeping for contexts that no longer exist
    pub fn prune(&self) -> usize {
        let mut graph = self.graph.write();
        let dead: Vec<ContextId> = graph
            .contexts
            .iter()
            .filter(|(_, weak)| weak.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            graph.contexts.remove(id);
            graph.unlink(*id);
            if let Some(orphans) = graph.children.remove(id) {
                for orphan in orphans {
                    graph.parents.remove(&orphan);
                }
            }
        }
        if !dead.is_empty() {
            debug!("Pruned {} dead context(s)", dead.len());
        }
        dead.len()
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.graph
            .read()
            .contexts
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}
