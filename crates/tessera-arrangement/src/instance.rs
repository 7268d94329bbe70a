//! Instance arrangements
//!
//! Each instance gets a context from one of three branches:
//! - no descent: a fresh root context
//! - a descent, no `new_context`: the descent's context, shared
//! - a descent with `new_context`: a fresh context connected below the descent's
//!
//! Every branch ends by connecting the context into the registry, so
//! supercontext and subcontext queries hold for shared contexts too.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_context::{Context, ContextKind, ContextRegistry};
use tessera_core::{ArrangementId, InstanceId, TesseraError, TesseraResult};
use tracing::debug;

use crate::{resolve_kind, Declaration, SetupFn};

pub type InstanceDeclaration = Declaration<InstanceArrangement>;

/// Per-instance context bindings for one type
pub struct InstanceArrangement {
    id: ArrangementId,
    name: String,
    kind: ContextKind,
    new_context: bool,
    descent: Option<Arc<InstanceArrangement>>,
    registry: Arc<ContextRegistry>,
    setup: Option<Arc<SetupFn>>,
    /// `None` for abstract types
    contexts: Option<Mutex<HashMap<InstanceId, Arc<Context>>>>,
    /// Serializes first-touch preparation
    setup_lock: Mutex<()>,
}

impl InstanceArrangement {
    pub fn declare(declaration: InstanceDeclaration) -> TesseraResult<Arc<Self>> {
        Self::declare_in(&ContextRegistry::global(), declaration)
    }

    pub fn declare_in(
        registry: &Arc<ContextRegistry>,
        declaration: InstanceDeclaration,
    ) -> TesseraResult<Arc<Self>> {
        let new_context = declaration.has_new_context();
        let inherited = declaration.descent.as_ref().map(|d| d.kind);
        let kind = resolve_kind(
            &declaration.name,
            declaration.context_kind,
            inherited,
            new_context,
        )?;

        let contexts = (!declaration.is_abstract).then(|| Mutex::new(HashMap::new()));
        debug!(
            "Declared instance arrangement {} ({}, new_context={}, abstract={})",
            declaration.name,
            kind.name(),
            new_context,
            declaration.is_abstract
        );

        Ok(Arc::new(InstanceArrangement {
            id: ArrangementId::fresh(),
            name: declaration.name,
            kind,
            new_context,
            descent: declaration.descent,
            registry: registry.clone(),
            setup: declaration.setup,
            contexts,
            setup_lock: Mutex::new(()),
        }))
    }

    #[inline]
    pub fn id(&self) -> ArrangementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn has_new_context(&self) -> bool {
        self.new_context
    }

    pub fn descent(&self) -> Option<&Arc<InstanceArrangement>> {
        self.descent.as_ref()
    }

    pub fn is_abstract(&self) -> bool {
        self.contexts.is_none()
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Whether this arrangement is `other` or descends from it
    pub fn descends_from(&self, other: &InstanceArrangement) -> bool {
        let mut cursor = Some(self);
        while let Some(current) = cursor {
            if current.id == other.id {
                return true;
            }
            cursor = current.descent.as_deref();
        }
        false
    }

    /// Context bound to a live instance
    pub fn context_of(&self, instance: InstanceId) -> Option<Arc<Context>> {
        self.contexts.as_ref()?.lock().get(&instance).cloned()
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.contexts.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create an instance, optionally descending from another
    pub fn instantiate(self: &Arc<Self>, descent: Option<&Instance>) -> TesseraResult<Instance> {
        let contexts = self
            .contexts
            .as_ref()
            .ok_or_else(|| TesseraError::ArrangementType(format!("{} is an abstract class", self.name)))?;

        if let (Some(descent), Some(expected)) = (descent, &self.descent) {
            if !descent.arrangement.descends_from(expected) {
                return Err(TesseraError::ArrangementType(format!(
                    "descent of type {} is not a {}",
                    descent.arrangement.name, expected.name
                )));
            }
        }

        let (context, created) = match descent {
            Some(descent) if !self.new_context => (descent.context.clone(), false),
            Some(descent) => {
                let context = self.registry.create(self.kind);
                self.registry.connect(&context, Some(&descent.context))?;
                (context, true)
            }
            None => (self.registry.create(self.kind), true),
        };

        if created {
            let _guard = self.setup_lock.lock();
            context.prepare();
            if let Some(setup) = &self.setup {
                setup(&context)?;
            }
        }

        let parent = self.registry.parent(context.id());
        self.registry.connect(&context, parent.as_ref())?;

        let id = InstanceId::fresh();
        contexts.lock().insert(id, context.clone());
        debug!(
            "Instantiated {} {} with context {} ({})",
            self.name,
            id,
            context.id(),
            if created { "new" } else { "shared" }
        );

        Ok(Instance {
            id,
            arrangement: self.clone(),
            context,
            descent: descent.map(|d| d.id),
        })
    }
}

impl fmt::Debug for InstanceArrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceArrangement")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("new_context", &self.new_context)
            .field("instances", &self.len())
            .finish()
    }
}

/// A live participant of an instance arrangement.
///
/// Dropping it releases its entry in the arrangement's identity map.
pub struct Instance {
    id: InstanceId,
    arrangement: Arc<InstanceArrangement>,
    context: Arc<Context>,
    descent: Option<InstanceId>,
}

impl Instance {
    #[inline]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn arrangement(&self) -> &Arc<InstanceArrangement> {
        &self.arrangement
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn descent(&self) -> Option<InstanceId> {
        self.descent
    }

    pub fn supercontext(&self) -> Option<Arc<Context>> {
        self.arrangement.registry.parent(self.context.id())
    }

    pub fn subcontexts(&self) -> Vec<Arc<Context>> {
        self.arrangement.registry.children(self.context.id())
    }

    pub fn has_new_context(&self) -> bool {
        self.arrangement.new_context
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(contexts) = &self.arrangement.contexts {
            contexts.lock().remove(&self.id);
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("arrangement", &self.arrangement.name)
            .field("context", &self.context.id())
            .field("descent", &self.descent)
            .finish()
    }
}
