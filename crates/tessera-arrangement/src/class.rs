//! Class arrangements
//!
//! One context per type hierarchy. A type either adopts its descent's
//! context or, with `new_context`, gets a fresh context connected as a
//! child of the descent's. Kind conflicts fail at declaration time.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_context::{Context, ContextKind, ContextRegistry};
use tessera_core::{ArrangementId, TesseraError, TesseraResult};
use tracing::debug;

use crate::{resolve_kind, ArrangementState, Declaration, SetupFn};

pub type ClassDeclaration = Declaration<ClassArrangement>;

/// A type hierarchy bound to one context
pub struct ClassArrangement {
    id: ArrangementId,
    name: String,
    kind: ContextKind,
    new_context: bool,
    descent: Option<Arc<ClassArrangement>>,
    context: Option<Arc<Context>>,
    registry: Arc<ContextRegistry>,
    setup: Option<Arc<SetupFn>>,
    state: Mutex<ArrangementState>,
}

impl ClassArrangement {
    /// Resolve a declaration against the global registry
    pub fn declare(declaration: ClassDeclaration) -> TesseraResult<Arc<Self>> {
        Self::declare_in(&ContextRegistry::global(), declaration)
    }

    pub fn declare_in(
        registry: &Arc<ContextRegistry>,
        declaration: ClassDeclaration,
    ) -> TesseraResult<Arc<Self>> {
        let new_context = declaration.has_new_context();
        let inherited = declaration.descent.as_ref().map(|d| d.kind);
        let kind = resolve_kind(
            &declaration.name,
            declaration.context_kind,
            inherited,
            new_context,
        )?;

        let (context, state) = if declaration.is_abstract {
            (None, ArrangementState::Abstract)
        } else {
            let descent_context = declaration.descent.as_ref().and_then(|d| d.context.clone());
            let context = match descent_context {
                None => registry.create(kind),
                Some(shared) if !new_context => shared,
                Some(parent) => {
                    let context = registry.create(kind);
                    registry.connect(&context, Some(&parent))?;
                    context
                }
            };
            (Some(context), ArrangementState::Resolved)
        };

        let arrangement = ClassArrangement {
            id: ArrangementId::fresh(),
            name: declaration.name,
            kind,
            new_context,
            descent: declaration.descent,
            context,
            registry: registry.clone(),
            setup: declaration.setup,
            state: Mutex::new(state),
        };
        debug!(
            "Declared class arrangement {} ({}, {:?}, context {:?})",
            arrangement.name,
            kind.name(),
            state,
            arrangement.context.as_ref().map(|c| c.id())
        );
        Ok(Arc::new(arrangement))
    }

    #[inline]
    pub fn id(&self) -> ArrangementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared or inherited kind. An adopted context keeps its own kind.
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn has_new_context(&self) -> bool {
        self.new_context
    }

    pub fn descent(&self) -> Option<&Arc<ClassArrangement>> {
        self.descent.as_ref()
    }

    pub fn is_abstract(&self) -> bool {
        self.context.is_none()
    }

    pub fn state(&self) -> ArrangementState {
        *self.state.lock()
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// The shared context, prepared on first access
    pub fn context(&self) -> TesseraResult<Arc<Context>> {
        let context = self
            .context
            .clone()
            .ok_or(TesseraError::AbstractArrangement(self.id))?;

        let mut state = self.state.lock();
        if *state == ArrangementState::Resolved {
            context.prepare();
            if let Some(setup) = &self.setup {
                setup(&context)?;
            }
            *state = ArrangementState::Prepared;
            debug!("Prepared class arrangement {} ({})", self.name, context.id());
        }
        Ok(context)
    }

    pub fn supercontext(&self) -> Option<Arc<Context>> {
        let context = self.context.as_ref()?;
        self.registry.parent(context.id())
    }

    pub fn subcontexts(&self) -> Vec<Arc<Context>> {
        match &self.context {
            Some(context) => self.registry.children(context.id()),
            None => Vec::new(),
        }
    }

    /// Whether this arrangement is `other` or descends from it
    pub fn descends_from(&self, other: &ClassArrangement) -> bool {
        let mut cursor = Some(self);
        while let Some(current) = cursor {
            if current.id == other.id {
                return true;
            }
            cursor = current.descent.as_deref();
        }
        false
    }
}

impl fmt::Debug for ClassArrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassArrangement")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("new_context", &self.new_context)
            .field("context", &self.context.as_ref().map(|c| c.id()))
            .finish()
    }
}
