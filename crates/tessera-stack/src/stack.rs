//! Component stacks
//!
//! A stack is an ordered, mutex-guarded sequence of components. `push`
//! keeps components stably sorted by priority; `insert` places a
//! component explicitly. Predicates run on reads only.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tessera_core::{Settings, TesseraError, TesseraResult, Value};
use tracing::trace;

use crate::{AlwaysPredicate, Component, ComponentArg, Predicate, VersionPredicate};

/// What `add` does with a component another stack (or this one) already owns.
///
/// Every stack slot holding a component counts as one owner; `pop`,
/// `discard`, `clear` and drop each give one back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TakenPolicy {
    /// Push the same component again
    #[default]
    Reuse,
    /// Push a duplicate with a fresh identity
    Copy,
    /// Fail with `ComponentTaken`
    Reject,
}

/// Stack configuration
#[derive(Clone, Debug)]
pub struct StackConfig {
    /// Template for unnamed components; `{index}` is the 1-based position
    /// at push time and `{name}` the stack's name
    pub default_name_template: String,
    pub taken_policy: TakenPolicy,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            default_name_template: "f_{index}".into(),
            taken_policy: TakenPolicy::Reuse,
        }
    }
}

impl StackConfig {
    /// Taken components are rejected
    pub fn strict() -> Self {
        Self {
            taken_policy: TakenPolicy::Reject,
            ..Default::default()
        }
    }
}

/// Ordered, filterable component collection
pub struct Stack<P = AlwaysPredicate> {
    name: String,
    config: StackConfig,
    predicate: P,
    components: Mutex<Vec<Arc<Component>>>,
}

/// Stack filtering on `version_added <= version < version_removed`
pub type VersionAwareStack = Stack<VersionPredicate>;

impl Stack<AlwaysPredicate> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_predicate(name, AlwaysPredicate, StackConfig::default())
    }
}

impl Stack<VersionPredicate> {
    pub fn version_aware(name: impl Into<String>) -> Self {
        Self::with_predicate(name, VersionPredicate::default(), StackConfig::default())
    }
}

impl<P: Predicate> Stack<P> {
    pub fn with_predicate(name: impl Into<String>, predicate: P, config: StackConfig) -> Self {
        Self {
            name: name.into(),
            config,
            predicate,
            components: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn predicate(&self) -> &P {
        &self.predicate
    }

    /// Number of components, live or not
    pub fn len(&self) -> usize {
        self.components.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.lock().is_empty()
    }

    fn default_name(&self, index: usize) -> String {
        self.config
            .default_name_template
            .replace("{index}", &index.to_string())
            .replace("{name}", &self.name)
    }

    /// Push after every component of lower or equal priority. The stack
    /// becomes one of the component's owners.
    pub fn push(&self, component: Arc<Component>) {
        component.take();
        let mut components = self.components.lock();
        let name = component.name_or(|| self.default_name(components.len() + 1));
        let at = components.partition_point(|c| c.priority() <= component.priority());
        trace!("{}: push {} at {} (priority {})", self.name, name, at, component.priority());
        components.insert(at, component);
    }

    /// Place a component at an explicit position (clamped like `Vec::insert`)
    pub fn insert(&self, index: isize, component: Arc<Component>) {
        component.take();
        let mut components = self.components.lock();
        let len = components.len();
        let at = if index < 0 {
            (len as isize + index).max(0) as usize
        } else {
            (index as usize).min(len)
        };
        let name = component.name_or(|| self.default_name(len + 1));
        trace!("{}: insert {} at {}", self.name, name, at);
        components.insert(at, component);
    }

    /// Remove by position (`None` means last)
    pub fn pop(&self, index: Option<isize>) -> TesseraResult<Arc<Component>> {
        let mut components = self.components.lock();
        let len = components.len();
        let index = index.unwrap_or(-1);
        let at = normalize(index, len).ok_or(TesseraError::IndexOutOfRange { index, len })?;
        let component = components.remove(at);
        component.release();
        trace!("{}: pop {:?} from {}", self.name, component.name(), at);
        Ok(component)
    }

    /// Remove a component by identity; returns whether it was present
    pub fn discard(&self, component: &Component) -> bool {
        let mut components = self.components.lock();
        match components.iter().position(|c| c.id() == component.id()) {
            Some(at) => {
                components.remove(at).release();
                true
            }
            None => false,
        }
    }

    /// Normalize an argument into an owned component and push it
    pub fn add(
        &self,
        component: impl Into<ComponentArg>,
        settings: &Settings,
        name: Option<&str>,
    ) -> TesseraResult<Arc<Component>> {
        let component = match component.into() {
            ComponentArg::Kind(kind) => Arc::new(prepare(Component::new(kind), settings, name)),
            ComponentArg::Owned(owned) => Arc::new(prepare(owned, settings, name)),
            ComponentArg::Shared(shared) if shared.is_taken() => match self.config.taken_policy {
                TakenPolicy::Reuse => shared,
                TakenPolicy::Copy => Arc::new(prepare(shared.duplicate(), settings, name)),
                TakenPolicy::Reject => {
                    return Err(TesseraError::ComponentTaken(
                        shared.name().unwrap_or_else(|| shared.id().to_string()),
                    ))
                }
            },
            ComponentArg::Shared(shared) => {
                if !settings.is_empty() {
                    shared.update_settings(settings);
                }
                if let Some(name) = name {
                    shared.name_or(|| name.to_string());
                }
                shared
            }
        };

        self.push(component.clone());
        Ok(component)
    }

    /// Component at a position, if it is live under `settings`
    pub fn get(&self, index: isize, settings: &Settings) -> Option<Arc<Component>> {
        let component = {
            let components = self.components.lock();
            normalize(index, components.len()).map(|at| components[at].clone())?
        };
        self.predicate
            .matches(&component, settings)
            .then_some(component)
    }

    /// Live components by name, in stack order. The first component with
    /// a given name keeps it.
    pub fn get_matching(&self, settings: &Settings) -> IndexMap<String, Arc<Component>> {
        let mut matching = IndexMap::new();
        for component in self.all() {
            if !self.predicate.matches(&component, settings) {
                continue;
            }
            if let Some(name) = component.name() {
                matching.entry(name).or_insert(component);
            }
        }
        matching
    }

    /// Snapshot of every component in order
    pub fn all(&self) -> Vec<Arc<Component>> {
        self.components.lock().clone()
    }

    pub fn clear(&self) {
        let mut components = self.components.lock();
        for component in components.drain(..) {
            component.release();
        }
    }
}

impl<P> Drop for Stack<P> {
    fn drop(&mut self) {
        for component in self.components.get_mut().drain(..) {
            component.release();
        }
    }
}

impl<P> fmt::Debug for Stack<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.components.lock().iter().map(|c| c.name()).collect();
        f.debug_struct("Stack")
            .field("name", &self.name)
            .field("components", &names)
            .finish()
    }
}

/// Apply `add` settings to a component that is not shared yet
fn prepare(mut component: Component, settings: &Settings, name: Option<&str>) -> Component {
    let mut settings = settings.clone();
    if let Some(Value::Text(from_settings)) = settings.remove("name") {
        component = component.named(from_settings);
    }
    if let Some(default) = settings.remove("default") {
        component = component.with_default(default);
    }
    if let Some(name) = name {
        if component.name().is_none() {
            component = component.named(name);
        }
    }
    if !settings.is_empty() {
        component.update_settings(&settings);
    }
    component
}

fn normalize(index: isize, len: usize) -> Option<usize> {
    let i = if index < 0 { len as isize + index } else { index };
    (i >= 0 && (i as usize) < len).then_some(i as usize)
}
