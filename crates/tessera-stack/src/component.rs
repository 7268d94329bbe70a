//! Schema components
//!
//! Components are shared as `Arc<Component>` and compared by identity
//! (`ComponentId`), never by name. A component is taken while at least
//! one stack slot owns it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_core::{
    CodecOperation, ComponentId, Settings, TesseraResult, Value, ValueType, Version,
};

use crate::Constraint;

/// Shape of the values a component carries
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Int { bits: u16, signed: bool },
    Float { bits: u16 },
    Bool,
    Text,
    Bytes,
    List(Box<ComponentKind>),
}

impl ComponentKind {
    pub fn name(&self) -> String {
        match self {
            ComponentKind::Int { bits, signed: true } => format!("int{}", bits),
            ComponentKind::Int { bits, signed: false } => format!("uint{}", bits),
            ComponentKind::Float { bits } => format!("float{}", bits),
            ComponentKind::Bool => "bool".into(),
            ComponentKind::Text => "text".into(),
            ComponentKind::Bytes => "bytes".into(),
            ComponentKind::List(inner) => format!("list<{}>", inner.name()),
        }
    }

    /// Type of loaded (in-memory) values
    pub fn load_type(&self) -> ValueType {
        match self {
            ComponentKind::Int { signed: true, .. } => ValueType::Int,
            ComponentKind::Int { signed: false, .. } => ValueType::UInt,
            ComponentKind::Float { .. } => ValueType::Float,
            ComponentKind::Bool => ValueType::Bool,
            ComponentKind::Text => ValueType::Text,
            ComponentKind::Bytes => ValueType::Bytes,
            ComponentKind::List(_) => ValueType::List,
        }
    }

    /// Type of dumped values
    pub fn dump_type(&self) -> ValueType {
        ValueType::Bytes
    }

    /// Constraints every value of this kind must satisfy
    pub fn implied_constraints(&self) -> Vec<Constraint> {
        match self {
            ComponentKind::Int { bits, signed } => vec![Constraint::BitWidth {
                bits: *bits,
                signed: *signed,
            }],
            ComponentKind::Float { bits: 32 } => vec![
                Constraint::Type(ValueType::Float),
                Constraint::Range {
                    min: Value::Float(f64::from(f32::MIN)),
                    max: Value::Float(f64::from(f32::MAX)),
                    accept_inf: true,
                },
            ],
            other => vec![Constraint::Type(other.load_type())],
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A typed schema field
pub struct Component {
    id: ComponentId,
    kind: ComponentKind,
    name: RwLock<Option<String>>,
    default: Option<Value>,
    priority: i32,
    version_added: Option<Version>,
    version_removed: Option<Version>,
    settings: RwLock<Settings>,
    constraints: Vec<Constraint>,
    /// Number of stack slots holding this component
    owners: AtomicUsize,
}

macro_rules! int_constructors {
    ($($name:ident => $bits:expr, $signed:expr;)*) => {
        $(
            pub fn $name() -> Self {
                Self::new(ComponentKind::Int { bits: $bits, signed: $signed })
            }
        )*
    };
}

impl Component {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            id: ComponentId::fresh(),
            kind,
            name: RwLock::new(None),
            default: None,
            priority: 0,
            version_added: None,
            version_removed: None,
            settings: RwLock::new(Settings::new()),
            constraints: Vec::new(),
            owners: AtomicUsize::new(0),
        }
    }

    int_constructors! {
        int8 => 8, true;
        int16 => 16, true;
        int32 => 32, true;
        int64 => 64, true;
        uint8 => 8, false;
        uint16 => 16, false;
        uint32 => 32, false;
        uint64 => 64, false;
    }

    pub fn float32() -> Self {
        Self::new(ComponentKind::Float { bits: 32 })
    }

    pub fn float64() -> Self {
        Self::new(ComponentKind::Float { bits: 64 })
    }

    pub fn boolean() -> Self {
        Self::new(ComponentKind::Bool)
    }

    pub fn text() -> Self {
        Self::new(ComponentKind::Text)
    }

    pub fn bytes() -> Self {
        Self::new(ComponentKind::Bytes)
    }

    pub fn list(of: ComponentKind) -> Self {
        Self::new(ComponentKind::List(Box::new(of)))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        *self.name.get_mut() = Some(name.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// First version this component exists in
    pub fn added(mut self, version: impl Into<Version>) -> Self {
        self.version_added = Some(version.into());
        self
    }

    /// First version this component no longer exists in
    pub fn removed(mut self, version: impl Into<Version>) -> Self {
        self.version_removed = Some(version.into());
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let settings = self.settings.get_mut();
        *settings = std::mem::take(settings).with(key, value);
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// An untaken duplicate with a fresh identity
    pub fn duplicate(&self) -> Self {
        Self {
            id: ComponentId::fresh(),
            kind: self.kind.clone(),
            name: RwLock::new(self.name()),
            default: self.default.clone(),
            priority: self.priority,
            version_added: self.version_added.clone(),
            version_removed: self.version_removed.clone(),
            settings: RwLock::new(self.settings()),
            constraints: self.constraints.clone(),
            owners: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    /// Set the name unless one is already set; returns the effective name
    pub fn name_or(&self, name: impl FnOnce() -> String) -> String {
        let mut slot = self.name.write();
        slot.get_or_insert_with(name).clone()
    }

    pub fn rename(&self, name: impl Into<String>) {
        *self.name.write() = Some(name.into());
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn version_added(&self) -> Option<&Version> {
        self.version_added.as_ref()
    }

    pub fn version_removed(&self) -> Option<&Version> {
        self.version_removed.as_ref()
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Layer extra settings over this component's own
    pub fn update_settings(&self, settings: &Settings) {
        let mut own = self.settings.write();
        *own = settings.merged_over(&own);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Held by at least one stack
    pub fn is_taken(&self) -> bool {
        self.owners() > 0
    }

    pub fn owners(&self) -> usize {
        self.owners.load(Ordering::Acquire)
    }

    /// Register one more owner; returns whether it was already taken
    pub fn take(&self) -> bool {
        self.owners.fetch_add(1, Ordering::AcqRel) > 0
    }

    /// Drop one owner. The component stays taken while any remain.
    pub fn release(&self) {
        let _ = self
            .owners
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Run the kind's constraints, then the explicit ones
    pub fn validate(
        &self,
        value: Value,
        settings: &Settings,
        operation: CodecOperation,
    ) -> TesseraResult<Value> {
        let policy = settings.merged_over(&self.settings()).constraint_policy();
        let mut value = value;
        for constraint in self.kind.implied_constraints().iter().chain(&self.constraints) {
            value = constraint.validate(value, policy, operation)?;
        }
        Ok(value)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("kind", &self.kind.name())
            .field("default", &self.default)
            .field("priority", &self.priority)
            .field("version_added", &self.version_added)
            .field("version_removed", &self.version_removed)
            .field("owners", &self.owners())
            .finish()
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Component {}

/// Anything a stack can turn into a component
#[derive(Debug)]
pub enum ComponentArg {
    Kind(ComponentKind),
    Owned(Component),
    Shared(Arc<Component>),
}

impl From<ComponentKind> for ComponentArg {
    fn from(kind: ComponentKind) -> Self {
        ComponentArg::Kind(kind)
    }
}

impl From<Component> for ComponentArg {
    fn from(component: Component) -> Self {
        ComponentArg::Owned(component)
    }
}

impl From<Arc<Component>> for ComponentArg {
    fn from(component: Arc<Component>) -> Self {
        ComponentArg::Shared(component)
    }
}

impl From<&Arc<Component>> for ComponentArg {
    fn from(component: &Arc<Component>) -> Self {
        ComponentArg::Shared(component.clone())
    }
}
