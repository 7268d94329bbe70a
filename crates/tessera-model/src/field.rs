//! Field accessors
//!
//! A `Field` is the canonical accessor for one component of a schema.
//! A `FieldAlias` forwards every read and write to a field under another
//! attribute name.

use std::fmt;
use std::sync::Arc;

use tessera_core::{TesseraResult, Value};
use tessera_stack::Component;

use crate::Record;

/// Canonical accessor for one component
pub struct Field {
    name: String,
    component: Arc<Component>,
}

impl Field {
    pub(crate) fn new(name: impl Into<String>, component: Arc<Component>) -> Self {
        Self {
            name: name.into(),
            component,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }

    /// Stored value, falling back to the component default
    pub fn get(&self, record: &Record) -> Option<Value> {
        record
            .context()
            .get(&self.name)
            .or_else(|| self.component.default().cloned())
    }

    /// Whether a value was stored (defaults don't count)
    pub fn is_set(&self, record: &Record) -> bool {
        record.context().get(&self.name).is_some()
    }

    pub fn set(&self, record: &Record, value: impl Into<Value>) -> TesseraResult<()> {
        record.context().insert(self.name.clone(), value)?;
        Ok(())
    }

    /// Drop the stored value; reads fall back to the default again
    pub fn unset(&self, record: &Record) -> TesseraResult<Option<Value>> {
        record.context().remove(self.name.clone())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.component.kind().name())
            .finish()
    }
}

/// Second name for a field
#[derive(Clone)]
pub struct FieldAlias {
    alias: String,
    target: Arc<Field>,
}

impl FieldAlias {
    pub(crate) fn new(alias: impl Into<String>, target: Arc<Field>) -> Self {
        Self {
            alias: alias.into(),
            target,
        }
    }

    /// The aliased field's name
    pub fn name(&self) -> &str {
        self.target.name()
    }

    /// The name this alias is registered under
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn target(&self) -> &Arc<Field> {
        &self.target
    }

    pub fn get(&self, record: &Record) -> Option<Value> {
        self.target.get(record)
    }

    pub fn set(&self, record: &Record, value: impl Into<Value>) -> TesseraResult<()> {
        self.target.set(record, value)
    }
}

impl fmt::Debug for FieldAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldAlias({} -> {})", self.alias, self.target.name())
    }
}

/// Entry of a schema's name -> accessor map
#[derive(Clone, Debug)]
pub enum FieldAccessor {
    Field(Arc<Field>),
    Alias(FieldAlias),
}

impl FieldAccessor {
    /// Canonical field name
    pub fn name(&self) -> &str {
        match self {
            FieldAccessor::Field(field) => field.name(),
            FieldAccessor::Alias(alias) => alias.name(),
        }
    }

    pub fn field(&self) -> &Arc<Field> {
        match self {
            FieldAccessor::Field(field) => field,
            FieldAccessor::Alias(alias) => alias.target(),
        }
    }

    pub fn component(&self) -> &Arc<Component> {
        self.field().component()
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, FieldAccessor::Alias(_))
    }

    pub fn get(&self, record: &Record) -> Option<Value> {
        self.field().get(record)
    }

    pub fn set(&self, record: &Record, value: impl Into<Value>) -> TesseraResult<()> {
        self.field().set(record, value)
    }
}
