//! Schemas
//!
//! A schema is declared once with `SchemaBuilder` (or functionally with
//! `Schema::from_components`) and owns:
//! - a version-aware component stack, in declaration order
//! - a name -> accessor map (canonical fields and aliases)
//! - an instance arrangement over dict contexts, one per record
//! - its own settings, merged under per-call settings
//!
//! A schema may extend another. It then inherits the parent's fields and
//! settings, and its records may descend from the parent's records.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use tessera_arrangement::{InstanceArrangement, InstanceDeclaration};
use tessera_context::{ContextKind, ContextRegistry};
use tessera_core::{Settings, TesseraError, TesseraResult, Value};
use tessera_stack::{Component, ComponentArg, Predicate, VersionAwareStack};
use tessera_wire::{Driver, DriverRegistry};
use tracing::{debug, trace};

use crate::{Field, FieldAccessor, FieldAlias, Record};

enum Entry {
    Field(Option<String>, ComponentArg),
    Alias(String, String),
}

impl Entry {
    fn name(&self) -> Option<&str> {
        match self {
            Entry::Field(name, _) => name.as_deref(),
            Entry::Alias(alias, _) => Some(alias),
        }
    }
}

/// Builder for `Schema`
pub struct SchemaBuilder {
    name: String,
    entries: Vec<Entry>,
    settings: Settings,
    new_context: Option<bool>,
    is_abstract: bool,
    descent: Option<Arc<Schema>>,
    registry: Option<Arc<ContextRegistry>>,
}

impl SchemaBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            settings: Settings::new(),
            new_context: None,
            is_abstract: false,
            descent: None,
            registry: None,
        }
    }

    /// Declare a field from a kind, a component, or a shared component.
    ///
    /// Passing a shared component that an earlier field of this schema
    /// already holds declares an alias of that field.
    pub fn field(mut self, name: impl Into<String>, component: impl Into<ComponentArg>) -> Self {
        self.entries.push(Entry::Field(Some(name.into()), component.into()));
        self
    }

    /// Declare a field named by the stack (`f_1`, `f_2`, ...) unless the
    /// component is already named
    pub fn unnamed(mut self, component: impl Into<ComponentArg>) -> Self {
        self.entries.push(Entry::Field(None, component.into()));
        self
    }

    /// Declare `alias` as a second name for the field `target`
    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.push(Entry::Alias(alias.into(), target.into()));
        self
    }

    /// Schema settings. A `name` entry renames the schema instead.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings.merged_over(&self.settings);
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings = self.settings.with(key, value);
        self
    }

    /// Give each record a fresh context below its descent's
    pub fn new_context(mut self, new_context: bool) -> Self {
        self.new_context = Some(new_context);
        self
    }

    /// Declare fields only; records cannot be created
    pub fn abstract_only(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn extends(mut self, parent: &Arc<Schema>) -> Self {
        self.descent = Some(parent.clone());
        self
    }

    /// Registry for record contexts (defaults to the parent's, then the global one)
    pub fn registry(mut self, registry: &Arc<ContextRegistry>) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    pub fn build(self) -> TesseraResult<Arc<Schema>> {
        let mut settings = self.settings;
        let name = match settings.remove("name") {
            Some(Value::Text(name)) => name,
            Some(other) => {
                return Err(TesseraError::InvalidSettings(format!(
                    "schema name must be text, got {}",
                    other.value_type()
                )))
            }
            None => self.name,
        };
        if let Some(parent) = &self.descent {
            settings = settings.merged_over(&parent.settings);
        }

        let mut own = HashSet::new();
        for entry_name in self.entries.iter().filter_map(Entry::name) {
            if !own.insert(entry_name.to_string()) {
                return Err(TesseraError::ArrangementConstruction(format!(
                    "{}: field {:?} is declared twice",
                    name, entry_name
                )));
            }
        }

        let stack = VersionAwareStack::version_aware(name.clone());
        let mut fields: IndexMap<String, FieldAccessor> = IndexMap::new();

        // Inherited fields first, minus the ones this schema redeclares
        let mut inherited_aliases = Vec::new();
        if let Some(parent) = &self.descent {
            for (field_name, accessor) in &parent.fields {
                if own.contains(field_name) {
                    continue;
                }
                match accessor {
                    FieldAccessor::Field(field) => {
                        stack.push(field.component().clone());
                        fields.insert(field_name.clone(), accessor.clone());
                    }
                    FieldAccessor::Alias(alias) => {
                        inherited_aliases.push((field_name.clone(), alias.name().to_string()));
                    }
                }
            }
        }

        for entry in self.entries {
            match entry {
                Entry::Field(field_name, arg) => {
                    if let ComponentArg::Shared(shared) = &arg {
                        if let Some(target) = holder_of(&fields, shared) {
                            if let Some(alias) = field_name {
                                fields.insert(alias.clone(), FieldAccessor::Alias(FieldAlias::new(alias, target)));
                            }
                            continue;
                        }
                    }
                    let shared = matches!(arg, ComponentArg::Shared(_));
                    let component = stack.add(arg, &Settings::new(), None)?;
                    // A shared component keeps the name other schemas know it by
                    let field_name = match field_name {
                        Some(field_name) if shared => {
                            component.name_or(|| field_name.clone());
                            field_name
                        }
                        Some(field_name) => {
                            component.rename(field_name.clone());
                            field_name
                        }
                        None => component.name_or(|| format!("f_{}", stack.len())),
                    };
                    fields.insert(
                        field_name.clone(),
                        FieldAccessor::Field(Arc::new(Field::new(field_name, component))),
                    );
                }
                Entry::Alias(alias, target) => {
                    let field = canonical(&fields, &target)?;
                    fields.insert(alias.clone(), FieldAccessor::Alias(FieldAlias::new(alias, field)));
                }
            }
        }

        for (alias, target) in inherited_aliases {
            if let Ok(field) = canonical(&fields, &target) {
                fields.insert(alias.clone(), FieldAccessor::Alias(FieldAlias::new(alias, field)));
            }
        }

        let registry = self
            .registry
            .or_else(|| self.descent.as_ref().map(|d| d.arrangement.registry().clone()))
            .unwrap_or_else(ContextRegistry::global);
        let mut declaration = InstanceDeclaration::new(name.clone()).kind(ContextKind::Dict);
        if let Some(new_context) = self.new_context {
            declaration = declaration.new_context(new_context);
        }
        if let Some(parent) = &self.descent {
            declaration = declaration.descent(&parent.arrangement);
        }
        if self.is_abstract {
            declaration = declaration.abstract_only();
        }
        let arrangement = InstanceArrangement::declare_in(&registry, declaration)?;

        debug!(
            "Built schema {} with {} component(s), {} accessor(s)",
            name,
            stack.len(),
            fields.len()
        );

        Ok(Arc::new(Schema {
            name,
            settings,
            stack,
            fields,
            arrangement,
            descent: self.descent,
        }))
    }
}

fn holder_of(fields: &IndexMap<String, FieldAccessor>, component: &Arc<Component>) -> Option<Arc<Field>> {
    fields.values().find_map(|accessor| match accessor {
        FieldAccessor::Field(field) if Arc::ptr_eq(field.component(), component) => Some(field.clone()),
        _ => None,
    })
}

fn canonical(fields: &IndexMap<String, FieldAccessor>, target: &str) -> TesseraResult<Arc<Field>> {
    fields
        .get(target)
        .map(|accessor| accessor.field().clone())
        .ok_or_else(|| TesseraError::UnknownField(target.to_string()))
}

/// A declared record type
pub struct Schema {
    name: String,
    settings: Settings,
    stack: VersionAwareStack,
    fields: IndexMap<String, FieldAccessor>,
    arrangement: Arc<InstanceArrangement>,
    descent: Option<Arc<Schema>>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Schema from bare components, named `f_1`, `f_2`, ... unless they
    /// carry a name
    pub fn from_components<I>(name: impl Into<String>, components: I) -> TesseraResult<Arc<Schema>>
    where
        I: IntoIterator,
        I::Item: Into<ComponentArg>,
    {
        components
            .into_iter()
            .fold(Schema::builder(name), |builder, component| builder.unnamed(component))
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stack(&self) -> &VersionAwareStack {
        &self.stack
    }

    pub fn arrangement(&self) -> &Arc<InstanceArrangement> {
        &self.arrangement
    }

    pub fn descent(&self) -> Option<&Arc<Schema>> {
        self.descent.as_ref()
    }

    pub fn is_abstract(&self) -> bool {
        self.arrangement.is_abstract()
    }

    /// Whether `other` is this schema or one of its ancestors
    pub fn descends_from(&self, other: &Schema) -> bool {
        std::ptr::eq(self, other) || self.descent.as_ref().map_or(false, |d| d.descends_from(other))
    }

    pub fn field(&self, name: &str) -> Option<&FieldAccessor> {
        self.fields.get(name)
    }

    /// Accessors in declaration order, aliases included
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldAccessor)> {
        self.fields.iter().map(|(name, accessor)| (name.as_str(), accessor))
    }

    /// Per-call settings over the schema's own
    pub fn effective_settings(&self, settings: &Settings) -> Settings {
        settings.merged_over(&self.settings)
    }

    /// Canonical fields whose components are live, in stack order.
    ///
    /// Fields are matched to stack entries by component identity, so a
    /// component shared with other schemas is read under this schema's
    /// field name whatever the component itself is called.
    pub fn live_fields(&self, settings: &Settings) -> Vec<Arc<Field>> {
        let effective = self.effective_settings(settings);
        self.stack
            .all()
            .into_iter()
            .filter(|component| self.stack.predicate().matches(component, &effective))
            .filter_map(|component| holder_of(&self.fields, &component))
            .collect()
    }

    /// Live components by field name, in stack order
    pub fn live_components(&self, settings: &Settings) -> IndexMap<String, Arc<Component>> {
        self.live_fields(settings)
            .into_iter()
            .map(|field| (field.name().to_string(), field.component().clone()))
            .collect()
    }

    /// An empty record with a fresh context
    pub fn record(self: &Arc<Self>) -> TesseraResult<Record> {
        let instance = self.arrangement.instantiate(None)?;
        Ok(Record::new(self.clone(), instance))
    }

    /// A record sharing, or branching from, the context of `descent`
    pub fn record_from(self: &Arc<Self>, descent: &Record) -> TesseraResult<Record> {
        let instance = self.arrangement.instantiate(Some(descent.instance()))?;
        Ok(Record::new(self.clone(), instance))
    }

    /// A record populated from a state map; unknown keys are ignored
    pub fn with_state<I, K, V>(self: &Arc<Self>, state: I) -> TesseraResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let record = self.record()?;
        record.set_state(state)?;
        Ok(record)
    }

    /// Decode the live fields from `data` into a new record
    pub fn load(
        self: &Arc<Self>,
        driver: &dyn Driver,
        data: impl Into<Bytes>,
        settings: &Settings,
    ) -> TesseraResult<Record> {
        let effective = self.effective_settings(settings);
        let live = self.live_components(settings);
        let components: Vec<_> = live.values().cloned().collect();
        let values = driver.load_record(&components, data.into(), &effective)?;

        let record = self.record()?;
        for (name, value) in live.keys().zip(values) {
            record.store(name, value)?;
        }
        trace!("{}: loaded {} field(s) with {}", self.name, live.len(), driver.name());
        Ok(record)
    }

    /// `load` through a driver of the global registry
    pub fn load_named(
        self: &Arc<Self>,
        driver: &str,
        data: impl Into<Bytes>,
        settings: &Settings,
    ) -> TesseraResult<Record> {
        let driver = DriverRegistry::global().get(driver)?;
        self.load(driver.as_ref(), data, settings)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .field("descent", &self.descent.as_ref().map(|d| d.name.as_str()))
            .finish()
    }
}
