//! Records
//!
//! A record is one instance of a schema. Its values live in the record's
//! context under the field names; unset fields read as their defaults.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use tessera_arrangement::Instance;
use tessera_context::Context;
use tessera_core::{Bounded, InstanceId, Settings, TesseraError, TesseraResult, Value};
use tessera_stack::Component;
use tessera_wire::{Driver, DriverRegistry};
use tracing::trace;

use crate::Schema;

/// One instance of a schema
pub struct Record {
    schema: Arc<Schema>,
    instance: Instance,
}

impl Record {
    pub(crate) fn new(schema: Arc<Schema>, instance: Instance) -> Self {
        Self { schema, instance }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn settings(&self) -> &Settings {
        self.schema.settings()
    }

    #[inline]
    pub fn id(&self) -> InstanceId {
        self.instance.id()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Where the field values are stored
    pub fn context(&self) -> &Arc<Context> {
        self.instance.context()
    }

    pub fn supercontext(&self) -> Option<Arc<Context>> {
        self.instance.supercontext()
    }

    pub fn subcontexts(&self) -> Vec<Arc<Context>> {
        self.instance.subcontexts()
    }

    /// Value of a field or alias, falling back to its default
    pub fn get(&self, name: &str) -> TesseraResult<Option<Value>> {
        self.schema
            .field(name)
            .map(|accessor| accessor.get(self))
            .ok_or_else(|| TesseraError::UnknownField(name.to_string()))
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> TesseraResult<()> {
        self.schema
            .field(name)
            .ok_or_else(|| TesseraError::UnknownField(name.to_string()))?
            .set(self, value)
    }

    pub(crate) fn store(&self, name: &str, value: Value) -> TesseraResult<()> {
        self.context().insert(name, value)?;
        Ok(())
    }

    fn value_of(&self, name: &str, component: &Component) -> Option<Value> {
        self.context()
            .get(name)
            .or_else(|| component.default().cloned())
    }

    /// Values of the live fields in stack order.
    ///
    /// A live field with neither a value nor a default is a
    /// `MissingField` error.
    pub fn state(&self, settings: &Settings) -> TesseraResult<IndexMap<String, Value>> {
        self.schema
            .live_components(settings)
            .into_iter()
            .map(|(name, component)| match self.value_of(&name, &component) {
                Some(value) => Ok((name, value)),
                None => Err(TesseraError::MissingField(name)),
            })
            .collect()
    }

    /// Like `state`, with `empty` standing in for missing values
    pub fn state_or(&self, settings: &Settings, empty: impl Into<Value>) -> IndexMap<String, Value> {
        let empty = empty.into();
        self.schema
            .live_components(settings)
            .into_iter()
            .map(|(name, component)| {
                let value = self.value_of(&name, &component).unwrap_or_else(|| empty.clone());
                (name, value)
            })
            .collect()
    }

    /// Apply every known key; unknown keys are skipped
    pub fn set_state<I, K, V>(&self, state: I) -> TesseraResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (key, value) in state {
            match self.schema.field(key.as_ref()) {
                Some(accessor) => accessor.set(self, value)?,
                None => trace!("{}: ignoring unknown key {:?}", self.name(), key.as_ref()),
            }
        }
        Ok(())
    }

    /// Live fields that have a value, under the schema's settings
    pub fn iter(&self) -> impl Iterator<Item = (String, Value)> {
        self.snapshot(&Settings::new()).into_iter()
    }

    fn snapshot(&self, settings: &Settings) -> IndexMap<String, Value> {
        self.schema
            .live_components(settings)
            .into_iter()
            .filter_map(|(name, component)| self.value_of(&name, &component).map(|v| (name, v)))
            .collect()
    }

    /// Encode the live fields in stack order
    pub fn dump(&self, driver: &dyn Driver, settings: &Settings) -> TesseraResult<Bytes> {
        let effective = self.schema.effective_settings(settings);
        let live = self.schema.live_components(settings);
        let mut fields = Vec::with_capacity(live.len());
        for (name, component) in live {
            let value = self
                .value_of(&name, &component)
                .ok_or_else(|| TesseraError::MissingField(name.clone()))?;
            fields.push((component, value));
        }
        let data = driver.dump_record(&fields, &effective)?;
        trace!("{}: dumped {} byte(s) with {}", self.name(), data.len(), driver.name());
        Ok(data)
    }

    /// `dump` through a driver of the global registry
    pub fn dump_named(&self, driver: &str, settings: &Settings) -> TesseraResult<Bytes> {
        let driver = DriverRegistry::global().get(driver)?;
        self.dump(driver.as_ref(), settings)
    }

    /// Compare state snapshots key by key. A key missing on one side
    /// compares as the greatest value, so incomplete records sort last.
    pub fn compare(&self, other: &Record, settings: &Settings) -> Option<Ordering> {
        let ours = self.snapshot(settings);
        let theirs = other.snapshot(settings);
        let keys = ours
            .keys()
            .chain(theirs.keys().filter(|key| !ours.contains_key(*key)));
        for key in keys {
            let a = Bounded::from_option(ours.get(key), Bounded::Greatest);
            let b = Bounded::from_option(theirs.get(key), Bounded::Greatest);
            match a.partial_cmp(&b)? {
                Ordering::Equal => continue,
                unequal => return Some(unequal),
            }
        }
        Some(Ordering::Equal)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other, &Settings::new()) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other, &Settings::new())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("schema", &self.schema.name())
            .field("id", &self.id())
            .field("state", &self.snapshot(&Settings::new()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_context::ContextRegistry;

    fn schema() -> Arc<Schema> {
        Schema::builder("point")
            .field("x", Component::int32())
            .field("y", Component::int32().with_default(0))
            .alias("horizontal", "x")
            .registry(&Arc::new(ContextRegistry::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_get_set_through_alias() {
        let schema = schema();
        let record = schema.record().unwrap();
        assert_eq!(record.get("x").unwrap(), None);
        assert_eq!(record.get("y").unwrap(), Some(Value::Int(0)));

        record.set("horizontal", 7).unwrap();
        assert_eq!(record.get("x").unwrap(), Some(Value::Int(7)));
        assert!(matches!(record.set("z", 1), Err(TesseraError::UnknownField(_))));
    }

    #[test]
    fn test_state_requires_values() {
        let record = schema().record().unwrap();
        assert!(matches!(
            record.state(&Settings::new()),
            Err(TesseraError::MissingField(ref name)) if name == "x"
        ));
        let state = record.state_or(&Settings::new(), Value::Int(-1));
        assert_eq!(state.get("x"), Some(&Value::Int(-1)));
    }

    #[test]
    fn test_unversioned_fields_are_live_without_version() {
        let schema = schema();
        let one = schema.with_state([("x", 1)]).unwrap();
        let state = one.state(&Settings::new()).unwrap();
        assert_eq!(
            state.into_iter().collect::<Vec<_>>(),
            vec![("x".to_string(), Value::Int(1)), ("y".to_string(), Value::Int(0))]
        );

        let two = schema.with_state([("x", 2)]).unwrap();
        assert_ne!(one, two);
        assert!(one < two);
    }

    #[test]
    fn test_set_state_ignores_unknown_keys() {
        let record = schema().record().unwrap();
        record
            .set_state([("x", Value::Int(1)), ("nope", Value::Bool(true))])
            .unwrap();
        let pairs: Vec<_> = record.iter().collect();
        assert_eq!(
            pairs,
            vec![("x".to_string(), Value::Int(1)), ("y".to_string(), Value::Int(0))]
        );
    }

    #[test]
    fn test_missing_keys_sort_last() {
        let schema = schema();
        let complete = schema.with_state([("x", 1)]).unwrap();
        let incomplete = schema.record().unwrap();
        assert!(complete < incomplete);

        let same = schema.with_state([("x", 1), ("y", 0)]).unwrap();
        assert_eq!(complete, same);
        let bigger = schema.with_state([("x", 2)]).unwrap();
        assert!(bigger > complete);
    }

    #[test]
    fn test_records_have_distinct_contexts() {
        let schema = schema();
        let a = schema.record().unwrap();
        let b = schema.record().unwrap();
        a.set("x", 1).unwrap();
        assert_eq!(b.get("x").unwrap(), None);
        assert_ne!(a.context().id(), b.context().id());
        assert_eq!(schema.arrangement().len(), 2);
        drop(a);
        assert_eq!(schema.arrangement().len(), 1);
    }
}
