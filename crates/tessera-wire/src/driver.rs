//! Driver and codec traits

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tessera_core::{BoxError, CodecOperation, Settings, TesseraError, TesseraResult, Value};
use tessera_stack::Component;
use tracing::trace;

/// Dump/load for one component
pub trait Codec: Send + Sync {
    fn dump(&self, value: &Value, out: &mut BytesMut) -> Result<(), BoxError>;

    /// Consume one value from the front of `input`
    fn load(&self, input: &mut Bytes) -> Result<Value, BoxError>;
}

/// A named codec catalog
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Codec for a component under the given settings (already merged
    /// over the component's own)
    fn codec(&self, component: &Component, settings: &Settings) -> TesseraResult<Box<dyn Codec>>;

    /// Dump one value: constraints first, then the codec
    fn dump_value(
        &self,
        component: &Component,
        value: Value,
        settings: &Settings,
        out: &mut BytesMut,
    ) -> TesseraResult<()> {
        let settings = settings.merged_over(&component.settings());
        let value = component.validate(value, &settings, CodecOperation::Dump)?;
        let codec = self.codec(component, &settings)?;
        codec
            .dump(&value, out)
            .map_err(|e| TesseraError::codec(self.name(), CodecOperation::Dump, e))
    }

    /// Load one value: the codec first, then constraints
    fn load_value(
        &self,
        component: &Component,
        input: &mut Bytes,
        settings: &Settings,
    ) -> TesseraResult<Value> {
        let settings = settings.merged_over(&component.settings());
        let codec = self.codec(component, &settings)?;
        let value = codec
            .load(input)
            .map_err(|e| TesseraError::codec(self.name(), CodecOperation::Load, e))?;
        component.validate(value, &settings, CodecOperation::Load)
    }

    /// Concatenate fields in order
    fn dump_record(
        &self,
        fields: &[(Arc<Component>, Value)],
        settings: &Settings,
    ) -> TesseraResult<Bytes> {
        let mut out = BytesMut::new();
        for (component, value) in fields {
            self.dump_value(component, value.clone(), settings, &mut out)?;
        }
        trace!("{}: dumped {} field(s) into {} bytes", self.name(), fields.len(), out.len());
        Ok(out.freeze())
    }

    /// Read fields in order; every input byte must be consumed
    fn load_record(
        &self,
        components: &[Arc<Component>],
        data: Bytes,
        settings: &Settings,
    ) -> TesseraResult<Vec<Value>> {
        let mut input = data;
        let mut values = Vec::with_capacity(components.len());
        for component in components {
            values.push(self.load_value(component, &mut input, settings)?);
        }
        if !input.is_empty() {
            return Err(TesseraError::codec(
                self.name(),
                CodecOperation::Load,
                format!("{} trailing byte(s)", input.len()),
            ));
        }
        Ok(values)
    }
}
