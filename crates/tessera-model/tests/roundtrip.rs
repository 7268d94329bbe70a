use std::sync::Arc;

use proptest::prelude::*;
use tessera_context::ContextRegistry;
use tessera_core::{ConstraintPolicy, Settings, TesseraError, Value};
use tessera_model::Schema;
use tessera_stack::{Component, ComponentKind};
use tessera_wire::{BinaryConfig, BinaryDriver};

fn message(registry: &Arc<ContextRegistry>) -> Arc<Schema> {
    Schema::builder("Message")
        .field("bar", Component::text())
        .field("baz", Component::int32())
        .field("biz", Component::int8())
        .field("ext", Component::int32().added(2).with_default(20))
        .field("tags", Component::list(ComponentKind::Int { bits: 16, signed: false }).with_default(Vec::<Value>::new()))
        .registry(registry)
        .build()
        .unwrap()
}

#[test]
fn test_binary_layout_by_version() {
    let registry = Arc::new(ContextRegistry::new());
    let schema = message(&registry);
    let record = schema
        .with_state([
            ("bar", Value::from("bar")),
            ("baz", Value::Int(1)),
            ("biz", Value::Int(2)),
            ("ext", Value::Int(3)),
        ])
        .unwrap();

    let driver = BinaryDriver::new(BinaryConfig {
        length_prefix: tessera_wire::LengthPrefix::U8,
        ..BinaryConfig::default()
    });
    let v1 = record.dump(&driver, &Settings::new().with_version(1)).unwrap();
    assert_eq!(&v1[..], b"\x03bar\x00\x00\x00\x01\x02\x00");
    let v2 = record.dump(&driver, &Settings::new()).unwrap();
    assert_eq!(&v2[..], b"\x03bar\x00\x00\x00\x01\x02\x00\x00\x00\x03\x00");

    let loaded_v1 = schema.load(&driver, v1, &Settings::new().with_version(1)).unwrap();
    assert_eq!(loaded_v1.get("ext").unwrap(), Some(Value::Int(20)));
    assert_eq!(loaded_v1.get("bar").unwrap(), Some(Value::from("bar")));

    let loaded_v2 = schema.load(&driver, v2, &Settings::new()).unwrap();
    assert_eq!(loaded_v2, record);
}

#[test]
fn test_dump_reports_missing_fields() {
    let registry = Arc::new(ContextRegistry::new());
    let record = message(&registry).record().unwrap();
    let err = record.dump(&BinaryDriver::default(), &Settings::new()).unwrap_err();
    assert!(matches!(err, TesseraError::MissingField(ref name) if name == "bar"));
}

#[test]
fn test_named_driver_roundtrip() {
    let registry = Arc::new(ContextRegistry::new());
    let schema = message(&registry);
    let record = schema
        .with_state([("bar", Value::from("")), ("baz", Value::Int(-1)), ("biz", Value::Int(0))])
        .unwrap();
    let data = record.dump_named("binary", &Settings::new()).unwrap();
    let loaded = schema.load_named("binary", data, &Settings::new()).unwrap();
    assert_eq!(loaded, record);

    assert!(matches!(
        record.dump_named("json", &Settings::new()),
        Err(TesseraError::DriverNotFound(_))
    ));
}

#[test]
fn test_constraint_policy_from_schema_settings() {
    let registry = Arc::new(ContextRegistry::new());
    let schema = Schema::builder("Clamped")
        .field("level", Component::uint8())
        .settings(Settings::new().with_policy(ConstraintPolicy::Coerce))
        .registry(&registry)
        .build()
        .unwrap();
    let record = schema.with_state([("level", 300)]).unwrap();
    let driver = BinaryDriver::default();

    let data = record.dump(&driver, &Settings::new()).unwrap();
    assert_eq!(&data[..], &[0xff]);

    let strict = Settings::new().with_policy(ConstraintPolicy::Strict);
    assert!(matches!(record.dump(&driver, &strict), Err(TesseraError::Constraint(_))));
}

#[test]
fn test_trailing_bytes_fail_load() {
    let schema = Schema::from_components("Pair", vec![Component::uint8(), Component::uint8()]).unwrap();
    let err = schema
        .load(&BinaryDriver::default(), vec![1u8, 2, 3], &Settings::new())
        .unwrap_err();
    assert!(matches!(err, TesseraError::Codec { .. }));
    let loaded = schema
        .load(&BinaryDriver::default(), vec![1u8, 2], &Settings::new())
        .unwrap();
    assert_eq!(loaded.get("f_2").unwrap(), Some(Value::UInt(2)));
}

proptest! {
    #[test]
    fn prop_state_roundtrip(
        bar in "[a-z]{0,12}",
        baz in any::<i32>(),
        biz in any::<i8>(),
        version in proptest::option::of(0i32..4),
    ) {
        let registry = Arc::new(ContextRegistry::new());
        let schema = message(&registry);
        let settings = match version {
            Some(version) => Settings::new().with_version(version),
            None => Settings::new(),
        };
        let record = schema
            .with_state([
                ("bar", Value::from(bar.clone())),
                ("baz", Value::Int(baz.into())),
                ("biz", Value::Int(biz.into())),
            ])
            .unwrap();

        let state = record.state(&settings).unwrap();
        prop_assert_eq!(state.get("bar"), Some(&Value::from(bar.as_str())));
        let copy = schema.with_state(state.clone()).unwrap();
        prop_assert_eq!(copy.state(&settings).unwrap(), state);
        prop_assert!(copy.compare(&record, &settings) == Some(std::cmp::Ordering::Equal));

        let data = record.dump(&BinaryDriver::default(), &settings).unwrap();
        let loaded = schema.load(&BinaryDriver::default(), data, &settings).unwrap();
        prop_assert_eq!(loaded.state(&settings).unwrap(), record.state(&settings).unwrap());
    }
}
