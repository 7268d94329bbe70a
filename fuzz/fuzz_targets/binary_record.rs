#![no_main]

//! Decoding arbitrary bytes must fail cleanly, never panic, and whatever
//! decodes must encode back to the same bytes.

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use tessera_core::Settings;
use tessera_stack::{Component, ComponentKind};
use tessera_wire::{BinaryConfig, BinaryDriver, Driver};

fuzz_target!(|data: &[u8]| {
    let components = vec![
        Arc::new(Component::int16()),
        Arc::new(Component::text()),
        Arc::new(Component::list(ComponentKind::Int { bits: 32, signed: false })),
        Arc::new(Component::boolean()),
    ];
    let settings = Settings::new();

    for driver in [BinaryDriver::default(), BinaryDriver::new(BinaryConfig::compact())] {
        let Ok(values) = driver.load_record(&components, data.to_vec().into(), &settings) else {
            continue;
        };
        let fields: Vec<_> = components.iter().cloned().zip(values).collect();
        let encoded = driver
            .dump_record(&fields, &settings)
            .expect("decoded values must encode");
        assert_eq!(&encoded[..], data);
    }
});
