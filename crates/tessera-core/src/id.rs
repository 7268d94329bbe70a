//! Handle types for Tessera
//!
//! Contexts, instances, arrangements and components live in arenas and are
//! referenced by stable 64-bit handles instead of object identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $counter:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u64);

        static $counter: AtomicU64 = AtomicU64::new(1);

        impl $name {
            pub const ZERO: $name = $name(0);

            #[inline]
            pub fn new(id: u64) -> Self {
                $name(id)
            }

            /// Allocate a process-unique handle (never ZERO)
            #[inline]
            pub fn fresh() -> Self {
                $name($counter.fetch_add(1, Ordering::Relaxed))
            }

            #[inline]
            pub fn to_bytes(self) -> [u8; 8] {
                self.0.to_le_bytes()
            }

            #[inline]
            pub fn from_bytes(bytes: [u8; 8]) -> Self {
                $name(u64::from_le_bytes(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({:x})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// Context handle - key into the context registry arena
    ContextId,
    NEXT_CONTEXT,
    "Context"
);

handle!(
    /// Instance handle - identity of one arranged instance
    InstanceId,
    NEXT_INSTANCE,
    "Instance"
);

handle!(
    /// Arrangement handle - identity of one declared arrangement type
    ArrangementId,
    NEXT_ARRANGEMENT,
    "Arrangement"
);

handle!(
    /// Component handle - identity of one schema component.
    /// Two components with the same name are still distinct unless they share this id.
    ComponentId,
    NEXT_COMPONENT,
    "Component"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_id_roundtrip() {
        let id = ContextId::new(0xDEADBEEF_CAFEBABE);
        assert_eq!(ContextId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn test_fresh_handles_are_unique() {
        let a = ComponentId::fresh();
        let b = ComponentId::fresh();
        assert_ne!(a, b);
        assert_ne!(a, ComponentId::ZERO);
    }

    #[test]
    fn test_handle_formatting() {
        let id = InstanceId::new(255);
        assert_eq!(format!("{:?}", id), "Instance(ff)");
        assert_eq!(id.to_string(), "Instance#255");
    }
}
