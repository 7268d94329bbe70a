//! Tessera Model - Versioned record schemas
//!
//! A `Schema` composes a version-aware component stack with an instance
//! arrangement. Each `Record` of a schema keeps its field values in its
//! own context (or one shared with a descent record), so every write goes
//! through the context's hook pool and observers.
//!
//! Byte-level work is delegated to a `tessera_wire::Driver`.

pub mod field;
pub mod record;
pub mod schema;

pub use field::*;
pub use record::*;
pub use schema::*;
