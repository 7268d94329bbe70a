//! Tessera Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every Tessera layer:
//! - Handles (ContextId, InstanceId, ArrangementId, ComponentId)
//! - Dynamic values and value type tags
//! - Versions and the Least/Greatest sentinels
//! - Per-call settings snapshots
//! - The library error family

pub mod error;
pub mod id;
pub mod settings;
pub mod value;
pub mod version;

pub use error::*;
pub use id::*;
pub use settings::*;
pub use value::*;
pub use version::*;
