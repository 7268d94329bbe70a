//! Tessera Context - Shared mutable state for arranged components
//!
//! This crate implements the context layer:
//! - Context kinds and their storage (mappings, sequences, queues, buffers)
//! - Mutations as data, each with a stable method name
//! - The context registry (arena + handles, parent/child links)
//! - Link policies run when contexts are connected
//! - The hook/resource pool guaranteeing acquire/release around mutation

pub mod context;
pub mod data;
pub mod kind;
pub mod link;
pub mod mutation;
pub mod pool;
pub mod registry;

pub use context::*;
pub use data::*;
pub use kind::*;
pub use link::*;
pub use mutation::*;
pub use pool::*;
pub use registry::*;
