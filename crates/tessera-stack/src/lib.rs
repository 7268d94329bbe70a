//! Tessera Stack - Ordered, filterable collections of schema components
//!
//! A component is a typed field description: kind, name, default,
//! priority, version range and constraints. A `Stack` keeps components in
//! priority order and answers "which components are live under these
//! settings" through a pluggable `Predicate`. Filtering is a read-time
//! view; pushes and pops never evaluate predicates.

pub mod component;
pub mod constraint;
pub mod predicate;
pub mod stack;

pub use component::*;
pub use constraint::*;
pub use predicate::*;
pub use stack::*;
