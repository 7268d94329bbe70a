//! Tessera Arrangement - Binding type and instance hierarchies to contexts
//!
//! An arrangement is declared once per schema type with an explicit
//! builder (`Declaration`), never implicitly:
//! - `ClassArrangement` shares one context across a type hierarchy
//! - `InstanceArrangement` gives each instance its own context, or shares
//!   or branches from the context of a descent instance
//!
//! Both follow the same rule: without `new_context` a descendant adopts
//! its descent's context; with it, a fresh context is linked below.

pub mod class;
pub mod declaration;
pub mod instance;

pub use class::*;
pub use declaration::*;
pub use instance::*;
