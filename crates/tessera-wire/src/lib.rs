//! Tessera Wire - Drivers and codecs
//!
//! The core never produces bytes itself. It asks a named `Driver` for a
//! `Codec` per component and delegates:
//! - `Codec`: dump/load of a single value
//! - `Driver`: codec lookup per component, record framing
//! - `DriverRegistry`: process-wide name -> driver catalog
//! - `BinaryDriver`: reference big/little-endian binary encoding

pub mod binary;
pub mod driver;
pub mod registry;

pub use binary::*;
pub use driver::*;
pub use registry::*;
