//! # Types
//!
//! Target-independent value types used throughout the engine: addresses,
//! the target architecture and decoded scalar values.

pub mod address;
pub mod target;
pub mod value;

pub use address::Address;
pub use target::Architecture;
pub use value::ScalarValue;
