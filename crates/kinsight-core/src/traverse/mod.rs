//! # Traversals
//!
//! Algorithms that walk kernel data structures built from typed instances:
//! intrusive lists, radix trees and per-CPU variables. Every walk carries an
//! explicit bound (sentinel, visited set, entry limit or maximum height), so
//! corrupted memory ends a walk instead of looping forever.

pub mod list;
pub mod percpu;
pub mod radix;

pub use list::ListEntries;
pub use radix::RadixWalk;
