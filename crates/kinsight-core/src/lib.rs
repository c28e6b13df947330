//! # kinsight-core
//!
//! Typed introspection of kernel memory snapshots.
//!
//! A snapshot is raw bytes; this crate gives them meaning:
//! - [`catalog`]: the types and global variables of the inspected kernel
//! - [`memory`]: byte access to one or more snapshot images
//! - [`instance`]: typed views ("a `task_struct` at this address") with
//!   member access, pointer following, retyping and comparison
//! - [`traverse`]: walkers for intrusive lists, radix trees and per-CPU
//!   variables
//! - [`embedding`]: upgrading a generic object to the structure embedding it
//! - [`modules`]: section addresses of loaded modules, for relocating their
//!   symbols
//!
//! Everything hangs off an [`Inspector`], which owns the catalog and the
//! memory and is immutable once built.
//!
//! ## Byte order
//!
//! All supported targets are little-endian; scalars are decoded accordingly.

pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod inspector;
pub mod instance;
pub mod memory;
pub mod modules;
pub mod prelude;
pub mod traverse;
pub mod types;

pub use catalog::{CatalogBuilder, TypeCatalog};
pub use config::{EngineConfig, Resolution};
pub use embedding::{EmbeddingResolver, EmbeddingRule};
// Re-export commonly used types
pub use error::{Inconsistency, InsightError, InsightResult};
pub use inspector::Inspector;
pub use instance::TypedInstance;
pub use memory::{MemoryImage, MemorySpace, SnapshotImage};
pub use modules::ModuleSections;
pub use types::{Address, Architecture, ScalarValue};
