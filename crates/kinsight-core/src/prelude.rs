//! Common imports for working with the engine.
//!
//! ```rust
//! use kinsight_core::prelude::*;
//! ```

pub use crate::catalog::{
    AmbiguousType, BaseEncoding, Candidate, CandidateRule, CatalogBuilder, Member, MemberRef, NoSections,
    SectionLocator, Symbol, SymbolId, SymbolLocation, TypeCatalog, TypeDescriptor, TypeId, TypeKind,
};
pub use crate::config::{EngineConfig, Resolution};
pub use crate::embedding::{EmbeddingResolver, EmbeddingRule};
pub use crate::error::{Inconsistency, InsightError, InsightResult};
pub use crate::inspector::Inspector;
pub use crate::instance::TypedInstance;
pub use crate::memory::{MemoryImage, MemorySpace, SnapshotImage};
pub use crate::modules::ModuleSections;
pub use crate::traverse::{list, percpu, radix, ListEntries, RadixWalk};
pub use crate::types::{Address, Architecture, ScalarValue};
