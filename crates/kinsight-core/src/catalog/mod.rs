//! # Type Catalog
//!
//! Read-only catalog of the types and global variables of the inspected system.
//!
//! The catalog is filled once through a [`CatalogBuilder`] by whatever reads
//! the system's debug information, and is immutable afterwards. All lookups
//! are by stable id or by (non-unique) name.
//!
//! ## Ambiguous types
//!
//! Kernel builds commonly contain several definitions of the same type name
//! with different sizes. [`TypeCatalog::ambiguous_types`] reports every name
//! that is defined with more than one distinct non-zero size, ignoring
//! function types. The report is computed on first use and cached.

mod builder;
mod descriptor;
mod pattern;
mod symbol;

use std::collections::HashMap;

use once_cell::sync::OnceCell;

pub use builder::{CatalogBuilder, MAX_TYPE_REF_DEPTH};
pub use descriptor::{BaseEncoding, Candidate, CandidateRule, Member, MemberRef, TypeDescriptor, TypeId, TypeKind};
pub use symbol::{NoSections, SectionLocator, Symbol, SymbolId, SymbolLocation};

use crate::error::{InsightError, InsightResult};
use crate::types::Architecture;

/// A type name that is defined with more than one size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousType
{
    pub name: String,
    /// Distinct non-zero sizes, ascending
    pub sizes: Vec<u64>,
}

/// Immutable collection of type descriptors and symbols
#[derive(Debug)]
pub struct TypeCatalog
{
    architecture: Architecture,
    types: Vec<TypeDescriptor>,
    types_by_name: HashMap<String, Vec<TypeId>>,
    symbols: Vec<Symbol>,
    symbols_by_name: HashMap<String, SymbolId>,
    ambiguous: OnceCell<Vec<AmbiguousType>>,
}

impl TypeCatalog
{
    pub(crate) fn from_parts(architecture: Architecture, types: Vec<TypeDescriptor>, symbols: Vec<Symbol>) -> Self
    {
        let mut types_by_name: HashMap<String, Vec<TypeId>> = HashMap::new();
        for descriptor in &types {
            if !descriptor.name().is_empty() {
                types_by_name
                    .entry(descriptor.name().to_string())
                    .or_default()
                    .push(descriptor.id());
            }
        }

        // The first definition of a name wins
        let mut symbols_by_name = HashMap::new();
        for symbol in &symbols {
            symbols_by_name.entry(symbol.name().to_string()).or_insert(symbol.id());
        }

        Self {
            architecture,
            types,
            types_by_name,
            symbols,
            symbols_by_name,
            ambiguous: OnceCell::new(),
        }
    }

    /// Architecture the catalog was built for
    #[must_use]
    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    /// Width of a pointer in the inspected system
    #[must_use]
    pub fn pointer_size(&self) -> usize
    {
        self.architecture.pointer_size()
    }

    /// Number of type descriptors
    #[must_use]
    pub fn type_count(&self) -> usize
    {
        self.types.len()
    }

    /// Look up a descriptor by id.
    ///
    /// ## Errors
    ///
    /// `NotFound` if no descriptor has this id.
    pub fn type_by_id(&self, id: TypeId) -> InsightResult<&TypeDescriptor>
    {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.types.get(index))
            .ok_or_else(|| InsightError::not_found("type", id))
    }

    /// All descriptors carrying `name`, in creation order. Empty if unknown.
    #[must_use]
    pub fn types_by_name(&self, name: &str) -> Vec<&TypeDescriptor>
    {
        self.types_by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.type_by_id(*id).ok())
            .collect()
    }

    /// Preferred descriptor for `name`
    ///
    /// Complete definitions (non-zero size) are preferred over forward
    /// declarations. Among several complete definitions the first one wins;
    /// use [`types_by_name`](Self::types_by_name) to see all of them.
    ///
    /// ## Errors
    ///
    /// `NotFound` if no descriptor has this name.
    pub fn type_by_name(&self, name: &str) -> InsightResult<&TypeDescriptor>
    {
        let candidates = self.types_by_name(name);
        candidates
            .iter()
            .find(|t| t.size() > 0)
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(|| InsightError::not_found("type", name))
    }

    /// Follow a typedef chain to the underlying descriptor.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown id, `InvalidArgument` if the chain is longer
    /// than [`MAX_TYPE_REF_DEPTH`].
    pub fn resolve(&self, id: TypeId) -> InsightResult<&TypeDescriptor>
    {
        let mut current = self.type_by_id(id)?;
        for _ in 0..MAX_TYPE_REF_DEPTH {
            match current.kind() {
                TypeKind::Typedef { target } => current = self.type_by_id(*target)?,
                _ => return Ok(current),
            }
        }
        Err(InsightError::InvalidArgument(format!(
            "typedef chain of {id} is longer than {MAX_TYPE_REF_DEPTH}"
        )))
    }

    /// Sorted, deduplicated list of all type names
    #[must_use]
    pub fn type_names(&self) -> Vec<&str>
    {
        let mut names: Vec<&str> = self.types_by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn symbol_by_id(&self, id: SymbolId) -> InsightResult<&Symbol>
    {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.symbols.get(index))
            .ok_or_else(|| InsightError::not_found("symbol", id))
    }

    pub fn symbol_by_name(&self, name: &str) -> InsightResult<&Symbol>
    {
        self.symbols_by_name
            .get(name)
            .and_then(|id| self.symbol_by_id(*id).ok())
            .ok_or_else(|| InsightError::not_found("symbol", name))
    }

    /// Whether a symbol with exactly this name exists.
    #[must_use]
    pub fn symbol_exists(&self, name: &str) -> bool
    {
        self.symbols_by_name.contains_key(name)
    }

    /// Symbols whose name matches a shell-style pattern (`*`, `?`)
    ///
    /// A pattern without wildcards is an exact lookup. Results are in creation
    /// order.
    ///
    /// ```rust
    /// use kinsight_core::catalog::{BaseEncoding, CatalogBuilder};
    /// use kinsight_core::types::{Address, Architecture};
    ///
    /// let mut builder = CatalogBuilder::new(Architecture::X86_64);
    /// let int = builder.base("int", 4, BaseEncoding::Signed);
    /// builder.symbol("tcp_prot", int, Address::new(0x1000));
    /// builder.symbol("udp_prot", int, Address::new(0x2000));
    /// builder.symbol("tcp_hashinfo", int, Address::new(0x3000));
    /// let catalog = builder.build().unwrap();
    ///
    /// assert_eq!(catalog.symbols_by_pattern("*_prot").len(), 2);
    /// assert_eq!(catalog.symbols_by_pattern("tcp_*").len(), 2);
    /// assert_eq!(catalog.symbols_by_pattern("tcp").len(), 0);
    /// ```
    #[must_use]
    pub fn symbols_by_pattern(&self, pattern: &str) -> Vec<&Symbol>
    {
        if !pattern::has_wildcards(pattern) {
            return self.symbol_by_name(pattern).into_iter().collect();
        }
        self.symbols
            .iter()
            .filter(|symbol| pattern::glob_match(pattern, symbol.name()))
            .collect()
    }

    #[must_use]
    pub fn symbol_ids(&self) -> Vec<SymbolId>
    {
        self.symbols.iter().map(Symbol::id).collect()
    }

    /// Type names defined with more than one distinct size
    ///
    /// Sorted by name. Zero sizes (forward declarations) and function types do
    /// not count.
    pub fn ambiguous_types(&self) -> &[AmbiguousType]
    {
        self.ambiguous.get_or_init(|| {
            let mut report: Vec<AmbiguousType> = self
                .types_by_name
                .iter()
                .filter_map(|(name, ids)| {
                    let mut sizes: Vec<u64> = ids
                        .iter()
                        .filter_map(|id| self.type_by_id(*id).ok())
                        .filter(|t| !t.is_function() && t.size() > 0)
                        .map(TypeDescriptor::size)
                        .collect();
                    sizes.sort_unstable();
                    sizes.dedup();
                    (sizes.len() > 1).then(|| AmbiguousType {
                        name: name.clone(),
                        sizes,
                    })
                })
                .collect();
            report.sort_by(|a, b| a.name.cmp(&b.name));
            report
        })
    }

    #[must_use]
    pub fn is_ambiguous(&self, name: &str) -> bool
    {
        self.ambiguous_types()
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .is_ok()
    }
}
