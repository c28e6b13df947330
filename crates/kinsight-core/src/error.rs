//! # Error Types
//!
//! Error handling for the introspection engine.
//!
//! We use `thiserror` to generate the `Error` trait implementations and the
//! messages. Every operation that touches snapshot bytes returns an
//! [`InsightResult`]; pure address and type bookkeeping never fails.

use std::fmt;

use thiserror::Error;

use crate::types::Address;

/// A structural invariant of an in-memory data structure that does not hold
///
/// Inconsistencies are diagnostics, not failures: traversals collect them,
/// log them and keep walking the parts of the structure that still make sense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency
{
    /// Address of the offending node or link
    pub address: Address,
    /// What was found to be wrong
    pub detail: String,
}

impl Inconsistency
{
    /// Create a new diagnostic for the object at `address`.
    pub fn new(address: Address, detail: impl Into<String>) -> Self
    {
        Self {
            address,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Inconsistency
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} @ {}", self.detail, self.address)
    }
}

/// Main error type for introspection operations
///
/// ## Error Categories
///
/// 1. **Input errors**: Parse, InvalidArgument, InvalidImage
/// 2. **Memory errors**: Unreadable, NullPointer
/// 3. **Catalog errors**: NotFound, AmbiguousMember, UnresolvedSymbol
/// 4. **Type errors**: NotAScalar, NotAPointer, UntypedPointer, Incomparable
/// 5. **Structure diagnostics**: InconsistentStructure
/// 6. **I/O errors**: Io (loading raw snapshot files)
#[derive(Error, Debug)]
pub enum InsightError
{
    /// A string could not be parsed as an address
    #[error("Invalid address '{input}': {reason}")]
    Parse
    {
        /// The rejected input
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// The requested byte range is not present in the chosen image
    ///
    /// Unmapped and paged-out addresses are routine in memory snapshots, so
    /// callers are expected to handle this and carry on with the next object.
    #[error("Unreadable memory: {length} bytes at {address} in image {image}")]
    Unreadable
    {
        /// Image the read was issued against
        image: usize,
        /// Start of the requested range
        address: Address,
        /// Number of bytes requested
        length: usize,
    },

    /// Unknown type id, type name, symbol or member
    #[error("{what} not found: {name}")]
    NotFound
    {
        /// Kind of entity that was looked up ("type", "symbol", "member", ...)
        what: &'static str,
        /// The name or id that was looked up
        name: String,
    },

    /// A member has several candidate types and none could be selected
    ///
    /// Use `TypedInstance::member_candidate()` to pick one explicitly.
    #[error("Member '{member}' has {candidates} candidate types and none was selected")]
    AmbiguousMember
    {
        /// Name of the member
        member: String,
        /// Number of candidate types
        candidates: usize,
    },

    /// A scalar value was requested from a struct, union, array or function
    #[error("Type '{0}' has no scalar value")]
    NotAScalar(String),

    /// Dereference of a pointer whose stored value is null
    #[error("Null pointer stored at {address}")]
    NullPointer
    {
        /// Address of the pointer slot
        address: Address,
    },

    /// A pointer operation was requested on a non-pointer type
    #[error("Type '{0}' is not a pointer")]
    NotAPointer(String),

    /// Dereference of a `void *`
    #[error("Cannot dereference untyped pointer stored at {address}")]
    UntypedPointer
    {
        /// Address of the pointer slot
        address: Address,
    },

    /// Diffing was requested across types that are not structurally comparable
    #[error("Instances of '{left}' and '{right}' are not comparable")]
    Incomparable
    {
        /// Type name of the left-hand instance
        left: String,
        /// Type name of the right-hand instance
        right: String,
    },

    /// An in-memory data structure violates its own invariants
    #[error("Inconsistent structure: {0}")]
    InconsistentStructure(Inconsistency),

    /// An image index outside of the loaded images
    #[error("Invalid image index {index} ({count} images loaded)")]
    InvalidImage
    {
        /// The requested index
        index: usize,
        /// Number of loaded images
        count: usize,
    },

    /// A symbol of a loaded unit whose section load address is unknown
    #[error("Symbol '{0}' belongs to a loaded unit whose section address is unknown")]
    UnresolvedSymbol(String),

    /// Invalid argument passed to an engine function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error while loading a snapshot file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InsightError
{
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self
    {
        Self::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(what: &'static str, name: impl fmt::Display) -> Self
    {
        Self::NotFound {
            what,
            name: name.to_string(),
        }
    }

    /// Whether this error only reports that memory could not be read.
    #[must_use]
    pub fn is_unreadable(&self) -> bool
    {
        matches!(self, Self::Unreadable { .. })
    }
}

impl From<Inconsistency> for InsightError
{
    fn from(inconsistency: Inconsistency) -> Self
    {
        Self::InconsistentStructure(inconsistency)
    }
}

/// Convenience type alias for `Result<T, InsightError>`
///
/// ```rust
/// use kinsight_core::error::InsightResult;
/// fn foo() -> InsightResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type InsightResult<T> = std::result::Result<T, InsightError>;
