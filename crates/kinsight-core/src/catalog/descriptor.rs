//! Type descriptors, members and member candidates.

use std::fmt;

use smallvec::SmallVec;

use crate::types::value::decode_unsigned;

/// Stable numeric identifier of a type descriptor
///
/// Ids are handed out by [`CatalogBuilder`](super::CatalogBuilder) starting
/// at 1 and never change for the lifetime of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

/// How the bytes of a base type are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseEncoding
{
    Signed,
    Unsigned,
    Bool,
    Float,
}

/// Shape of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind
{
    /// Integer, boolean or floating point type
    Base(BaseEncoding),
    /// Enumeration, decoded as a signed integer of the descriptor's size
    Enum,
    /// Pointer to `target`, or an untyped `void *` when `target` is `None`
    Pointer
    {
        target: Option<TypeId>
    },
    /// Array of `element`; `length` is `None` for flexible or unknown arrays
    Array
    {
        element: TypeId,
        length: Option<u64>,
    },
    Struct
    {
        members: Vec<Member>
    },
    Union
    {
        members: Vec<Member>
    },
    /// Transparent alias of `target`
    Typedef
    {
        target: TypeId
    },
    Function,
}

impl TypeKind
{
    /// Short label used in log output and error messages.
    #[must_use]
    pub fn label(&self) -> &'static str
    {
        match self {
            TypeKind::Base(_) => "base",
            TypeKind::Enum => "enum",
            TypeKind::Pointer { .. } => "pointer",
            TypeKind::Array { .. } => "array",
            TypeKind::Struct { .. } => "struct",
            TypeKind::Union { .. } => "union",
            TypeKind::Typedef { .. } => "typedef",
            TypeKind::Function => "function",
        }
    }
}

/// Layout description of one type in the catalog
///
/// Names are not unique: the same name may be declared several times with
/// different sizes (forward declarations, per-unit variants, configuration
/// dependent layouts). The [`TypeId`] is the only stable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor
{
    id: TypeId,
    name: String,
    size: u64,
    kind: TypeKind,
}

impl TypeDescriptor
{
    pub(crate) fn new(id: TypeId, name: String, size: u64, kind: TypeKind) -> Self
    {
        Self { id, name, size, kind }
    }

    #[must_use]
    pub fn id(&self) -> TypeId
    {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Size of one instance in bytes
    #[must_use]
    pub fn size(&self) -> u64
    {
        self.size
    }

    #[must_use]
    pub fn kind(&self) -> &TypeKind
    {
        &self.kind
    }

    /// Members of a struct or union; empty for every other kind.
    #[must_use]
    pub fn members(&self) -> &[Member]
    {
        match &self.kind {
            TypeKind::Struct { members } | TypeKind::Union { members } => members,
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_struct_or_union(&self) -> bool
    {
        matches!(self.kind, TypeKind::Struct { .. } | TypeKind::Union { .. })
    }

    #[must_use]
    pub fn is_pointer(&self) -> bool
    {
        matches!(self.kind, TypeKind::Pointer { .. })
    }

    #[must_use]
    pub fn is_function(&self) -> bool
    {
        matches!(self.kind, TypeKind::Function)
    }

    /// Find a member by name, returning its index and description.
    #[must_use]
    pub fn find_member(&self, name: &str) -> Option<(usize, &Member)>
    {
        self.members()
            .iter()
            .enumerate()
            .find(|(_, member)| member.name() == name)
    }

    /// Look up a member by name or index.
    #[must_use]
    pub fn member(&self, member: MemberRef<'_>) -> Option<(usize, &Member)>
    {
        match member {
            MemberRef::Name(name) => self.find_member(name),
            MemberRef::Index(index) => self.members().get(index).map(|m| (index, m)),
        }
    }

    /// Whether instances of `self` and `other` can be compared member by member
    ///
    /// Two descriptors share a layout when they are the same descriptor, or
    /// when both are structs (or both unions) with equal name and size and the
    /// same member names at the same offsets. Member types are not compared:
    /// the same struct is frequently emitted once per compilation unit with
    /// different member type ids.
    #[must_use]
    pub fn same_layout(&self, other: &TypeDescriptor) -> bool
    {
        if self.id == other.id {
            return true;
        }
        let same_kind = matches!(
            (&self.kind, &other.kind),
            (TypeKind::Struct { .. }, TypeKind::Struct { .. }) | (TypeKind::Union { .. }, TypeKind::Union { .. })
        );
        same_kind
            && self.name == other.name
            && self.size == other.size
            && self.members().len() == other.members().len()
            && self
                .members()
                .iter()
                .zip(other.members())
                .all(|(a, b)| a.name() == b.name() && a.offset() == b.offset())
    }

    /// Every type id this descriptor refers to.
    pub(crate) fn referenced_ids(&self) -> Vec<TypeId>
    {
        match &self.kind {
            TypeKind::Pointer { target } => target.iter().copied().collect(),
            TypeKind::Array { element, .. } => vec![*element],
            TypeKind::Typedef { target } => vec![*target],
            TypeKind::Struct { members } | TypeKind::Union { members } => members
                .iter()
                .flat_map(|m| m.candidates().iter().map(|c| c.type_id()))
                .collect(),
            TypeKind::Base(_) | TypeKind::Enum | TypeKind::Function => Vec::new(),
        }
    }

    pub(crate) fn set_size(&mut self, size: u64)
    {
        self.size = size;
    }

    pub(crate) fn set_name(&mut self, name: String)
    {
        self.name = name;
    }

    pub(crate) fn set_members(&mut self, new_members: Vec<Member>) -> bool
    {
        match &mut self.kind {
            TypeKind::Struct { members } | TypeKind::Union { members } => {
                *members = new_members;
                true
            }
            _ => false,
        }
    }
}

/// A named field of a struct or union
///
/// Most members have exactly one candidate type, their declared type. Members
/// whose real type depends on runtime context (a `void *` that always points to
/// one of a few structs, a union discriminated by a neighbouring field) carry
/// several candidates, each with a rule describing when it applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member
{
    name: String,
    offset: u64,
    candidates: SmallVec<[Candidate; 1]>,
}

impl Member
{
    /// Member with a single, declared type.
    pub fn new(name: impl Into<String>, offset: u64, type_id: TypeId) -> Self
    {
        let mut candidates = SmallVec::new();
        candidates.push(Candidate::new(type_id));
        Self {
            name: name.into(),
            offset,
            candidates,
        }
    }

    /// Member with an explicit candidate list; the first entry is the declared type.
    pub fn with_candidates(
        name: impl Into<String>,
        offset: u64,
        candidates: impl IntoIterator<Item = Candidate>,
    ) -> Self
    {
        Self {
            name: name.into(),
            offset,
            candidates: candidates.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Byte offset from the start of the owning struct or union
    #[must_use]
    pub fn offset(&self) -> u64
    {
        self.offset
    }

    #[must_use]
    pub fn candidates(&self) -> &[Candidate]
    {
        &self.candidates
    }

    /// The declared type, i.e. the first candidate.
    #[must_use]
    pub fn declared_type(&self) -> Option<TypeId>
    {
        self.candidates.first().map(Candidate::type_id)
    }

    /// Whether the member has more than one candidate type.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool
    {
        self.candidates.len() > 1
    }

    /// First candidate whose rule accepts the bytes observed for it
    ///
    /// `observe` yields the member bytes as they would be read for a
    /// candidate, or `None` when they cannot be read; such candidates are
    /// skipped.
    pub fn first_compatible<F>(&self, mut observe: F) -> Option<(usize, &Candidate)>
    where
        F: FnMut(&Candidate) -> Option<Vec<u8>>,
    {
        self.candidates
            .iter()
            .enumerate()
            .find(|(_, candidate)| observe(candidate).is_some_and(|bytes| candidate.is_compatible(&bytes)))
    }
}

/// Condition under which a candidate type applies to a member
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CandidateRule
{
    /// Always applies
    #[default]
    Any,
    /// Applies when the member value is not zero
    NonNull,
    /// Applies when the member value is a multiple of the given alignment
    Aligned(u64),
    /// Applies when the member value does not exceed the given bound
    AtMost(u64),
}

/// One possible type of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate
{
    type_id: TypeId,
    rule: CandidateRule,
}

impl Candidate
{
    /// Candidate that always applies.
    #[must_use]
    pub fn new(type_id: TypeId) -> Self
    {
        Self {
            type_id,
            rule: CandidateRule::Any,
        }
    }

    #[must_use]
    pub fn with_rule(type_id: TypeId, rule: CandidateRule) -> Self
    {
        Self { type_id, rule }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId
    {
        self.type_id
    }

    #[must_use]
    pub fn rule(&self) -> CandidateRule
    {
        self.rule
    }

    /// Check the rule against the observed member bytes (little-endian).
    #[must_use]
    pub fn is_compatible(&self, observed: &[u8]) -> bool
    {
        let value = decode_unsigned(observed);
        match self.rule {
            CandidateRule::Any => true,
            CandidateRule::NonNull => value != 0,
            CandidateRule::Aligned(alignment) => alignment == 0 || value % alignment == 0,
            CandidateRule::AtMost(bound) => value <= bound,
        }
    }
}

/// Reference to a member, by name or by position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRef<'a>
{
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for MemberRef<'a>
{
    fn from(name: &'a str) -> Self
    {
        MemberRef::Name(name)
    }
}

impl<'a> From<&'a String> for MemberRef<'a>
{
    fn from(name: &'a String) -> Self
    {
        MemberRef::Name(name.as_str())
    }
}

impl From<usize> for MemberRef<'_>
{
    fn from(index: usize) -> Self
    {
        MemberRef::Index(index)
    }
}

impl fmt::Display for MemberRef<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            MemberRef::Name(name) => f.write_str(name),
            MemberRef::Index(index) => write!(f, "#{index}"),
        }
    }
}
