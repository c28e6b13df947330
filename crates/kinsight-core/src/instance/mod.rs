//! # Typed Instances
//!
//! A [`TypedInstance`] binds an address in one memory image to a type
//! descriptor. It is a small `Copy` handle: creating, moving or retyping an
//! instance never touches memory. Bytes are only read when a value, a
//! pointer or a candidate check is requested, and a failed read is reported
//! as [`InsightError::Unreadable`] for the caller to handle.
//!
//! ## Navigation
//!
//! ```rust
//! use kinsight_core::prelude::*;
//!
//! fn main() -> Result<(), InsightError>
//! {
//!     let mut builder = CatalogBuilder::new(Architecture::X86_64);
//!     let int = builder.base("int", 4, BaseEncoding::Signed);
//!     let point = builder.structure("point", 8, vec![Member::new("x", 0, int), Member::new("y", 4, int)]);
//!     builder.symbol("origin", point, Address::new(0x2000));
//!     let catalog = builder.build()?;
//!
//!     let mut bytes = 3i32.to_le_bytes().to_vec();
//!     bytes.extend_from_slice(&(-7i32).to_le_bytes());
//!     let image = SnapshotImage::new("vmcore").with_region(Address::new(0x2000), bytes);
//!     let space = MemorySpace::new().with_image(image);
//!     let inspector = Inspector::new(catalog, space);
//!
//!     let origin = inspector.symbol_instance("origin")?;
//!     let y = origin.member("y")?;
//!     assert_eq!(y.address(), Address::new(0x2004));
//!     assert_eq!(y.value()?.as_i64(), Some(-7));
//!     Ok(())
//! }
//! ```

mod diff;

use std::fmt;

use tracing::debug;

use crate::catalog::{BaseEncoding, Member, MemberRef, TypeDescriptor, TypeId, TypeKind};
use crate::config::Resolution;
use crate::error::{InsightError, InsightResult};
use crate::inspector::Inspector;
use crate::types::value::{decode_unsigned, sign_extend};
use crate::types::{Address, ScalarValue};

/// An object of a known type at an address in one memory image
#[derive(Clone, Copy)]
pub struct TypedInstance<'i>
{
    inspector: &'i Inspector,
    image: usize,
    address: Address,
    ty: &'i TypeDescriptor,
}

impl<'i> TypedInstance<'i>
{
    pub(crate) fn new(inspector: &'i Inspector, image: usize, address: Address, ty: &'i TypeDescriptor) -> Self
    {
        Self {
            inspector,
            image,
            address,
            ty,
        }
    }

    #[must_use]
    pub fn inspector(&self) -> &'i Inspector
    {
        self.inspector
    }

    /// Index of the memory image the instance lives in
    #[must_use]
    pub fn image(&self) -> usize
    {
        self.image
    }

    #[must_use]
    pub fn address(&self) -> Address
    {
        self.address
    }

    /// The bound type, exactly as given (typedefs are not resolved)
    #[must_use]
    pub fn type_descriptor(&self) -> &'i TypeDescriptor
    {
        self.ty
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId
    {
        self.ty.id()
    }

    #[must_use]
    pub fn type_name(&self) -> &'i str
    {
        self.ty.name()
    }

    /// Size of the instance's extent in bytes
    #[must_use]
    pub fn size(&self) -> u64
    {
        self.ty.size()
    }

    /// The bound type with typedefs resolved
    pub fn resolved(&self) -> InsightResult<&'i TypeDescriptor>
    {
        self.inspector.catalog().resolve(self.ty.id())
    }

    /// Whether the instance is at the null address. Never reads memory.
    #[must_use]
    pub fn is_null(&self) -> bool
    {
        self.address.is_null()
    }

    /// Same type and image at `address + offset` (wrapping).
    #[must_use]
    pub fn add_to_address(&self, offset: i64) -> Self
    {
        self.with_address(self.address.add_signed(offset))
    }

    #[must_use]
    pub fn with_address(&self, address: Address) -> Self
    {
        Self { address, ..*self }
    }

    /// Same instance with the low half of the address replaced
    #[must_use]
    pub fn with_address_low(&self, low: u32) -> Self
    {
        self.with_address(self.address.with_low(low))
    }

    /// Same instance with the high half of the address replaced
    #[must_use]
    pub fn with_address_high(&self, high: u32) -> Self
    {
        self.with_address(self.address.with_high(high))
    }

    /// Same address and type in another image.
    ///
    /// ## Errors
    ///
    /// `InvalidImage` if the index is out of range.
    pub fn in_image(&self, image: usize) -> InsightResult<Self>
    {
        self.inspector.space().check_image(image)?;
        Ok(Self { image, ..*self })
    }

    /// Reinterpret the same address as another type. Never reads memory.
    pub fn change_type(&self, type_id: TypeId) -> InsightResult<Self>
    {
        let ty = self.inspector.catalog().type_by_id(type_id)?;
        Ok(self.retyped(ty))
    }

    /// Reinterpret the same address as the preferred type of that name.
    pub fn change_type_by_name(&self, name: &str) -> InsightResult<Self>
    {
        let ty = self.inspector.catalog().type_by_name(name)?;
        Ok(self.retyped(ty))
    }

    pub(crate) fn retyped(&self, ty: &'i TypeDescriptor) -> Self
    {
        Self { ty, ..*self }
    }

    /// Whether at least the first byte of the instance can be read.
    #[must_use]
    pub fn is_accessible(&self) -> bool
    {
        self.inspector.read(self.image, self.address, 1).is_ok()
    }

    /// The raw bytes of the instance's extent
    pub fn raw_bytes(&self) -> InsightResult<Vec<u8>>
    {
        let length = usize::try_from(self.size())
            .map_err(|_| InsightError::InvalidArgument(format!("type '{}' is too large to read", self.type_name())))?;
        self.inspector.read(self.image, self.address, length)
    }

    fn read_scalar(&self, size: u64) -> InsightResult<u64>
    {
        // Callers only pass sizes up to eight bytes
        let size = usize::try_from(size.min(8)).unwrap_or(8);
        self.inspector
            .read(self.image, self.address, size)
            .map(|bytes| decode_unsigned(&bytes))
    }

    /// Decode the instance as a scalar
    ///
    /// ## Errors
    ///
    /// - `NotAScalar` for structs, unions, arrays, functions and base types
    ///   wider than eight bytes
    /// - `Unreadable` if the extent cannot be read
    #[allow(clippy::cast_possible_truncation)]
    pub fn value(&self) -> InsightResult<ScalarValue>
    {
        let resolved = self.resolved()?;
        let size = resolved.size();
        let not_scalar = || InsightError::NotAScalar(self.type_name().to_string());
        let width = usize::try_from(size).map_err(|_| not_scalar())?;

        match resolved.kind() {
            TypeKind::Base(encoding) if (1..=8).contains(&size) => {
                let raw = self.read_scalar(size)?;
                match encoding {
                    BaseEncoding::Signed => Ok(ScalarValue::Signed(sign_extend(raw, width))),
                    BaseEncoding::Unsigned => Ok(ScalarValue::Unsigned(raw)),
                    BaseEncoding::Bool => Ok(ScalarValue::Bool(raw != 0)),
                    BaseEncoding::Float if size == 4 => Ok(ScalarValue::Float(f64::from(f32::from_bits(raw as u32)))),
                    BaseEncoding::Float if size == 8 => Ok(ScalarValue::Float(f64::from_bits(raw))),
                    BaseEncoding::Float => Err(not_scalar()),
                }
            }
            TypeKind::Enum if (1..=8).contains(&size) => {
                let raw = self.read_scalar(size)?;
                Ok(ScalarValue::Signed(sign_extend(raw, width)))
            }
            TypeKind::Pointer { .. } => self.pointer_value().map(ScalarValue::Pointer),
            _ => Err(not_scalar()),
        }
    }

    /// The address stored in a pointer instance
    ///
    /// ## Errors
    ///
    /// `NotAPointer` for non-pointer types, `Unreadable` if the slot cannot be read.
    pub fn pointer_value(&self) -> InsightResult<Address>
    {
        let resolved = self.resolved()?;
        if !resolved.is_pointer() {
            return Err(InsightError::NotAPointer(self.type_name().to_string()));
        }
        self.read_scalar(resolved.size()).map(Address::new)
    }

    /// Follow a pointer to an instance of its target type
    ///
    /// ## Errors
    ///
    /// - `NotAPointer` if the instance is not a pointer
    /// - `Unreadable` if the pointer slot cannot be read
    /// - `NullPointer` if the stored value is null
    /// - `UntypedPointer` if the pointer is a `void *`
    pub fn dereference(&self) -> InsightResult<Self>
    {
        let resolved = self.resolved()?;
        let TypeKind::Pointer { target } = resolved.kind() else {
            return Err(InsightError::NotAPointer(self.type_name().to_string()));
        };
        let pointee = self.pointer_value()?;
        if pointee.is_null() {
            return Err(InsightError::NullPointer { address: self.address });
        }
        let target = (*target).ok_or(InsightError::UntypedPointer { address: self.address })?;
        let ty = self.inspector.catalog().type_by_id(target)?;
        Ok(Self {
            address: pointee,
            ty,
            ..*self
        })
    }

    /// The resolved struct or union type, or `NotFound` naming `member`.
    fn owner(&self, member: MemberRef<'_>) -> InsightResult<&'i TypeDescriptor>
    {
        let resolved = self.resolved()?;
        if resolved.is_struct_or_union() {
            Ok(resolved)
        } else {
            Err(InsightError::not_found(
                "member",
                format!("{member} (type '{}' is a {})", self.type_name(), resolved.kind().label()),
            ))
        }
    }

    fn lookup_member(&self, member: MemberRef<'_>) -> InsightResult<&'i Member>
    {
        let owner = self.owner(member)?;
        owner
            .member(member)
            .map(|(_, m)| m)
            .ok_or_else(|| InsightError::not_found("member", format!("{}.{member}", owner.name())))
    }

    /// Names of all members, in declaration order. Empty for non-struct types.
    #[must_use]
    pub fn member_names(&self) -> Vec<&'i str>
    {
        self.resolved()
            .map(|t| t.members().iter().map(Member::name).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn member_count(&self) -> usize
    {
        self.resolved().map(|t| t.members().len()).unwrap_or(0)
    }

    #[must_use]
    pub fn member_exists(&self, name: &str) -> bool
    {
        self.lookup_member(MemberRef::Name(name)).is_ok()
    }

    /// Byte offset of a member within the instance's type.
    pub fn member_offset(&self, name: &str) -> InsightResult<u64>
    {
        self.lookup_member(MemberRef::Name(name)).map(Member::offset)
    }

    /// Member by name or index, resolving ambiguity with the configured [`Resolution`].
    ///
    /// ## Errors
    ///
    /// - `NotFound` if the member does not exist or the type has no members
    /// - `AmbiguousMember` if the member has several candidates and none can
    ///   be selected
    pub fn member<'m>(&self, member: impl Into<MemberRef<'m>>) -> InsightResult<Self>
    {
        self.member_with(member, self.inspector.config().resolution)
    }

    /// Member by name or index with an explicit resolution mode
    ///
    /// The member's address is `self.address + offset`. A member with a single
    /// candidate always gets that type. With several candidates:
    ///
    /// - `Resolution::Strict` fails with `AmbiguousMember`
    /// - `Resolution::FirstCompatible` reads the member slot as each candidate
    ///   would see it and picks the first candidate whose rule accepts the
    ///   bytes; candidates whose slot cannot be read are skipped, and
    ///   `AmbiguousMember` is returned if none remains
    pub fn member_with<'m>(&self, member: impl Into<MemberRef<'m>>, resolution: Resolution) -> InsightResult<Self>
    {
        let member_ref = member.into();
        let member = self.lookup_member(member_ref)?;
        let address = self.address + member.offset();
        let catalog = self.inspector.catalog();

        let candidates = member.candidates();
        if candidates.len() == 1 {
            let ty = catalog.type_by_id(candidates[0].type_id())?;
            return Ok(Self { address, ty, ..*self });
        }

        let ambiguous = || InsightError::AmbiguousMember {
            member: member.name().to_string(),
            candidates: candidates.len(),
        };
        if resolution == Resolution::Strict {
            return Err(ambiguous());
        }

        let picked = member.first_compatible(|candidate| {
            let size = catalog.type_by_id(candidate.type_id()).ok()?.size().min(8);
            self.inspector
                .read(self.image, address, usize::try_from(size).ok()?)
                .ok()
        });
        let (index, candidate) = picked.ok_or_else(ambiguous)?;
        debug!(
            member = member.name(),
            owner = self.type_name(),
            candidate = index,
            "Resolved ambiguous member"
        );
        let ty = catalog.type_by_id(candidate.type_id())?;
        Ok(Self { address, ty, ..*self })
    }

    /// Number of candidate types of a member
    pub fn member_candidate_count<'m>(&self, member: impl Into<MemberRef<'m>>) -> InsightResult<usize>
    {
        self.lookup_member(member.into()).map(|m| m.candidates().len())
    }

    /// Member typed as its `index`-th candidate, without any compatibility check.
    pub fn member_candidate<'m>(&self, member: impl Into<MemberRef<'m>>, index: usize) -> InsightResult<Self>
    {
        let member_ref = member.into();
        let member = self.lookup_member(member_ref)?;
        let candidate = member
            .candidates()
            .get(index)
            .ok_or_else(|| InsightError::not_found("candidate", format!("{member_ref}#{index}")))?;
        let ty = self.inspector.catalog().type_by_id(candidate.type_id())?;
        Ok(Self {
            address: self.address + member.offset(),
            ty,
            ..*self
        })
    }

    /// Whether the `index`-th candidate's rule accepts the member's current bytes.
    ///
    /// ## Errors
    ///
    /// `Unreadable` if the member slot cannot be read.
    pub fn member_candidate_compatible<'m>(&self, member: impl Into<MemberRef<'m>>, index: usize) -> InsightResult<bool>
    {
        let member_ref = member.into();
        let typed = self.member_candidate(member_ref, index)?;
        let member = self.lookup_member(member_ref)?;
        let length = usize::try_from(typed.size().min(8)).unwrap_or(8);
        let bytes = self.inspector.read(self.image, typed.address(), length)?;
        Ok(member.candidates()[index].is_compatible(&bytes))
    }

    /// Follow a path of member names, dereferencing pointers on the way
    ///
    /// Before each step, an instance of pointer type is dereferenced, so
    /// `["i_sb", "s_op"]` on an inode yields the `s_op` member of the super
    /// block the inode points to.
    pub fn member_path(&self, path: &[&str]) -> InsightResult<Self>
    {
        let mut current = *self;
        for name in path {
            if current.resolved()?.is_pointer() {
                current = current.dereference()?;
            }
            current = current.member(*name)?;
        }
        Ok(current)
    }

    /// Declared length of an array instance, `None` if unknown.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the instance is not an array.
    pub fn array_length(&self) -> InsightResult<Option<u64>>
    {
        match self.resolved()?.kind() {
            TypeKind::Array { length, .. } => Ok(*length),
            _ => Err(InsightError::InvalidArgument(format!("type '{}' is not an array", self.type_name()))),
        }
    }

    /// Element `index` of an array instance
    ///
    /// The element address is computed with wrapping arithmetic. Indices past
    /// a known length fail with `NotFound`; arrays of unknown length accept
    /// any index.
    pub fn array_element(&self, index: u64) -> InsightResult<Self>
    {
        let TypeKind::Array { element, length } = self.resolved()?.kind() else {
            return Err(InsightError::InvalidArgument(format!("type '{}' is not an array", self.type_name())));
        };
        if length.is_some_and(|length| index >= length) {
            return Err(InsightError::not_found("array element", format!("{}[{index}]", self.type_name())));
        }
        let ty = self.inspector.catalog().type_by_id(*element)?;
        Ok(Self {
            address: self.address + index.wrapping_mul(ty.size()),
            ty,
            ..*self
        })
    }
}

impl fmt::Debug for TypedInstance<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("TypedInstance")
            .field("image", &self.image)
            .field("address", &self.address)
            .field("type", &self.ty.name())
            .field("type_id", &self.ty.id())
            .finish()
    }
}

impl fmt::Display for TypedInstance<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "({}) @ {}", self.ty.name(), self.address)
    }
}
