//! Incremental construction of a [`TypeCatalog`].

use tracing::debug;

use super::descriptor::{BaseEncoding, Member, TypeDescriptor, TypeId, TypeKind};
use super::symbol::{Symbol, SymbolId, SymbolLocation};
use super::TypeCatalog;
use crate::error::{InsightError, InsightResult};
use crate::types::{Address, Architecture};

/// Maximum number of typedef / array / pointer hops followed when deriving
/// sizes and names, and when resolving typedef chains.
pub const MAX_TYPE_REF_DEPTH: usize = 32;

/// Builder used by debug-info readers to populate a catalog
///
/// Types may refer to ids that are created later (self-referential structs,
/// forward declarations); every reference is validated once in [`build`].
/// Sizes of arrays and typedefs and the names of pointer and array types are
/// derived during `build`.
///
/// ## Example
///
/// ```rust
/// use kinsight_core::catalog::{BaseEncoding, CatalogBuilder, Member};
/// use kinsight_core::types::{Address, Architecture};
///
/// let mut builder = CatalogBuilder::new(Architecture::X86_64);
/// let int = builder.base("int", 4, BaseEncoding::Signed);
/// let node = builder.declare_struct("node", 16);
/// let node_ptr = builder.pointer(Some(node));
/// builder
///     .define_members(node, vec![Member::new("value", 0, int), Member::new("next", 8, node_ptr)])
///     .unwrap();
/// builder.symbol("root", node, Address::new(0x1000));
///
/// let catalog = builder.build().unwrap();
/// assert_eq!(catalog.type_by_id(node_ptr).unwrap().name(), "node *");
/// ```
///
/// [`build`]: CatalogBuilder::build
#[derive(Debug)]
pub struct CatalogBuilder
{
    architecture: Architecture,
    types: Vec<TypeDescriptor>,
    symbols: Vec<Symbol>,
}

impl CatalogBuilder
{
    #[must_use]
    pub fn new(architecture: Architecture) -> Self
    {
        Self {
            architecture,
            types: Vec::new(),
            symbols: Vec::new(),
        }
    }

    fn push(&mut self, name: impl Into<String>, size: u64, kind: TypeKind) -> TypeId
    {
        let id = TypeId(u32::try_from(self.types.len() + 1).unwrap_or(u32::MAX));
        self.types.push(TypeDescriptor::new(id, name.into(), size, kind));
        id
    }

    /// Integer, boolean or floating point type.
    pub fn base(&mut self, name: &str, size: u64, encoding: BaseEncoding) -> TypeId
    {
        self.push(name, size, TypeKind::Base(encoding))
    }

    pub fn enumeration(&mut self, name: &str, size: u64) -> TypeId
    {
        self.push(name, size, TypeKind::Enum)
    }

    /// Pointer of the architecture's width; `None` creates `void *`.
    pub fn pointer(&mut self, target: Option<TypeId>) -> TypeId
    {
        let size = self.architecture.pointer_size() as u64;
        self.push(String::new(), size, TypeKind::Pointer { target })
    }

    /// Array of `length` elements, or of unknown length when `None`.
    pub fn array(&mut self, element: TypeId, length: Option<u64>) -> TypeId
    {
        self.push(String::new(), 0, TypeKind::Array { element, length })
    }

    /// Declare a struct whose members are supplied later with [`define_members`](Self::define_members).
    pub fn declare_struct(&mut self, name: &str, size: u64) -> TypeId
    {
        self.push(name, size, TypeKind::Struct { members: Vec::new() })
    }

    pub fn declare_union(&mut self, name: &str, size: u64) -> TypeId
    {
        self.push(name, size, TypeKind::Union { members: Vec::new() })
    }

    /// Set the members of a previously declared struct or union.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown id, `InvalidArgument` if the id is not a
    /// struct or union.
    pub fn define_members(&mut self, id: TypeId, members: Vec<Member>) -> InsightResult<()>
    {
        let index = (id.0 as usize).wrapping_sub(1);
        let descriptor = self
            .types
            .get_mut(index)
            .ok_or_else(|| InsightError::not_found("type", id))?;
        if descriptor.set_members(members) {
            Ok(())
        } else {
            Err(InsightError::InvalidArgument(format!(
                "type {id} ('{}') is a {}, not a struct or union",
                descriptor.name(),
                descriptor.kind().label()
            )))
        }
    }

    pub fn structure(&mut self, name: &str, size: u64, members: Vec<Member>) -> TypeId
    {
        self.push(name, size, TypeKind::Struct { members })
    }

    pub fn union(&mut self, name: &str, size: u64, members: Vec<Member>) -> TypeId
    {
        self.push(name, size, TypeKind::Union { members })
    }

    pub fn typedef(&mut self, name: &str, target: TypeId) -> TypeId
    {
        self.push(name, 0, TypeKind::Typedef { target })
    }

    pub fn function(&mut self, name: &str) -> TypeId
    {
        self.push(name, 0, TypeKind::Function)
    }

    fn push_symbol(&mut self, name: &str, type_id: TypeId, location: SymbolLocation) -> SymbolId
    {
        let id = SymbolId(u32::try_from(self.symbols.len() + 1).unwrap_or(u32::MAX));
        self.symbols.push(Symbol::new(id, name.to_string(), type_id, location));
        id
    }

    /// Global variable of the base image at a fixed address.
    pub fn symbol(&mut self, name: &str, type_id: TypeId, address: Address) -> SymbolId
    {
        self.push_symbol(name, type_id, SymbolLocation::Absolute(address))
    }

    /// Global variable of a loadable unit, relative to one of its sections.
    pub fn module_symbol(&mut self, name: &str, type_id: TypeId, unit: &str, section: &str, offset: u64) -> SymbolId
    {
        let location = SymbolLocation::SectionRelative {
            unit: unit.to_string(),
            section: section.to_string(),
            offset,
        };
        self.push_symbol(name, type_id, location)
    }

    /// Validate all references and freeze the catalog.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if a type or symbol refers to an id that was never created
    /// - `InvalidArgument` if a member has no candidate type, or a chain of
    ///   typedefs, arrays and pointers is longer than [`MAX_TYPE_REF_DEPTH`]
    pub fn build(mut self) -> InsightResult<TypeCatalog>
    {
        let count = self.types.len();
        let known = |id: TypeId| id.0 >= 1 && (id.0 as usize) <= count;

        for descriptor in &self.types {
            if let Some(member) = descriptor.members().iter().find(|m| m.candidates().is_empty()) {
                return Err(InsightError::InvalidArgument(format!(
                    "member '{}' of '{}' has no candidate type",
                    member.name(),
                    descriptor.name()
                )));
            }
            if let Some(missing) = descriptor.referenced_ids().into_iter().find(|id| !known(*id)) {
                return Err(InsightError::not_found("type", missing));
            }
        }
        if let Some(symbol) = self.symbols.iter().find(|s| !known(s.type_id())) {
            return Err(InsightError::not_found("type", symbol.type_id()));
        }

        let mut derived = Vec::with_capacity(count);
        for descriptor in &self.types {
            let id = descriptor.id();
            derived.push((derived_size(&self.types, id, 0)?, derived_name(&self.types, id, 0)?));
        }
        for (descriptor, (size, name)) in self.types.iter_mut().zip(derived) {
            descriptor.set_size(size);
            descriptor.set_name(name);
        }

        debug!(
            types = self.types.len(),
            symbols = self.symbols.len(),
            arch = %self.architecture,
            "Built type catalog"
        );
        Ok(TypeCatalog::from_parts(self.architecture, self.types, self.symbols))
    }
}

fn lookup(types: &[TypeDescriptor], id: TypeId, depth: usize) -> InsightResult<&TypeDescriptor>
{
    if depth > MAX_TYPE_REF_DEPTH {
        return Err(InsightError::InvalidArgument(format!(
            "type {id} refers to itself through more than {MAX_TYPE_REF_DEPTH} levels"
        )));
    }
    types
        .get((id.0 as usize).wrapping_sub(1))
        .ok_or_else(|| InsightError::not_found("type", id))
}

fn derived_size(types: &[TypeDescriptor], id: TypeId, depth: usize) -> InsightResult<u64>
{
    let descriptor = lookup(types, id, depth)?;
    match descriptor.kind() {
        TypeKind::Array { element, length } => {
            let element_size = derived_size(types, *element, depth + 1)?;
            Ok(element_size.saturating_mul(length.unwrap_or(0)))
        }
        TypeKind::Typedef { target } => derived_size(types, *target, depth + 1),
        _ => Ok(descriptor.size()),
    }
}

fn derived_name(types: &[TypeDescriptor], id: TypeId, depth: usize) -> InsightResult<String>
{
    let descriptor = lookup(types, id, depth)?;
    match descriptor.kind() {
        TypeKind::Pointer { target: None } => Ok("void *".to_string()),
        TypeKind::Pointer { target: Some(target) } => Ok(format!("{} *", derived_name(types, *target, depth + 1)?)),
        TypeKind::Array { element, length } => {
            let element = derived_name(types, *element, depth + 1)?;
            Ok(match length {
                Some(length) => format!("{element}[{length}]"),
                None => format!("{element}[]"),
            })
        }
        _ => Ok(descriptor.name().to_string()),
    }
}
