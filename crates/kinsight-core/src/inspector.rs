//! # Inspector
//!
//! Entry point of the engine. An [`Inspector`] owns the type catalog, the
//! memory images and the configuration, and hands out [`TypedInstance`]s that
//! borrow from it.
//!
//! ## Usage
//!
//! ```rust
//! use kinsight_core::prelude::*;
//!
//! fn main() -> Result<(), InsightError>
//! {
//!     let mut builder = CatalogBuilder::new(Architecture::X86_64);
//!     let int = builder.base("int", 4, BaseEncoding::Signed);
//!     builder.symbol("jiffies", int, Address::new(0x1000));
//!     let catalog = builder.build()?;
//!
//!     let space = MemorySpace::new()
//!         .with_image(SnapshotImage::new("vmcore").with_region(Address::new(0x1000), 42i32.to_le_bytes().to_vec()));
//!     let inspector = Inspector::new(catalog, space);
//!
//!     let jiffies = inspector.symbol_instance("jiffies")?;
//!     assert_eq!(jiffies.value()?.as_i64(), Some(42));
//!     Ok(())
//! }
//! ```

use tracing::debug;

use crate::catalog::{NoSections, SectionLocator, Symbol, SymbolId, SymbolLocation, TypeCatalog, TypeDescriptor, TypeId};
use crate::config::EngineConfig;
use crate::error::{InsightError, InsightResult};
use crate::instance::TypedInstance;
use crate::memory::MemorySpace;
use crate::types::Address;

/// Owner of the catalog, the memory images and the engine configuration
///
/// The inspector is immutable once created. It is `Send + Sync`, so several
/// threads may inspect the same snapshot as long as each keeps its own
/// instances.
#[derive(Debug)]
pub struct Inspector
{
    catalog: TypeCatalog,
    space: MemorySpace,
    config: EngineConfig,
}

impl Inspector
{
    /// Create an inspector with the default configuration.
    #[must_use]
    pub fn new(catalog: TypeCatalog, space: MemorySpace) -> Self
    {
        Self::with_config(catalog, space, EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(catalog: TypeCatalog, space: MemorySpace, config: EngineConfig) -> Self
    {
        debug!(
            images = space.image_count(),
            types = catalog.type_count(),
            resolution = ?config.resolution,
            "Created inspector"
        );
        Self { catalog, space, config }
    }

    #[must_use]
    pub fn catalog(&self) -> &TypeCatalog
    {
        &self.catalog
    }

    #[must_use]
    pub fn space(&self) -> &MemorySpace
    {
        &self.space
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig
    {
        &self.config
    }

    /// Names of the loaded images, in index order
    #[must_use]
    pub fn images(&self) -> Vec<&str>
    {
        self.space.image_names()
    }

    /// Read raw bytes from an image.
    pub fn read(&self, image: usize, address: Address, length: usize) -> InsightResult<Vec<u8>>
    {
        self.space.read(image, address, length)
    }

    /// Read a little-endian unsigned integer of `size` bytes.
    pub fn read_unsigned(&self, image: usize, address: Address, size: usize) -> InsightResult<u64>
    {
        self.space.read_unsigned(image, address, size)
    }

    /// Read a pointer of the target's width.
    pub fn read_pointer(&self, image: usize, address: Address) -> InsightResult<Address>
    {
        self.read_unsigned(image, address, self.catalog.pointer_size())
            .map(Address::new)
    }

    /// Bind `address` in image 0 to a type. Never reads memory.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown type id, `InvalidImage` if no image is loaded.
    pub fn instance(&self, address: Address, type_id: TypeId) -> InsightResult<TypedInstance<'_>>
    {
        self.instance_in(0, address, type_id)
    }

    /// Bind `address` in a specific image to a type. Never reads memory.
    pub fn instance_in(&self, image: usize, address: Address, type_id: TypeId) -> InsightResult<TypedInstance<'_>>
    {
        self.space.check_image(image)?;
        let ty = self.catalog.type_by_id(type_id)?;
        Ok(self.bind(image, address, ty))
    }

    /// Bind `address` in image 0 to the preferred type of that name.
    pub fn instance_by_name(&self, address: Address, type_name: &str) -> InsightResult<TypedInstance<'_>>
    {
        let id = self.catalog.type_by_name(type_name)?.id();
        self.instance(address, id)
    }

    pub(crate) fn bind<'i>(&'i self, image: usize, address: Address, ty: &'i TypeDescriptor) -> TypedInstance<'i>
    {
        TypedInstance::new(self, image, address, ty)
    }

    /// Instance of a global variable of the base image, in image 0.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if there is no such symbol
    /// - `UnresolvedSymbol` if it belongs to a loaded unit; use
    ///   [`symbol_instance_with`](Self::symbol_instance_with) for those
    pub fn symbol_instance(&self, name: &str) -> InsightResult<TypedInstance<'_>>
    {
        self.symbol_instance_with(name, &NoSections)
    }

    pub fn symbol_instance_by_id(&self, id: SymbolId) -> InsightResult<TypedInstance<'_>>
    {
        let symbol = self.catalog.symbol_by_id(id)?;
        let address = self.symbol_address(symbol, &NoSections)?;
        self.instance(address, symbol.type_id())
    }

    /// Instance of any global variable, relocating loaded-unit symbols through `locator`.
    pub fn symbol_instance_with(&self, name: &str, locator: &dyn SectionLocator) -> InsightResult<TypedInstance<'_>>
    {
        let symbol = self.catalog.symbol_by_name(name)?;
        let address = self.symbol_address(symbol, locator)?;
        self.instance(address, symbol.type_id())
    }

    /// Runtime address of a symbol.
    ///
    /// ## Errors
    ///
    /// `UnresolvedSymbol` if the symbol is section-relative and `locator`
    /// does not know its section.
    pub fn symbol_address(&self, symbol: &Symbol, locator: &dyn SectionLocator) -> InsightResult<Address>
    {
        symbol.address(locator).ok_or_else(|| match symbol.location() {
            SymbolLocation::SectionRelative { unit, section, .. } => {
                debug!(symbol = symbol.name(), unit, section, "Section of loaded unit is unknown");
                InsightError::UnresolvedSymbol(symbol.name().to_string())
            }
            SymbolLocation::Absolute(_) => InsightError::UnresolvedSymbol(symbol.name().to_string()),
        })
    }
}
