//! Global variables and their locations.

use std::collections::HashMap;
use std::fmt;

use super::descriptor::TypeId;
use crate::types::Address;

/// Stable numeric identifier of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

/// Where a symbol lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolLocation
{
    /// Fixed address in the base image
    Absolute(Address),
    /// Offset into a section of a dynamically loaded unit (a kernel module)
    ///
    /// The section's load address is only known at runtime and must be
    /// supplied by a [`SectionLocator`].
    SectionRelative
    {
        unit: String,
        section: String,
        offset: u64,
    },
}

/// A global variable known to the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol
{
    id: SymbolId,
    name: String,
    type_id: TypeId,
    location: SymbolLocation,
}

impl Symbol
{
    pub(crate) fn new(id: SymbolId, name: String, type_id: TypeId, location: SymbolLocation) -> Self
    {
        Self {
            id,
            name,
            type_id,
            location,
        }
    }

    #[must_use]
    pub fn id(&self) -> SymbolId
    {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Declared type of the variable
    #[must_use]
    pub fn type_id(&self) -> TypeId
    {
        self.type_id
    }

    #[must_use]
    pub fn location(&self) -> &SymbolLocation
    {
        &self.location
    }

    /// Name of the loaded unit the symbol belongs to, if any.
    #[must_use]
    pub fn unit(&self) -> Option<&str>
    {
        match &self.location {
            SymbolLocation::Absolute(_) => None,
            SymbolLocation::SectionRelative { unit, .. } => Some(unit),
        }
    }

    /// Address of the symbol, relocating section-relative symbols through `locator`
    ///
    /// Returns `None` when the locator does not know the symbol's section.
    pub fn address(&self, locator: &dyn SectionLocator) -> Option<Address>
    {
        match &self.location {
            SymbolLocation::Absolute(address) => Some(*address),
            SymbolLocation::SectionRelative { unit, section, offset } => {
                locator.section_address(unit, section).map(|base| base + *offset)
            }
        }
    }
}

/// Supplies runtime load addresses of sections of dynamically loaded units
pub trait SectionLocator
{
    /// Load address of `section` in `unit`, or `None` if the unit is not loaded.
    fn section_address(&self, unit: &str, section: &str) -> Option<Address>;
}

/// Locator for a system with no loaded units
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSections;

impl SectionLocator for NoSections
{
    fn section_address(&self, _unit: &str, _section: &str) -> Option<Address>
    {
        None
    }
}

impl SectionLocator for HashMap<(String, String), Address>
{
    fn section_address(&self, unit: &str, section: &str) -> Option<Address>
    {
        self.get(&(unit.to_string(), section.to_string())).copied()
    }
}
