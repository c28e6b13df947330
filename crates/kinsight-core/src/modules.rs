//! # Loaded Modules
//!
//! Section load addresses of loaded kernel modules, read from the snapshot.
//!
//! The kernel keeps every loaded `struct module` on the `modules` list. Each
//! module's `sect_attrs` holds `nsections` entries of `attrs`, and each entry
//! pairs a section `name` with its load `address`. [`ModuleSections`] walks
//! that list once and answers [`SectionLocator`] queries from the result, so
//! section-relative symbols can be relocated without outside help.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kinsight_core::prelude::*;
//!
//! fn proc_ops(inspector: &Inspector) -> InsightResult<TypedInstance<'_>>
//! {
//!     let sections = ModuleSections::load(inspector, 0)?;
//!     inspector.symbol_instance_with("proc_sops", &sections)
//! }
//! ```

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::catalog::{SectionLocator, TypeKind};
use crate::error::{InsightError, InsightResult};
use crate::inspector::Inspector;
use crate::instance::TypedInstance;
use crate::traverse::list;
use crate::types::Address;

/// Global `list_head` of loaded modules
pub const MODULES_SYMBOL: &str = "modules";
/// Upper bound on the length of module and section names
pub const MAX_NAME_LENGTH: u64 = 256;
/// Upper bound on the sections read per module
pub const MAX_SECTIONS: u64 = 1024;

/// Section addresses of every module loaded in one image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSections
{
    sections: HashMap<(String, String), Address>,
}

impl ModuleSections
{
    /// Walk the module list of `image`.
    ///
    /// Modules whose name or section table cannot be read are logged and
    /// skipped, and so are single unreadable sections.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if the catalog has no `modules` symbol, no `module` type,
    ///   or `module` lacks a `list` member
    /// - `InvalidImage` if `image` is out of range
    pub fn load(inspector: &Inspector, image: usize) -> InsightResult<Self>
    {
        let head = inspector.symbol_instance(MODULES_SYMBOL)?.in_image(image)?;
        let owner = inspector.catalog().type_by_name("module")?.id();

        let mut sections = HashMap::new();
        let mut modules = 0usize;
        for entry in list::entries(head, owner, &["list"])? {
            let module = match entry {
                Ok(module) => module,
                Err(err) => {
                    warn!(error = %err, "Module list walk ended early");
                    break;
                }
            };
            match read_module(&module, &mut sections) {
                Ok(()) => modules += 1,
                Err(err) => warn!(module = %module, error = %err, "Skipping unreadable module"),
            }
        }
        debug!(image, modules, sections = sections.len(), "Loaded module sections");
        Ok(Self { sections })
    }

    /// Names of the modules with at least one known section, sorted
    #[must_use]
    pub fn modules(&self) -> Vec<&str>
    {
        let mut names: Vec<&str> = self.sections.keys().map(|(unit, _)| unit.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.sections.is_empty()
    }
}

impl SectionLocator for ModuleSections
{
    fn section_address(&self, unit: &str, section: &str) -> Option<Address>
    {
        self.sections.section_address(unit, section)
    }
}

fn read_module(module: &TypedInstance<'_>, sections: &mut HashMap<(String, String), Address>) -> InsightResult<()>
{
    let name = c_string(&module.member("name")?)?;
    let attrs = module.member("sect_attrs")?;
    if attrs.pointer_value()?.is_null() {
        return Ok(());
    }
    let attrs = attrs.dereference()?;
    let count = attrs.member("nsections")?.value()?.as_u64().unwrap_or(0);
    if count > MAX_SECTIONS {
        warn!(module = %name, count, max = MAX_SECTIONS, "Implausible section count, truncating");
    }

    let table = attrs.member("attrs")?;
    for index in 0..count.min(MAX_SECTIONS) {
        let section = table.array_element(index).and_then(|attr| {
            let section = c_string(&attr.member("name")?)?;
            let address = attr.member("address")?.value()?.as_u64().unwrap_or(0);
            Ok((section, Address::new(address)))
        });
        match section {
            Ok((section, address)) => {
                sections.insert((name.clone(), section), address);
            }
            Err(err) => warn!(module = %name, index, error = %err, "Skipping unreadable section"),
        }
    }
    Ok(())
}

/// NUL-terminated string held in a `char` array or behind a `char *`
fn c_string(field: &TypedInstance<'_>) -> InsightResult<String>
{
    let (start, limit) = match field.resolved()?.kind() {
        TypeKind::Array { length, .. } => (field.address(), length.unwrap_or(MAX_NAME_LENGTH).min(MAX_NAME_LENGTH)),
        TypeKind::Pointer { .. } => {
            let pointer = field.pointer_value()?;
            if pointer.is_null() {
                return Err(InsightError::NullPointer { address: field.address() });
            }
            (pointer, MAX_NAME_LENGTH)
        }
        _ => return Err(InsightError::NotAPointer(field.type_name().to_string())),
    };

    let inspector = field.inspector();
    let mut bytes = Vec::new();
    for offset in 0..limit {
        let byte = inspector.read_unsigned(field.image(), start + offset, 1)?;
        if byte == 0 {
            break;
        }
        bytes.push(u8::try_from(byte).unwrap_or(b'?'));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
