//! # Per-CPU Variables
//!
//! On SMP kernels every per-CPU variable is a template; the copy of CPU `n`
//! lives at the template address plus entry `n` of the per-CPU offset table
//! (`__per_cpu_offset`). Kernels built without SMP have no table and the
//! template is the variable itself.
//!
//! The number of CPUs is read from `nr_cpu_ids` and defaults to 1 when that
//! symbol is absent. Both symbol names come from the engine configuration.

use tracing::{debug, warn};

use crate::error::{InsightError, InsightResult};
use crate::inspector::Inspector;
use crate::instance::TypedInstance;
use crate::types::Address;

/// Upper bound on the number of CPUs read from a snapshot
pub const MAX_CPUS: u64 = 8192;

/// The offset table: its address and the number of usable entries.
fn table(inspector: &Inspector, image: usize) -> InsightResult<Option<(Address, u64)>>
{
    let config = inspector.config();
    let catalog = inspector.catalog();
    if !catalog.symbol_exists(&config.per_cpu_offset_symbol) {
        return Ok(None);
    }
    let table = inspector
        .symbol_instance(&config.per_cpu_offset_symbol)?
        .in_image(image)?;

    let cpus = if catalog.symbol_exists(&config.cpu_count_symbol) {
        let count = inspector.symbol_instance(&config.cpu_count_symbol)?.in_image(image)?;
        match count.value() {
            Ok(value) => value.as_u64().unwrap_or(1),
            Err(err) => {
                warn!(symbol = %config.cpu_count_symbol, error = %err, "Cannot read CPU count, assuming 1");
                1
            }
        }
    } else {
        1
    };

    let declared = table.array_length().ok().flatten().unwrap_or(u64::MAX);
    Ok(Some((table.address(), cpus.min(declared).min(MAX_CPUS))))
}

fn entry_address(inspector: &Inspector, table: Address, cpu: u64) -> Address
{
    let pointer_size = inspector.catalog().pointer_size() as u64;
    table + cpu.wrapping_mul(pointer_size)
}

/// Offsets of all CPUs, `None` for entries that cannot be read
///
/// Empty when the kernel has no per-CPU offset table.
pub fn offsets(inspector: &Inspector, image: usize) -> InsightResult<Vec<Option<u64>>>
{
    let Some((table, cpus)) = table(inspector, image)? else {
        return Ok(Vec::new());
    };
    Ok((0..cpus)
        .map(|cpu| {
            inspector
                .read_pointer(image, entry_address(inspector, table, cpu))
                .ok()
                .map(Address::value)
        })
        .collect())
}

/// The copy of a per-CPU variable that belongs to CPU 0
///
/// Without an offset table, or with an empty one, `var` is returned
/// unchanged.
///
/// ## Errors
///
/// `Unreadable` if the table exists but its first entry cannot be read.
pub fn resolve<'i>(var: TypedInstance<'i>) -> InsightResult<TypedInstance<'i>>
{
    match table(var.inspector(), var.image())? {
        Some((_, 0)) | None => Ok(var),
        Some(_) => resolve_for_cpu(var, 0),
    }
}

/// The copy of a per-CPU variable that belongs to `cpu`
///
/// ## Errors
///
/// - `NotFound` if `cpu` is not below the number of CPUs (a kernel without
///   offset table has only CPU 0)
/// - `Unreadable` if the table entry cannot be read
pub fn resolve_for_cpu<'i>(var: TypedInstance<'i>, cpu: u64) -> InsightResult<TypedInstance<'i>>
{
    let inspector = var.inspector();
    let Some((table, cpus)) = table(inspector, var.image())? else {
        return if cpu == 0 {
            Ok(var)
        } else {
            Err(InsightError::not_found("cpu", cpu))
        };
    };
    if cpu >= cpus {
        return Err(InsightError::not_found("cpu", format!("{cpu} (of {cpus})")));
    }

    let offset = inspector.read_pointer(var.image(), entry_address(inspector, table, cpu))?;
    let resolved = var.with_address(var.address() + offset.value());
    debug!(
        variable = %var.address(),
        cpu,
        offset = %offset,
        resolved = %resolved.address(),
        "Resolved per-CPU variable"
    );
    Ok(resolved)
}
