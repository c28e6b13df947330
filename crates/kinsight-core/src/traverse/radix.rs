//! # Radix Trees
//!
//! Walker for kernel radix trees (`struct radix_tree_root` /
//! `struct radix_tree_node`, as used by page caches and id allocators).
//!
//! ## Layout
//!
//! - the root has `height` and `rnode` members; height 0 means an empty
//!   tree, a height above `EngineConfig::radix_max_height` an invalid one
//! - `rnode` may carry the indirect flag in its low bits, which is cleared
//!   before the node is used
//! - a node has `height`, `count` and a `slots` pointer array; nodes at
//!   height 1 are leaves whose slots point at payload objects, higher nodes
//!   point at further nodes
//!
//! Corrupted trees are expected. Every violated invariant is recorded as an
//! [`Inconsistency`], logged, and the walk goes on with whatever is left.
//! Child heights must drop by exactly one per level and no node is expanded
//! twice, so slots pointing back up the tree cannot stall a walk.

use std::collections::HashSet;

use tracing::warn;

use crate::catalog::{TypeDescriptor, TypeId};
use crate::error::{Inconsistency, InsightResult};
use crate::instance::TypedInstance;

/// Result of a full tree walk
#[derive(Debug, Default)]
pub struct RadixWalk<'i>
{
    /// Leaf objects in slot order
    pub items: Vec<TypedInstance<'i>>,
    /// Invariant violations found on the way
    pub diagnostics: Vec<Inconsistency>,
}

struct NodeHeader<'i>
{
    height: u64,
    count: u64,
    slots: TypedInstance<'i>,
    slot_count: u64,
}

fn unsigned_member(instance: &TypedInstance<'_>, name: &str) -> InsightResult<u64>
{
    let value = instance.member(name)?.value()?;
    Ok(value.as_u64().unwrap_or(u64::MAX))
}

fn read_header<'i>(node: &TypedInstance<'i>) -> InsightResult<NodeHeader<'i>>
{
    let slots = node.member("slots")?;
    Ok(NodeHeader {
        height: unsigned_member(node, "height")?,
        count: unsigned_member(node, "count")?,
        slot_count: slots.array_length()?.unwrap_or(0),
        slots,
    })
}

fn report(diagnostics: &mut Vec<Inconsistency>, inconsistency: Inconsistency)
{
    warn!(%inconsistency, "Inconsistent radix tree");
    diagnostics.push(inconsistency);
}

/// Whether a node header violates the height or count bounds.
fn is_malformed(node: &TypedInstance<'_>, header: &NodeHeader<'_>) -> bool
{
    let max_height = u64::from(node.inspector().config().radix_max_height);
    header.height > max_height || header.count > header.slot_count
}

/// The top node of a tree, or `None` for an empty or invalid tree
///
/// `root` is a `radix_tree_root`. A root height above the maximum, or a node
/// whose header is readable but violates the height or count bounds, is
/// reported and treated as absent.
///
/// ## Errors
///
/// `NotFound` if the root lacks `height` or `rnode`, `Unreadable` if they
/// cannot be read.
pub fn root_node<'i>(
    root: TypedInstance<'i>,
    diagnostics: &mut Vec<Inconsistency>,
) -> InsightResult<Option<TypedInstance<'i>>>
{
    let config = root.inspector().config();
    let height = unsigned_member(&root, "height")?;
    if height == 0 {
        return Ok(None);
    }
    if height > u64::from(config.radix_max_height) {
        report(
            diagnostics,
            Inconsistency::new(
                root.address(),
                format!("radix_tree_root with height {height}, maximum is {}", config.radix_max_height),
            ),
        );
        return Ok(None);
    }

    let rnode = root.member("rnode")?;
    let pointer = rnode.pointer_value()?;
    if pointer.is_null() {
        return Ok(None);
    }
    let cleared = pointer.with_low(pointer.low() & !config.radix_indirect_flag);
    let node = rnode.dereference()?.with_address(cleared);

    if node.is_accessible() {
        if let Ok(header) = read_header(&node) {
            if is_malformed(&node, &header) {
                report(
                    diagnostics,
                    Inconsistency::new(
                        node.address(),
                        format!(
                            "radix_tree_node with height {} and count {} below root at {}",
                            header.height,
                            header.count,
                            root.address()
                        ),
                    ),
                );
                return Ok(None);
            }
        }
    }
    Ok(Some(node))
}

/// Children of a node: further nodes for interior nodes, `leaf` objects for leaves
///
/// Unreadable and NULL slots are skipped. Slots whose value still carries the
/// indirect flag are counted but skipped. Interior children with malformed
/// headers, or whose height is not one below the node's, are reported and
/// skipped. A mismatch between the non-NULL slots
/// found and the node's `count` is reported. A node with height 0 yields
/// nothing and is reported.
pub fn node_slots<'i>(
    node: TypedInstance<'i>,
    leaf: &'i TypeDescriptor,
    diagnostics: &mut Vec<Inconsistency>,
) -> InsightResult<Vec<TypedInstance<'i>>>
{
    let header = read_header(&node)?;
    let (target, interior) = match header.height {
        0 => {
            report(diagnostics, Inconsistency::new(node.address(), "radix_tree_node with height 0"));
            return Ok(Vec::new());
        }
        1 => (leaf, false),
        _ => (node.type_descriptor(), true),
    };

    let flag = node.inspector().config().radix_indirect_flag;
    let mut children = Vec::new();
    let mut non_null = 0u64;
    for index in 0..header.slot_count {
        let Ok(pointer) = header.slots.array_element(index).and_then(|slot| slot.pointer_value()) else {
            continue;
        };
        if pointer.is_null() {
            continue;
        }
        non_null += 1;
        if pointer.low() & flag != 0 {
            continue;
        }

        let child = node.retyped(target).with_address(pointer);
        if interior {
            if let Ok(child_header) = read_header(&child) {
                if is_malformed(&child, &child_header) || child_header.height != header.height - 1 {
                    report(
                        diagnostics,
                        Inconsistency::new(
                            child.address(),
                            format!(
                                "radix_tree_node in slot {index} with height {} and count {}, parent at {}",
                                child_header.height,
                                child_header.count,
                                node.address()
                            ),
                        ),
                    );
                    continue;
                }
            }
        }
        children.push(child);
    }

    if non_null != header.count {
        report(
            diagnostics,
            Inconsistency::new(
                node.address(),
                format!("{non_null} non-null slots in radix_tree_node, but count is {}", header.count),
            ),
        );
    }
    Ok(children)
}

/// Collect every leaf object of the tree below `root`
///
/// `leaf_type` defaults to the type named by `EngineConfig::radix_leaf_type`.
/// Nodes that cannot be read, or that are reached a second time, are reported
/// and skipped; the descent never goes deeper than
/// `EngineConfig::radix_max_height` levels.
///
/// ## Errors
///
/// Only failures at the root itself (missing members, unreadable root,
/// unknown leaf type) are returned as errors.
pub fn walk<'i>(root: TypedInstance<'i>, leaf_type: Option<TypeId>) -> InsightResult<RadixWalk<'i>>
{
    let inspector = root.inspector();
    let catalog = inspector.catalog();
    let leaf = match leaf_type {
        Some(id) => catalog.type_by_id(id)?,
        None => catalog.type_by_name(&inspector.config().radix_leaf_type)?,
    };
    let max_depth = inspector.config().radix_max_height;

    let mut walk = RadixWalk::default();
    let Some(top) = root_node(root, &mut walk.diagnostics)? else {
        return Ok(walk);
    };

    let mut visited = HashSet::new();
    let mut pending = vec![(top, 1u32)];
    while let Some((node, depth)) = pending.pop() {
        if depth > max_depth {
            report(
                &mut walk.diagnostics,
                Inconsistency::new(node.address(), format!("radix tree deeper than {max_depth} levels")),
            );
            continue;
        }
        if !visited.insert(node.address()) {
            report(
                &mut walk.diagnostics,
                Inconsistency::new(node.address(), "radix_tree_node reached more than once"),
            );
            continue;
        }
        let height = match unsigned_member(&node, "height") {
            Ok(height) => height,
            Err(err) => {
                report(&mut walk.diagnostics, Inconsistency::new(node.address(), err.to_string()));
                continue;
            }
        };
        let children = match node_slots(node, leaf, &mut walk.diagnostics) {
            Ok(children) => children,
            Err(err) => {
                report(&mut walk.diagnostics, Inconsistency::new(node.address(), err.to_string()));
                continue;
            }
        };
        if height == 1 {
            walk.items.extend(children);
        } else {
            // Reversed so that the stack pops children in slot order
            pending.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }
    }
    Ok(walk)
}
