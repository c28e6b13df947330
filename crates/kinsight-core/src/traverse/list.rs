//! # Intrusive Lists
//!
//! Walkers for kernel-style intrusive linked lists, where a small link struct
//! is embedded in every payload object and the payload is recovered by
//! subtracting the link's offset from the link address.
//!
//! - [`entries`] / [`entries_along`]: circular doubly-linked `list_head`
//!   lists, terminated by the head sentinel
//! - [`hlist_entries`]: NULL-terminated singly-linked `hlist` lists
//! - [`hlist_nulls_entries`]: `hlist_nulls` lists, terminated by a pointer
//!   with the lowest bit set
//!
//! All walkers are iterators of `InsightResult<TypedInstance>`. A read
//! failure or a broken link is yielded as an error and ends the walk. A
//! walk also ends with an error after `EngineConfig::max_list_entries`
//! entries or when a link is visited twice.

use std::collections::HashSet;

use tracing::warn;

use crate::catalog::{Member, TypeDescriptor, TypeId};
use crate::error::{Inconsistency, InsightError, InsightResult};
use crate::instance::TypedInstance;
use crate::types::Address;

/// Follow `path` from an instance at address zero, using declared member
/// types; the resulting address is the path's offset.
fn at_offset<'i>(owner: TypedInstance<'i>, path: &[&str]) -> InsightResult<TypedInstance<'i>>
{
    let mut current = owner.with_address(Address::ZERO);
    for name in path {
        current = current.member_candidate(*name, 0)?;
    }
    Ok(current)
}

/// What ends a list walk normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator
{
    /// Back at the head sentinel
    Sentinel(Address),
    /// A NULL `next`
    Null,
    /// A `next` with the lowest bit set
    NullsMarker,
}

impl Terminator
{
    fn ends_at(self, next: Address) -> bool
    {
        match self {
            Terminator::Sentinel(head) => next == head,
            Terminator::Null => next.is_null(),
            Terminator::NullsMarker => next.value() & 1 == 1,
        }
    }
}

/// Iterator over the payload objects of an intrusive list
#[derive(Debug)]
pub struct ListEntries<'i>
{
    /// Its address is the current link (the head before the first step)
    cursor: TypedInstance<'i>,
    /// Offset of the forward pointer within the current link
    next_offset: u64,
    /// Offset of the forward pointer within every link after the head
    node_next_offset: u64,
    owner: &'i TypeDescriptor,
    link_offset: u64,
    terminator: Terminator,
    visited: HashSet<Address>,
    yielded: usize,
    max_entries: usize,
    finished: bool,
}

impl<'i> ListEntries<'i>
{
    fn new(head: TypedInstance<'i>, owner: &'i TypeDescriptor, link_offset: u64, terminator: Terminator) -> Self
    {
        let max_entries = head.inspector().config().max_list_entries;
        Self {
            cursor: head,
            next_offset: 0,
            node_next_offset: 0,
            owner,
            link_offset,
            terminator,
            visited: HashSet::new(),
            yielded: 0,
            max_entries,
            finished: false,
        }
    }

    fn with_next_offsets(mut self, head: u64, node: u64) -> Self
    {
        self.next_offset = head;
        self.node_next_offset = node;
        self
    }

    /// Number of entries yielded so far
    #[must_use]
    pub fn yielded(&self) -> usize
    {
        self.yielded
    }

    fn abort(&mut self, address: Address, detail: String) -> Option<InsightResult<TypedInstance<'i>>>
    {
        self.finished = true;
        let inconsistency = Inconsistency::new(address, detail);
        warn!(%inconsistency, owner = self.owner.name(), "List walk aborted");
        Some(Err(inconsistency.into()))
    }
}

impl<'i> Iterator for ListEntries<'i>
{
    type Item = InsightResult<TypedInstance<'i>>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.finished {
            return None;
        }

        let slot = self.cursor.address() + self.next_offset;
        let next = match self.cursor.inspector().read_pointer(self.cursor.image(), slot) {
            Ok(next) => next,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };

        if self.terminator.ends_at(next) {
            self.finished = true;
            return None;
        }
        if next.is_null() {
            return self.abort(slot, "NULL link in list".to_string());
        }
        if !self.visited.insert(next) {
            return self.abort(next, "link visited twice".to_string());
        }
        if self.yielded >= self.max_entries {
            return self.abort(next, format!("list longer than {} entries", self.max_entries));
        }

        self.yielded += 1;
        self.next_offset = self.node_next_offset;
        self.cursor = self.cursor.with_address(next);
        Some(Ok(self.cursor.retyped(self.owner).with_address(next - self.link_offset)))
    }
}

/// Payload objects of a `list_head` list
///
/// `head` is the list head (the sentinel, never yielded). Each entry is an
/// instance of `owner` whose embedded link is reached through `link_path`,
/// e.g. `["tasks"]` for `task_struct.tasks`. The link type must have a
/// `next` member.
///
/// ## Errors
///
/// `NotFound` if `owner` or a member of `link_path` does not exist.
pub fn entries<'i>(head: TypedInstance<'i>, owner: TypeId, link_path: &[&str]) -> InsightResult<ListEntries<'i>>
{
    let owner = head.inspector().catalog().type_by_id(owner)?;
    let link = at_offset(head.retyped(owner), link_path)?;
    let next_offset = link.member_offset("next")?;
    let walker = ListEntries::new(head, owner, link.address().value(), Terminator::Sentinel(head.address()));
    Ok(walker.with_next_offsets(next_offset, next_offset))
}

/// Objects on the same list as `start`
///
/// The list head is `start`'s own link at `path`, so `start` itself is not
/// yielded: walking `init_task` along `["tasks"]` yields every other task.
pub fn entries_along<'i>(start: TypedInstance<'i>, path: &[&str]) -> InsightResult<ListEntries<'i>>
{
    let head = start.member_path(path)?;
    entries(head, start.type_id(), path)
}

fn singly_linked<'i>(
    head: TypedInstance<'i>,
    owner: TypeId,
    link_path: &[&str],
    terminator: Terminator,
) -> InsightResult<ListEntries<'i>>
{
    let owner = head.inspector().catalog().type_by_id(owner)?;
    let Some((last, node_path)) = link_path.split_last() else {
        return Err(InsightError::InvalidArgument("empty link path".to_string()));
    };

    // Only the forward direction exists: the path must end at member 0 of the link node
    let node = at_offset(head.retyped(owner), node_path)?;
    let forward = node.resolved()?.find_member(last);
    let Some((0, next_member)) = forward else {
        return Err(InsightError::InvalidArgument(format!(
            "'{}' is not the forward link of '{}'",
            link_path.join("."),
            node.type_name()
        )));
    };

    let first = head
        .resolved()?
        .members()
        .first()
        .map(Member::offset)
        .ok_or_else(|| InsightError::InvalidArgument(format!("list head '{}' has no members", head.type_name())))?;

    let walker = ListEntries::new(head, owner, node.address().value(), terminator);
    Ok(walker.with_next_offsets(first, next_member.offset()))
}

/// Payload objects of an `hlist` (NULL-terminated) list
///
/// `head` is the `hlist_head`, whose first member points to the first node.
/// `link_path` leads from `owner` to the forward pointer of the embedded
/// node, e.g. `["pid_links", "next"]`.
///
/// ## Errors
///
/// `InvalidArgument` if the last element of `link_path` is not member 0 of
/// its node (hlists can only be walked forward).
pub fn hlist_entries<'i>(head: TypedInstance<'i>, owner: TypeId, link_path: &[&str]) -> InsightResult<ListEntries<'i>>
{
    singly_linked(head, owner, link_path, Terminator::Null)
}

/// Payload objects of an `hlist_nulls` list, which ends at a pointer with bit 0 set.
pub fn hlist_nulls_entries<'i>(
    head: TypedInstance<'i>,
    owner: TypeId,
    link_path: &[&str],
) -> InsightResult<ListEntries<'i>>
{
    singly_linked(head, owner, link_path, Terminator::NullsMarker)
}
