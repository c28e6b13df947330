//! Byte equality and member-wise differences between instances.

use std::collections::HashSet;

use super::TypedInstance;
use crate::catalog::{MemberRef, TypeId};
use crate::error::{InsightError, InsightResult};
use crate::types::Address;

type Visited = HashSet<(Address, TypeId)>;

impl TypedInstance<'_>
{
    /// Whether both instances hold the same bytes
    ///
    /// Instances of different size are never equal, and neither are a
    /// readable and an unreadable one. If neither extent can be read, the
    /// instances are equal only if they are at the same address.
    #[must_use]
    pub fn equals(&self, other: &TypedInstance<'_>) -> bool
    {
        if self.size() != other.size() {
            return false;
        }
        match (self.raw_bytes(), other.raw_bytes()) {
            (Ok(mine), Ok(theirs)) => mine == theirs,
            (Err(_), Err(_)) => self.address() == other.address(),
            _ => false,
        }
    }

    /// Paths of the members whose values differ between two instances
    ///
    /// Both instances must be structs or unions with the same layout. Every
    /// non-struct member is compared with [`equals`](Self::equals), using its
    /// declared type, so pointers are compared by value and never followed.
    /// Nested structs are skipped unless `recursive` is set, in which case
    /// their members are reported with a dotted path (`stats.ticks`). A
    /// member that cannot be built on either side counts as different.
    ///
    /// ## Errors
    ///
    /// `Incomparable` if the instances are not structs or unions of the same layout.
    pub fn try_differences(&self, other: &TypedInstance<'_>, recursive: bool) -> InsightResult<Vec<String>>
    {
        let mine = self.resolved()?;
        let theirs = other.resolved()?;
        if !(mine.is_struct_or_union() && mine.same_layout(theirs)) {
            return Err(InsightError::Incomparable {
                left: self.type_name().to_string(),
                right: other.type_name().to_string(),
            });
        }

        let mut result = Vec::new();
        let mut visited = Visited::new();
        collect_differences(self, other, "", recursive, &mut visited, &mut result);
        Ok(result)
    }

    /// Like [`try_differences`](Self::try_differences), but reports
    /// incomparable instances as a single empty path.
    #[must_use]
    pub fn differences(&self, other: &TypedInstance<'_>, recursive: bool) -> Vec<String>
    {
        self.try_differences(other, recursive)
            .unwrap_or_else(|_| vec![String::new()])
    }
}

fn dotted(parent: &str, name: &str) -> String
{
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn collect_differences(
    left: &TypedInstance<'_>,
    right: &TypedInstance<'_>,
    parent: &str,
    recursive: bool,
    visited: &mut Visited,
    result: &mut Vec<String>,
)
{
    if !visited.insert((left.address(), left.type_id())) {
        return;
    }

    for (index, name) in left.member_names().into_iter().enumerate() {
        let path = dotted(parent, name);
        let pair = left
            .member_candidate(MemberRef::Index(index), 0)
            .and_then(|l| Ok((l, right.member_candidate(MemberRef::Index(index), 0)?)));
        let Ok((mine, theirs)) = pair else {
            result.push(path);
            continue;
        };
        let (Ok(mine_type), Ok(their_type)) = (mine.resolved(), theirs.resolved()) else {
            result.push(path);
            continue;
        };

        if mine_type.is_struct_or_union() {
            if !recursive {
                continue;
            }
            if mine_type.same_layout(their_type) {
                collect_differences(&mine, &theirs, &path, recursive, visited, result);
            } else {
                result.push(path);
            }
        } else if !mine.equals(&theirs) {
            result.push(path);
        }
    }
}
