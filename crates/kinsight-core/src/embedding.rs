//! # Embedding Resolution
//!
//! Generic kernel objects (an `inode`, a `sock`) are usually embedded in a
//! larger, file-system or protocol specific structure. Which one is only
//! revealed by a characteristic pointer, typically an operations table such as
//! `inode->i_sb->s_op`.
//!
//! An [`EmbeddingResolver`] holds the path to that pointer and a finite table
//! of [`EmbeddingRule`]s. The first rule whose operations symbol lives at the
//! pointer's value wins: the instance is retyped to the rule's derived type
//! and moved back by the offset of the embedded member, so it starts at the
//! full object. Without a match the instance is returned as it was.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kinsight_core::prelude::*;
//!
//! fn concrete<'i>(inode: TypedInstance<'i>) -> InsightResult<TypedInstance<'i>>
//! {
//!     EmbeddingResolver::inodes().resolve(inode, &NoSections)
//! }
//! ```

use tracing::debug;

use crate::catalog::SectionLocator;
use crate::error::{InsightError, InsightResult};
use crate::instance::TypedInstance;
use crate::types::Address;

/// One entry of the candidate table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingRule
{
    /// Global symbol the characteristic pointer must point at
    pub ops_symbol: String,
    /// Type the instance becomes on a match
    pub derived_type: String,
    /// Member of the derived type that holds the base object, `None` if the
    /// base object starts the derived one
    pub embedded_member: Option<String>,
}

impl EmbeddingRule
{
    /// Rule for a derived type that starts with the base object.
    pub fn new(ops_symbol: impl Into<String>, derived_type: impl Into<String>) -> Self
    {
        Self {
            ops_symbol: ops_symbol.into(),
            derived_type: derived_type.into(),
            embedded_member: None,
        }
    }

    /// Set the member of the derived type that embeds the base object.
    #[must_use]
    pub fn embedded_at(mut self, member: impl Into<String>) -> Self
    {
        self.embedded_member = Some(member.into());
        self
    }
}

/// Upgrades base objects to the structure that embeds them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingResolver
{
    path: Vec<String>,
    rules: Vec<EmbeddingRule>,
}

impl EmbeddingResolver
{
    /// Resolver reading the pointer at `path` and trying `rules` in order.
    pub fn new(path: &[&str], rules: Vec<EmbeddingRule>) -> Self
    {
        Self {
            path: path.iter().map(|name| (*name).to_string()).collect(),
            rules,
        }
    }

    /// Rules for `struct inode`, keyed on the super block operations.
    #[must_use]
    pub fn inodes() -> Self
    {
        Self::new(
            &["i_sb", "s_op"],
            vec![
                EmbeddingRule::new("shmem_ops", "shmem_inode_info").embedded_at("vfs_inode"),
                EmbeddingRule::new("proc_sops", "proc_inode").embedded_at("vfs_inode"),
                EmbeddingRule::new("bdev_sops", "bdev_inode").embedded_at("vfs_inode"),
            ],
        )
    }

    /// Rules for `struct sock`, keyed on the protocol.
    #[must_use]
    pub fn sockets() -> Self
    {
        Self::new(
            &["__sk_common", "skc_prot"],
            vec![
                EmbeddingRule::new("raw_prot", "raw_sock"),
                EmbeddingRule::new("rawv6_prot", "raw6_sock"),
                EmbeddingRule::new("tcp_prot", "tcp_sock"),
                EmbeddingRule::new("tcpv6_prot", "tcp6_sock"),
                EmbeddingRule::new("udp_prot", "udp_sock"),
                EmbeddingRule::new("unix_proto", "unix_sock"),
                EmbeddingRule::new("netlink_proto", "netlink_sock"),
            ],
        )
    }

    #[must_use]
    pub fn path(&self) -> &[String]
    {
        &self.path
    }

    #[must_use]
    pub fn rules(&self) -> &[EmbeddingRule]
    {
        &self.rules
    }

    /// The object embedding `base`, or `base` itself if no rule matches
    ///
    /// Symbols of loaded units are relocated through `locator`; rules whose
    /// symbol is unknown or whose unit is not loaded are skipped. A NULL
    /// pointer on the way to the characteristic pointer counts as no match.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if a member of the path does not exist, or a matching
    ///   rule names an unknown type or member
    /// - `Unreadable` if the characteristic pointer cannot be read
    pub fn resolve<'i>(
        &self,
        base: TypedInstance<'i>,
        locator: &dyn SectionLocator,
    ) -> InsightResult<TypedInstance<'i>>
    {
        let Some(pointer) = self.characteristic(&base)? else {
            return Ok(base);
        };

        let inspector = base.inspector();
        let catalog = inspector.catalog();
        for rule in &self.rules {
            let Ok(symbol) = catalog.symbol_by_name(&rule.ops_symbol) else {
                continue;
            };
            let Ok(address) = inspector.symbol_address(symbol, locator) else {
                continue;
            };
            if address != pointer {
                continue;
            }

            let derived = base.change_type_by_name(&rule.derived_type)?;
            let offset = match &rule.embedded_member {
                Some(member) => derived.member_offset(member)?,
                None => 0,
            };
            let resolved = derived.with_address(base.address() - offset);
            debug!(
                base = %base,
                ops = %rule.ops_symbol,
                resolved = %resolved,
                "Resolved embedding object"
            );
            return Ok(resolved);
        }
        Ok(base)
    }

    fn characteristic(&self, base: &TypedInstance<'_>) -> InsightResult<Option<Address>>
    {
        let path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        let pointer = match base.member_path(&path) {
            Ok(field) => field.pointer_value()?,
            Err(InsightError::NullPointer { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok((!pointer.is_null()).then_some(pointer))
    }
}
