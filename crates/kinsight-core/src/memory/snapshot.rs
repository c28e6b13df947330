//! Sparse in-memory snapshot image.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::MemoryImage;
use crate::error::InsightResult;
use crate::types::Address;

/// Memory image made of byte regions mapped at base addresses
///
/// Regions must not overlap. A read may span several regions as long as they
/// are contiguous; any gap makes the whole read fail.
///
/// ## Example
///
/// ```rust
/// use kinsight_core::memory::{MemoryImage, SnapshotImage};
/// use kinsight_core::types::Address;
///
/// let image = SnapshotImage::new("vmcore")
///     .with_region(Address::new(0x1000), vec![1, 2, 3, 4])
///     .with_region(Address::new(0x1004), vec![5, 6]);
///
/// assert_eq!(image.read(Address::new(0x1002), 4), Some(vec![3, 4, 5, 6]));
/// assert_eq!(image.read(Address::new(0x1005), 2), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SnapshotImage
{
    name: String,
    regions: BTreeMap<u64, Vec<u8>>,
}

impl SnapshotImage
{
    /// Create an empty image.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            regions: BTreeMap::new(),
        }
    }

    /// Builder-style variant of [`add_region`](Self::add_region).
    #[must_use]
    pub fn with_region(mut self, base: Address, bytes: Vec<u8>) -> Self
    {
        self.add_region(base, bytes);
        self
    }

    /// Map `bytes` at `base`, replacing any region starting at the same address.
    pub fn add_region(&mut self, base: Address, bytes: Vec<u8>)
    {
        self.regions.insert(base.value(), bytes);
    }

    /// Load a flat raw dump mapped contiguously at `base`.
    ///
    /// ## Errors
    ///
    /// `Io` if the file cannot be read.
    pub fn from_raw_file(name: impl Into<String>, path: impl AsRef<Path>, base: Address) -> InsightResult<Self>
    {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        debug!(path = %path.display(), base = %base, len = bytes.len(), "Loaded raw memory snapshot");
        Ok(Self::new(name).with_region(base, bytes))
    }

    /// Number of mapped regions
    #[must_use]
    pub fn region_count(&self) -> usize
    {
        self.regions.len()
    }

    /// The region containing `address` and the offset of `address` within it.
    fn region_at(&self, address: u64) -> Option<(&[u8], usize)>
    {
        let (base, bytes) = self.regions.range(..=address).next_back()?;
        let offset = usize::try_from(address - base).ok()?;
        (offset < bytes.len()).then_some((bytes.as_slice(), offset))
    }
}

impl MemoryImage for SnapshotImage
{
    fn name(&self) -> &str
    {
        &self.name
    }

    fn read(&self, address: Address, length: usize) -> Option<Vec<u8>>
    {
        let start = address.value();
        // Ranges wrapping past the end of the address space are never readable
        if length > 0 {
            start.checked_add(length as u64 - 1)?;
        }

        // Every byte must be mapped before anything is allocated for the copy
        let mut chunks: Vec<&[u8]> = Vec::new();
        let mut covered = 0usize;
        while covered < length {
            let (region, offset) = self.region_at(start + covered as u64)?;
            let chunk = (length - covered).min(region.len() - offset);
            chunks.push(&region[offset..offset + chunk]);
            covered += chunk;
        }
        Some(chunks.concat())
    }
}
