//! # Memory Space
//!
//! Byte-level access to one or more snapshots of the inspected system.
//!
//! A [`MemorySpace`] is an ordered list of images. Image 0 is the primary
//! snapshot; further images (for example a second dump of the same machine
//! taken later) are addressed by index. Every read names its image.
//!
//! Images implement [`MemoryImage`]. The crate ships [`SnapshotImage`], a
//! sparse set of byte regions that can also be loaded from a flat raw dump.
//! Other dump formats plug in by implementing the trait.

mod snapshot;

use tracing::trace;

pub use snapshot::SnapshotImage;

use crate::error::{InsightError, InsightResult};
use crate::types::value::decode_unsigned;
use crate::types::Address;

/// A readable snapshot of target memory
pub trait MemoryImage: Send + Sync
{
    /// Human readable name of the image (file name, dump label, ...).
    fn name(&self) -> &str;

    /// Read exactly `length` bytes starting at `address`
    ///
    /// Returns `None` if any byte of the range is not present. Implementations
    /// must return `None` for ranges that wrap past the end of the address
    /// space.
    fn read(&self, address: Address, length: usize) -> Option<Vec<u8>>;
}

/// Ordered collection of memory images
#[derive(Default)]
pub struct MemorySpace
{
    images: Vec<Box<dyn MemoryImage>>,
}

impl MemorySpace
{
    /// Create a space without images.
    #[must_use]
    pub fn new() -> Self
    {
        Self { images: Vec::new() }
    }

    /// Builder-style variant of [`push`](Self::push).
    #[must_use]
    pub fn with_image(mut self, image: impl MemoryImage + 'static) -> Self
    {
        self.push(image);
        self
    }

    /// Append an image and return its index.
    pub fn push(&mut self, image: impl MemoryImage + 'static) -> usize
    {
        self.images.push(Box::new(image));
        self.images.len() - 1
    }

    #[must_use]
    pub fn image_count(&self) -> usize
    {
        self.images.len()
    }

    /// Names of all images, in index order
    #[must_use]
    pub fn image_names(&self) -> Vec<&str>
    {
        self.images.iter().map(|image| image.name()).collect()
    }

    /// Fail with `InvalidImage` unless `image` is a valid index.
    pub fn check_image(&self, image: usize) -> InsightResult<()>
    {
        if image < self.images.len() {
            Ok(())
        } else {
            Err(InsightError::InvalidImage {
                index: image,
                count: self.images.len(),
            })
        }
    }

    /// Read `length` bytes at `address` from image `image`.
    ///
    /// ## Errors
    ///
    /// - `InvalidImage` if the index is out of range
    /// - `Unreadable` if any byte of the range is missing from the image
    pub fn read(&self, image: usize, address: Address, length: usize) -> InsightResult<Vec<u8>>
    {
        self.check_image(image)?;
        let bytes = self.images[image].read(address, length);
        trace!(image, address = %address, length, ok = bytes.is_some(), "memory read");
        bytes.ok_or(InsightError::Unreadable {
            image,
            address,
            length,
        })
    }

    /// Read a little-endian unsigned integer of `size` bytes (at most 8).
    pub fn read_unsigned(&self, image: usize, address: Address, size: usize) -> InsightResult<u64>
    {
        if size > 8 {
            return Err(InsightError::InvalidArgument(format!(
                "cannot decode a {size} byte integer"
            )));
        }
        self.read(image, address, size).map(|bytes| decode_unsigned(&bytes))
    }
}

impl std::fmt::Debug for MemorySpace
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("MemorySpace")
            .field("images", &self.image_names())
            .finish()
    }
}
