//! Sparse memory maps and the merging of several maps into one.

mod overlap;
mod sparse;

pub use overlap::{merge_memory_maps, Contribution, OverlapMap, Segment};
pub use sparse::{SparseMemoryMap, MIN_PAD_LENGTH, PAD_BYTE};

/// Errors that can happen while building a [`SparseMemoryMap`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MemoryMapError {
    /// Two blocks of the same source cover the same address.
    #[error("Adding data to the memory map would overlap existing data at address {address:#010X}.")]
    Overlap {
        /// The first address where the overlap was detected.
        address: u64,
    },
    /// A block extends past the end of the address space.
    #[error("A block starting at {address:#010X} extends past the end of the address space.")]
    AddressOverflow {
        /// Start address of the offending block.
        address: u64,
    },
}
