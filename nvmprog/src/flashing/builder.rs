use std::fmt::{Debug, Formatter};
use std::ops::Range;

use nvmprog_target::{CoreDefinition, RegionKind};

use super::classify::classify_range;
use super::{hex, FlashError};
use crate::memory::{OverlapMap, SparseMemoryMap, PAD_BYTE};

/// A page of data that is ready to be transferred to a core.
#[derive(Clone, PartialEq, Eq)]
pub struct FlashPage {
    address: u64,
    region: RegionKind,
    data: Vec<u8>,
}

impl Debug for FlashPage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "FlashPage {{")?;
        writeln!(f, "    address: {:#010X}", self.address())?;
        writeln!(f, "    region: {}", self.region())?;
        writeln!(f, "    size: {:#X}", self.size())?;
        write!(f, "}}")
    }
}

impl FlashPage {
    /// Returns the start address of the page. It is always a multiple of the page size.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the region the page belongs to.
    pub fn region(&self) -> RegionKind {
        self.region
    }

    /// Returns the number of bytes to write, at most one page.
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Returns the data of the page.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The address range covered by the page.
    pub fn range(&self) -> Range<u64> {
        self.address..self.address + self.data.len() as u64
    }
}

/// The pages to write to one core.
///
/// A plan only ever contains data that lies entirely within the core's ROM or UICR.
/// An empty plan is valid and means there is nothing to write to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    core: String,
    pages: Vec<FlashPage>,
    dropped: Vec<Range<u64>>,
}

impl WritePlan {
    /// Plans the write of a merged image to `core`.
    ///
    /// Every segment of the image is classified against the core's layout. Segments
    /// outside of the ROM and the UICR are dropped, the others are flattened and split
    /// into pages of the core's page size.
    pub fn new(overlaps: &OverlapMap, core: &CoreDefinition) -> Self {
        let mut dropped = vec![];
        let kept = overlaps.filter(|range| match classify_range(range, core) {
            RegionKind::Outside => {
                dropped.push(range.clone());
                false
            }
            _ => true,
        });

        for range in &dropped {
            tracing::debug!(
                "Skipping {:#010X}..{:#010X} for core '{}', it is not inside ROM or UICR",
                range.start,
                range.end,
                core.name
            );
        }

        let pages = kept
            .flatten()
            .paginate(core.page_size, PAD_BYTE)
            .blocks()
            .map(|(address, data)| FlashPage {
                address,
                region: classify_range(&(address..address + data.len() as u64), core),
                data: data.to_vec(),
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Planned {} pages for core '{}' ({} segments skipped)",
            pages.len(),
            core.name,
            dropped.len()
        );

        Self {
            core: core.name.clone(),
            pages,
            dropped,
        }
    }

    /// Plans the write of a single, already merged, memory map to `core`.
    pub fn from_map(map: &SparseMemoryMap, core: &CoreDefinition) -> Self {
        Self::new(&OverlapMap::from(map), core)
    }

    /// Name of the core this plan is for.
    pub fn core(&self) -> &str {
        &self.core
    }

    /// The pages to write, in address order.
    pub fn pages(&self) -> &[FlashPage] {
        &self.pages
    }

    /// The address ranges of the image that were skipped for this core.
    pub fn dropped(&self) -> &[Range<u64>] {
        &self.dropped
    }

    /// Returns true if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Total number of bytes to write.
    pub fn byte_len(&self) -> u64 {
        self.pages.iter().map(|p| p.size() as u64).sum()
    }

    /// The plan as a memory map.
    pub fn to_memory_map(&self) -> SparseMemoryMap {
        let mut map = SparseMemoryMap::new();
        for page in &self.pages {
            map.insert_disjoint(page.address, page.data.clone());
        }
        map
    }

    /// The plan encoded as Intel HEX, which is what the probe driver transfers.
    pub fn to_hex(&self) -> Result<String, FlashError> {
        hex::encode(&self.to_memory_map())
    }
}
