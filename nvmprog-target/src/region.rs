use std::ops::Range;

/// The kind of a memory region of a core, as far as programming is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Main non-volatile program memory.
    Rom,
    /// User Information Configuration Registers.
    Uicr,
    /// Anything that is neither, or straddles a region boundary.
    Outside,
}

impl std::fmt::Display for RegionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionKind::Rom => write!(f, "ROM"),
            RegionKind::Uicr => write!(f, "UICR"),
            RegionKind::Outside => write!(f, "OUTSIDE"),
        }
    }
}

/// A region derived from a [`CoreDefinition`](crate::CoreDefinition).
///
/// Regions are never stored, they are computed from the core layout whenever needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    /// What the region is used for.
    pub kind: RegionKind,
    /// Address range of the region.
    pub range: Range<u64>,
}

impl Region {
    /// Creates a region of `size` bytes starting at `start`.
    pub fn new(kind: RegionKind, start: u64, size: u64) -> Self {
        Self {
            kind,
            range: start..start.saturating_add(size),
        }
    }

    /// Start address of the region.
    pub fn start(&self) -> u64 {
        self.range.start
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Returns whether `range` lies entirely within this region.
    pub fn contains(&self, range: &Range<u64>) -> bool {
        self.range.contains_range(range)
    }
}

/// Containment and overlap tests between address ranges.
///
/// Empty ranges neither contain nor intersect anything.
pub trait MemoryRange {
    /// Every address of `range` lies within `self`.
    fn contains_range(&self, range: &Range<u64>) -> bool;

    /// At least one address lies within both `self` and `range`.
    fn intersects_range(&self, range: &Range<u64>) -> bool;
}

impl MemoryRange for Range<u64> {
    fn contains_range(&self, range: &Range<u64>) -> bool {
        !range.is_empty() && self.start <= range.start && range.end <= self.end
    }

    fn intersects_range(&self, range: &Range<u64>) -> bool {
        !self.is_empty() && !range.is_empty() && self.start < range.end && range.start < self.end
    }
}
