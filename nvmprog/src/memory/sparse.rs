use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::ops::Range;

use nvmprog_target::MemoryRange;

use super::MemoryMapError;

/// The value of an erased flash byte, used to fill gaps.
pub const PAD_BYTE: u8 = 0xFF;

/// Runs of padding at least this long are treated as absent memory by
/// [`SparseMemoryMap::from_padded`].
pub const MIN_PAD_LENGTH: usize = 64;

/// An ordered set of non-overlapping blocks of data, each starting at an address.
///
/// This is the in-memory representation of both firmware images and of the contents
/// read back from a device. Blocks are kept sorted by their start address and never
/// overlap; two blocks may touch, see [`SparseMemoryMap::join`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SparseMemoryMap {
    blocks: BTreeMap<u64, Vec<u8>>,
}

impl Debug for SparseMemoryMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for (address, data) in &self.blocks {
            list.entry(&format_args!(
                "{:#010X}..{:#010X} ({} bytes)",
                address,
                *address + data.len() as u64,
                data.len()
            ));
        }
        list.finish()
    }
}

impl SparseMemoryMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from a set of `(address, data)` pairs coming from a single source.
    ///
    /// Empty blocks are ignored. Fails if two of the blocks overlap.
    pub fn from_ranges<I>(ranges: I) -> Result<Self, MemoryMapError>
    where
        I: IntoIterator<Item = (u64, Vec<u8>)>,
    {
        let mut map = Self::new();
        for (address, data) in ranges {
            map.add_block(address, data)?;
        }
        Ok(map)
    }

    /// Adds a block of data.
    ///
    /// The block must not overlap any block that is already present.
    pub fn add_block(&mut self, address: u64, data: Vec<u8>) -> Result<(), MemoryMapError> {
        if data.is_empty() {
            return Ok(());
        }

        let range = block_range(address, data.len())?;

        // Blocks are sorted and disjoint, so only the closest neighbour on each side can
        // intersect the new block.
        if let Some((&start, previous)) = self.blocks.range(..=address).next_back() {
            if (start..start + previous.len() as u64).intersects_range(&range) {
                return Err(MemoryMapError::Overlap { address });
            }
        }
        if let Some((&start, next)) = self.blocks.range(address..).next() {
            if (start..start + next.len() as u64).intersects_range(&range) {
                return Err(MemoryMapError::Overlap { address: start });
            }
        }

        self.blocks.insert(address, data);
        Ok(())
    }

    /// Inserts a block that is known not to overlap anything.
    pub(crate) fn insert_disjoint(&mut self, address: u64, data: Vec<u8>) {
        if !data.is_empty() {
            self.blocks.insert(address, data);
        }
    }

    /// Iterates over all blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = (u64, &[u8])> + '_ {
        self.blocks.iter().map(|(a, d)| (*a, d.as_slice()))
    }

    /// Iterates over the address ranges of all blocks in address order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.blocks
            .iter()
            .map(|(a, d)| *a..*a + d.len() as u64)
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if the map holds no data.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total number of data bytes over all blocks.
    pub fn byte_len(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }

    /// The lowest and highest address covered, if any.
    pub fn span(&self) -> Option<Range<u64>> {
        let first = self.blocks.keys().next()?;
        let (last, data) = self.blocks.iter().next_back()?;
        Some(*first..*last + data.len() as u64)
    }

    /// Returns the byte at `address`, if the map has data there.
    pub fn get(&self, address: u64) -> Option<u8> {
        let (start, data) = self.blocks.range(..=address).next_back()?;
        data.get((address - start) as usize).copied()
    }

    /// Returns the blocks intersecting `start..start + length`, clipped to that window.
    fn clipped(&self, start: u64, length: u64) -> impl Iterator<Item = (u64, &[u8])> + '_ {
        let end = start.saturating_add(length);
        // The block starting before the window may still reach into it.
        let first = self
            .blocks
            .range(..start)
            .next_back()
            .map(|(a, _)| *a)
            .unwrap_or(start);

        self.blocks.range(first..end).filter_map(move |(address, data)| {
            let block_end = *address + data.len() as u64;
            let from = (*address).max(start);
            let to = block_end.min(end);
            (from < to).then(|| {
                let offset = (from - address) as usize;
                (from, &data[offset..offset + (to - from) as usize])
            })
        })
    }

    /// Returns exactly `length` bytes starting at `start`, filling gaps with `pad`.
    pub fn slice_pad(&self, start: u64, length: usize, pad: u8) -> Vec<u8> {
        let mut bytes = vec![pad; length];
        for (address, data) in self.clipped(start, length as u64) {
            let offset = (address - start) as usize;
            bytes[offset..offset + data.len()].copy_from_slice(data);
        }
        bytes
    }

    /// Returns a new map containing only the data within `start..start + length`.
    pub fn slice(&self, start: u64, length: u64) -> SparseMemoryMap {
        let mut sliced = SparseMemoryMap::new();
        for (address, data) in self.clipped(start, length) {
            sliced.insert_disjoint(address, data.to_vec());
        }
        sliced
    }

    /// Reconstructs a map from a contiguous buffer that starts at `base`.
    ///
    /// Runs of `pad` that are at least `min_pad_length` long are considered absent memory
    /// and split the buffer into separate blocks. Shorter runs are kept as data.
    pub fn from_padded(base: u64, bytes: &[u8], pad: u8, min_pad_length: usize) -> Self {
        let min_pad_length = min_pad_length.max(1);
        let mut map = SparseMemoryMap::new();

        let mut block_start: Option<usize> = None;
        let mut pad_run_start: Option<usize> = None;

        for (i, byte) in bytes.iter().enumerate() {
            if *byte == pad {
                pad_run_start.get_or_insert(i);
                continue;
            }

            if let Some(run_start) = pad_run_start.take() {
                if i - run_start >= min_pad_length {
                    if let Some(start) = block_start.take() {
                        map.insert_disjoint(base + start as u64, bytes[start..run_start].to_vec());
                    }
                }
            }
            block_start.get_or_insert(i);
        }

        if let Some(start) = block_start {
            // Trailing padding is stripped if it is long enough, like any other run.
            let end = match pad_run_start {
                Some(run_start) if bytes.len() - run_start >= min_pad_length => run_start,
                _ => bytes.len(),
            };
            map.insert_disjoint(base + start as u64, bytes[start..end].to_vec());
        }

        map
    }

    /// Returns an equivalent map in which touching blocks are joined into one.
    pub fn join(&self) -> SparseMemoryMap {
        let mut joined: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        let mut current: Option<(u64, Vec<u8>)> = None;

        for (address, data) in &self.blocks {
            current = match current.take() {
                Some((start, mut bytes)) if start + bytes.len() as u64 == *address => {
                    bytes.extend_from_slice(data);
                    Some((start, bytes))
                }
                Some((start, bytes)) => {
                    joined.insert(start, bytes);
                    Some((*address, data.clone()))
                }
                None => Some((*address, data.clone())),
            };
        }
        if let Some((start, bytes)) = current {
            joined.insert(start, bytes);
        }

        SparseMemoryMap { blocks: joined }
    }

    /// Re-chunks the map into blocks aligned to `page_size`.
    ///
    /// Every resulting block starts on a page boundary and is at most one page long.
    /// A page runs from its base address up to the last byte of data in it; gaps before
    /// that byte are filled with `pad`. Pages without any data are not produced.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    pub fn paginate(&self, page_size: u32, pad: u8) -> SparseMemoryMap {
        assert!(page_size > 0, "page size must not be zero");
        let page_size = page_size as u64;

        let mut pages: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        for (address, data) in &self.blocks {
            let mut offset = 0usize;
            while offset < data.len() {
                let current = *address + offset as u64;
                let page_address = current - current % page_size;
                let page_offset = (current - page_address) as usize;
                let amount = usize::min(
                    (page_size as usize) - page_offset,
                    data.len() - offset,
                );

                let page = pages.entry(page_address).or_default();
                if page.len() < page_offset + amount {
                    page.resize(page_offset + amount, pad);
                }
                page[page_offset..page_offset + amount]
                    .copy_from_slice(&data[offset..offset + amount]);

                tracing::trace!(
                    "Placed {} bytes at {:#010x} into page {:#010x}",
                    amount,
                    current,
                    page_address
                );
                offset += amount;
            }
        }

        SparseMemoryMap { blocks: pages }
    }
}

fn block_range(address: u64, len: usize) -> Result<Range<u64>, MemoryMapError> {
    let end = address
        .checked_add(len as u64)
        .ok_or(MemoryMapError::AddressOverflow { address })?;
    Ok(address..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn map(blocks: &[(u64, &[u8])]) -> SparseMemoryMap {
        SparseMemoryMap::from_ranges(blocks.iter().map(|(a, d)| (*a, d.to_vec()))).unwrap()
    }

    #[test]
    fn add_overlapping_data() {
        let mut memory = SparseMemoryMap::new();
        assert!(memory.add_block(0, vec![42]).is_ok());
        assert_eq!(
            memory.add_block(0, vec![42]),
            Err(MemoryMapError::Overlap { address: 0 })
        );
    }

    #[test]
    fn add_non_overlapping_data() {
        let mut memory = SparseMemoryMap::new();
        assert!(memory.add_block(0, vec![42]).is_ok());
        assert!(memory.add_block(1, vec![42]).is_ok());
        assert_eq!(memory.len(), 2);
    }

    #[test_case(0x10, 4; "overlapping the end of the previous block")]
    #[test_case(0x04, 0x10; "overlapping the start of the next block")]
    #[test_case(0x00, 0x40; "covering an existing block")]
    #[test_case(0x12, 1; "inside an existing block")]
    fn from_ranges_rejects_overlaps(address: u64, len: usize) {
        let result = SparseMemoryMap::from_ranges([(0x10, vec![1; 8]), (address, vec![2; len])]);
        assert!(matches!(result, Err(MemoryMapError::Overlap { .. })));
    }

    #[test]
    fn empty_blocks_are_ignored() {
        let memory = map(&[(0x10, &[]), (0x10, &[1, 2])]);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.byte_len(), 2);
    }

    #[test]
    fn block_past_the_address_space_is_rejected() {
        let mut memory = SparseMemoryMap::new();
        assert_eq!(
            memory.add_block(u64::MAX, vec![1, 2]),
            Err(MemoryMapError::AddressOverflow { address: u64::MAX })
        );
    }

    #[test]
    fn get_returns_bytes_inside_blocks_only() {
        let memory = map(&[(0x10, &[1, 2, 3])]);
        assert_eq!(memory.get(0x0F), None);
        assert_eq!(memory.get(0x10), Some(1));
        assert_eq!(memory.get(0x12), Some(3));
        assert_eq!(memory.get(0x13), None);
    }

    #[test]
    fn slice_pad_fills_gaps() {
        let memory = map(&[(2, &[1, 2]), (6, &[3])]);
        assert_eq!(
            memory.slice_pad(0, 8, PAD_BYTE),
            vec![0xFF, 0xFF, 1, 2, 0xFF, 0xFF, 3, 0xFF]
        );
    }

    #[test]
    fn slice_pad_clips_blocks_starting_before_the_window() {
        let memory = map(&[(0, &[1, 2, 3, 4]), (8, &[5, 6, 7, 8])]);
        assert_eq!(memory.slice_pad(2, 8, 0), vec![3, 4, 0, 0, 0, 0, 5, 6]);
    }

    #[test]
    fn slice_keeps_only_the_window() {
        let memory = map(&[(0, &[1, 2, 3, 4]), (8, &[5, 6, 7, 8])]);
        assert_eq!(memory.slice(2, 8), map(&[(2, &[3, 4]), (8, &[5, 6])]));
        assert!(memory.slice(4, 4).is_empty());
    }

    #[test]
    fn from_padded_splits_on_long_padding_runs() {
        let mut bytes = vec![1, 2, 0xFF, 3];
        bytes.extend([0xFF; 4]);
        bytes.extend([4, 5]);
        bytes.extend([0xFF; 4]);

        let memory = SparseMemoryMap::from_padded(0x100, &bytes, 0xFF, 4);
        assert_eq!(
            memory,
            map(&[(0x100, &[1, 2, 0xFF, 3]), (0x108, &[4, 5])])
        );
    }

    #[test]
    fn from_padded_of_only_padding_is_empty() {
        let memory = SparseMemoryMap::from_padded(0, &[0xFF; 128], 0xFF, MIN_PAD_LENGTH);
        assert!(memory.is_empty());
    }

    #[test]
    fn slice_pad_then_from_padded_reproduces_the_window() {
        let original = map(&[(0x10, &[1, 2, 3]), (0x20, &[4; 70]), (0x200, &[5, 6])]);
        let window = 0..0x180u64;

        let padded = original.slice_pad(window.start, window.end as usize, PAD_BYTE);
        let rebuilt = SparseMemoryMap::from_padded(window.start, &padded, PAD_BYTE, MIN_PAD_LENGTH);

        for address in window {
            match (original.get(address), rebuilt.get(address)) {
                (Some(a), Some(b)) => assert_eq!(a, b, "byte at {address:#x}"),
                (None, Some(b)) => assert_eq!(b, PAD_BYTE, "byte at {address:#x}"),
                (None, None) => {}
                (Some(a), None) => panic!("lost byte {a:#x} at {address:#x}"),
            }
        }
        assert_eq!(rebuilt.get(0x200), None);
    }

    #[test]
    fn join_merges_touching_blocks() {
        let memory = map(&[(0, &[1, 2]), (2, &[3]), (4, &[4])]);
        assert_eq!(memory.join(), map(&[(0, &[1, 2, 3]), (4, &[4])]));
    }

    #[test]
    fn paginate_aligns_to_pages() {
        let memory = map(&[(0x0FFE, &[1, 2, 3, 4]), (0x1010, &[5])]);
        let pages = memory.paginate(0x1000, PAD_BYTE);

        let mut expected_second = vec![3, 4];
        expected_second.resize(0x10, PAD_BYTE);
        expected_second.push(5);

        let mut expected_first = vec![PAD_BYTE; 0xFFE];
        expected_first.extend([1, 2]);

        assert_eq!(
            pages,
            map(&[(0x0000, &expected_first), (0x1000, &expected_second)])
        );
    }

    #[test]
    fn paginate_blocks_are_aligned_and_bounded() {
        let memory = map(&[(3, &[7; 1000]), (2000, &[8; 3]), (4095, &[9; 2])]);
        let page_size = 256;
        let pages = memory.paginate(page_size, PAD_BYTE);

        for (address, data) in pages.blocks() {
            assert_eq!(address % page_size as u64, 0);
            assert!(data.len() <= page_size as usize);
        }
        for (address, data) in memory.blocks() {
            for (i, byte) in data.iter().enumerate() {
                assert_eq!(pages.get(address + i as u64), Some(*byte));
            }
        }
    }

    #[test]
    fn span_covers_all_blocks() {
        let memory = map(&[(0x10, &[1]), (0x40, &[1, 2])]);
        assert_eq!(memory.span(), Some(0x10..0x42));
        assert_eq!(SparseMemoryMap::new().span(), None);
    }
}
