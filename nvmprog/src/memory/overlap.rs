use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use super::SparseMemoryMap;

/// One source's bytes for a segment of an [`OverlapMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    /// Identifier of the source the bytes came from, typically a file path.
    pub source: String,
    /// The bytes this source holds for the segment.
    pub data: Vec<u8>,
}

/// A segment of memory together with every source that has data for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Contributions in the order their sources were given.
    pub contributions: Vec<Contribution>,
}

impl Segment {
    /// Length in bytes. All contributions of a segment have the same length.
    pub fn len(&self) -> usize {
        self.contributions.first().map_or(0, |c| c.data.len())
    }

    /// Returns true if the segment holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if more than one source has data here.
    pub fn is_contested(&self) -> bool {
        self.contributions.len() > 1
    }

    /// The bytes that end up in memory: those of the last source.
    pub fn winner(&self) -> Option<&Contribution> {
        self.contributions.last()
    }
}

/// The result of overlapping several memory maps.
///
/// Memory is cut into segments at every block boundary of every source, so that within
/// one segment each source either has data for every byte or for none. Segments are keyed
/// by their start address and never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlapMap {
    segments: BTreeMap<u64, Segment>,
}

impl OverlapMap {
    /// Overlaps the given sources. Their order decides which one wins when flattening:
    /// later sources take precedence over earlier ones.
    pub fn new<'a, I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = (S, &'a SparseMemoryMap)>,
        S: Into<String>,
    {
        let sources: Vec<(String, &SparseMemoryMap)> = sources
            .into_iter()
            .map(|(id, map)| (id.into(), map))
            .collect();

        let cuts: BTreeSet<u64> = sources
            .iter()
            .flat_map(|(_, map)| map.ranges())
            .flat_map(|range| [range.start, range.end])
            .collect();
        let cuts: Vec<u64> = cuts.into_iter().collect();

        let mut segments = BTreeMap::new();
        for window in cuts.windows(2) {
            let (start, end) = (window[0], window[1]);
            let length = end - start;

            let contributions: Vec<Contribution> = sources
                .iter()
                .filter_map(|(id, map)| {
                    // Every block boundary is a cut, so a source covering the first byte of
                    // the segment covers all of it.
                    map.get(start)?;
                    Some(Contribution {
                        source: id.clone(),
                        data: map.slice_pad(start, length as usize, 0),
                    })
                })
                .collect();

            if !contributions.is_empty() {
                segments.insert(start, Segment { contributions });
            }
        }

        Self { segments }
    }

    /// Iterates over all segments in address order.
    pub fn segments(&self) -> impl Iterator<Item = (u64, &Segment)> + '_ {
        self.segments.iter().map(|(a, s)| (*a, s))
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if there are no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the segments with more than one contributing source.
    pub fn contested(&self) -> impl Iterator<Item = (Range<u64>, &Segment)> + '_ {
        self.segments()
            .filter(|(_, s)| s.is_contested())
            .map(|(a, s)| (a..a + s.len() as u64, s))
    }

    /// Returns a new overlap map keeping only the segments for which `keep` returns true.
    ///
    /// `keep` is called with the address range of each segment.
    pub fn filter(&self, mut keep: impl FnMut(&Range<u64>) -> bool) -> OverlapMap {
        let segments = self
            .segments
            .iter()
            .filter(|(address, segment)| keep(&(**address..**address + segment.len() as u64)))
            .map(|(a, s)| (*a, s.clone()))
            .collect();
        OverlapMap { segments }
    }

    /// Resolves every segment to its winning bytes and joins the result.
    pub fn flatten(&self) -> SparseMemoryMap {
        let mut flat = SparseMemoryMap::new();
        for (address, segment) in &self.segments {
            if let Some(winner) = segment.winner() {
                flat.insert_disjoint(*address, winner.data.clone());
            }
        }
        flat.join()
    }
}

impl From<&SparseMemoryMap> for OverlapMap {
    /// An overlap map with the map as its only, unnamed source.
    fn from(map: &SparseMemoryMap) -> Self {
        let segments = map
            .blocks()
            .map(|(address, data)| {
                let segment = Segment {
                    contributions: vec![Contribution {
                        source: String::new(),
                        data: data.to_vec(),
                    }],
                };
                (address, segment)
            })
            .collect();
        OverlapMap { segments }
    }
}

/// Merges several memory maps into one. Where sources overlap, the later one wins.
pub fn merge_memory_maps<'a, I, S>(sources: I) -> SparseMemoryMap
where
    I: IntoIterator<Item = (S, &'a SparseMemoryMap)>,
    S: Into<String>,
{
    let overlaps = OverlapMap::new(sources);
    for (range, segment) in overlaps.contested() {
        tracing::warn!(
            "{:#010x}..{:#010x} is written by {} sources, using {}",
            range.start,
            range.end,
            segment.contributions.len(),
            segment.winner().map_or("", |w| w.source.as_str())
        );
    }
    overlaps.flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(blocks: &[(u64, &[u8])]) -> SparseMemoryMap {
        SparseMemoryMap::from_ranges(blocks.iter().map(|(a, d)| (*a, d.to_vec()))).unwrap()
    }

    #[test]
    fn disjoint_sources_do_not_contest() {
        let a = map(&[(0, &[1, 2])]);
        let b = map(&[(4, &[3])]);

        let overlaps = OverlapMap::new([("a", &a), ("b", &b)]);
        assert_eq!(overlaps.len(), 2);
        assert_eq!(overlaps.contested().count(), 0);
    }

    #[test]
    fn overlapping_sources_are_split_at_every_boundary() {
        let a = map(&[(0, &[1, 1, 1, 1])]);
        let b = map(&[(2, &[2, 2, 2, 2])]);

        let overlaps = OverlapMap::new([("a", &a), ("b", &b)]);
        let segments: Vec<_> = overlaps
            .segments()
            .map(|(address, s)| {
                let sources: Vec<_> = s.contributions.iter().map(|c| c.source.as_str()).collect();
                (address, s.len(), sources)
            })
            .collect();

        assert_eq!(
            segments,
            vec![
                (0, 2, vec!["a"]),
                (2, 2, vec!["a", "b"]),
                (4, 2, vec!["b"]),
            ]
        );
    }

    #[test]
    fn last_source_wins_when_flattening() {
        let a = map(&[(0, &[1, 1, 1, 1])]);
        let b = map(&[(2, &[2, 2, 2, 2])]);

        assert_eq!(
            merge_memory_maps([("a", &a), ("b", &b)]),
            map(&[(0, &[1, 1, 2, 2, 2, 2])])
        );
        assert_eq!(
            merge_memory_maps([("b", &b), ("a", &a)]),
            map(&[(0, &[1, 1, 1, 1, 2, 2])])
        );
    }

    #[test]
    fn merging_a_map_with_itself_is_idempotent() {
        let m = map(&[(0, &[1, 2]), (2, &[3]), (0x100, &[4, 5])]);
        assert_eq!(
            merge_memory_maps([("x", &m), ("y", &m)]),
            OverlapMap::from(&m).flatten()
        );
    }

    #[test]
    fn flatten_of_single_map_joins_blocks() {
        let m = map(&[(0, &[1, 2]), (2, &[3])]);
        assert_eq!(OverlapMap::from(&m).flatten(), map(&[(0, &[1, 2, 3])]));
    }

    #[test]
    fn filter_keeps_selected_segments() {
        let a = map(&[(0, &[1]), (0x1000, &[2])]);
        let overlaps = OverlapMap::new([("a", &a)]);

        let low = overlaps.filter(|range| range.end <= 0x1000);
        assert_eq!(low.flatten(), map(&[(0, &[1])]));
        assert_eq!(overlaps.len(), 2);
    }
}
