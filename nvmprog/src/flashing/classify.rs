use std::ops::Range;

use nvmprog_target::{CoreDefinition, RegionKind};

/// Determines which region of `core` the `length` bytes starting at `address` belong to.
///
/// A range has to lie entirely within the ROM or within the UICR page to be classified
/// as such. Anything else, including ranges that straddle a region boundary, is
/// [`RegionKind::Outside`].
pub fn classify(address: u64, length: u64, core: &CoreDefinition) -> RegionKind {
    let Some(end) = address.checked_add(length) else {
        return RegionKind::Outside;
    };

    if within(address, end, core.rom_range()) {
        RegionKind::Rom
    } else if within(address, end, core.uicr_range()) {
        RegionKind::Uicr
    } else {
        RegionKind::Outside
    }
}

/// Like [`classify`], for an address range.
pub fn classify_range(range: &Range<u64>, core: &CoreDefinition) -> RegionKind {
    classify(range.start, range.end.saturating_sub(range.start), core)
}

fn within(start: u64, end: u64, region: Range<u64>) -> bool {
    start >= region.start && end <= region.end
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvmprog_target::ProtectionStatus;
    use test_case::test_case;

    fn core() -> CoreDefinition {
        CoreDefinition {
            name: "Application".to_owned(),
            core_number: 0,
            rom_base_addr: 0x0,
            rom_size: 0x10_0000,
            uicr_base_addr: 0x10_0000,
            page_size: 0x1000,
            protection_status: ProtectionStatus::None,
        }
    }

    #[test_case(0x0, 0x10 => RegionKind::Rom; "start of rom")]
    #[test_case(0xF_FFF0, 0x10 => RegionKind::Rom; "end of rom")]
    #[test_case(0x0, 0x10_0000 => RegionKind::Rom; "all of rom")]
    #[test_case(0x10_0000, 0x1000 => RegionKind::Uicr; "whole uicr page")]
    #[test_case(0x10_0010, 0x4 => RegionKind::Uicr; "inside uicr")]
    #[test_case(0xF_FFF0, 0x20 => RegionKind::Outside; "straddling rom and uicr")]
    #[test_case(0x10_0FF0, 0x20 => RegionKind::Outside; "past the uicr page")]
    #[test_case(0x2000_0000, 0x4 => RegionKind::Outside; "ram")]
    #[test_case(u64::MAX, 0x2 => RegionKind::Outside; "overflowing range")]
    fn classify_ranges(address: u64, length: u64) -> RegionKind {
        classify(address, length, &core())
    }

    #[test]
    fn classify_range_matches_classify() {
        let core = core();
        assert_eq!(classify_range(&(0x10..0x20), &core), RegionKind::Rom);
        assert_eq!(
            classify_range(&(0x10_0000..0x10_1001), &core),
            RegionKind::Outside
        );
    }
}
