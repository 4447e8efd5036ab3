use crate::memory::SparseMemoryMap;
use crate::state::{FileState, TargetState};

/// Magic number at the very start of an MCUboot image header.
pub const MCUBOOT_IMAGE_MAGIC: u32 = 0x96f3_b83d;

/// Decides whether writing the loaded files to the device is currently permitted.
///
/// An MCUboot image manages its own update, so it may always be written. Otherwise
/// there must be files to write and the device must either be freshly erased or its
/// memory must have been read.
pub fn can_write(target: &TargetState, files: &FileState) -> bool {
    if files.is_mcuboot() && files.mcuboot_file_path().is_some() {
        return true;
    }

    if (!target.is_erased() && !target.is_mem_loaded()) || files.is_empty() {
        return false;
    }

    true
}

/// Returns true if the first block of `map` starts with the MCUboot image header magic.
pub fn is_mcuboot_image(map: &SparseMemoryMap) -> bool {
    map.blocks()
        .next()
        .and_then(|(_, data)| data.get(..4))
        .map_or(false, |magic| {
            magic == MCUBOOT_IMAGE_MAGIC.to_le_bytes().as_slice()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn target(is_erased: bool, is_mem_loaded: bool) -> TargetState {
        TargetState {
            is_erased,
            is_mem_loaded,
            ..Default::default()
        }
    }

    fn files(count: usize) -> FileState {
        let mut files = FileState::new();
        for i in 0..count {
            let map = SparseMemoryMap::from_ranges([(i as u64 * 0x10, vec![0; 4])]).unwrap();
            files.add_file(format!("file{i}.hex"), map);
        }
        files
    }

    fn mcuboot_files() -> FileState {
        let mut header = MCUBOOT_IMAGE_MAGIC.to_le_bytes().to_vec();
        header.extend([0; 28]);
        let mut files = FileState::new();
        files.add_file("signed.hex", SparseMemoryMap::from_ranges([(0, header)]).unwrap());
        files
    }

    #[test_case(false, false, 1 => false; "unknown device")]
    #[test_case(true, false, 1 => true; "erased device")]
    #[test_case(false, true, 1 => true; "read device")]
    #[test_case(true, true, 2 => true; "erased and read device")]
    #[test_case(true, true, 0 => false; "no files")]
    fn can_write_regular_files(is_erased: bool, is_mem_loaded: bool, file_count: usize) -> bool {
        can_write(&target(is_erased, is_mem_loaded), &files(file_count))
    }

    #[test_case(false, false; "unknown device")]
    #[test_case(true, true; "known device")]
    fn mcuboot_is_always_writable(is_erased: bool, is_mem_loaded: bool) {
        assert!(can_write(&target(is_erased, is_mem_loaded), &mcuboot_files()));
    }

    #[test]
    fn mcuboot_magic_must_start_the_first_block() {
        let magic = MCUBOOT_IMAGE_MAGIC.to_le_bytes().to_vec();
        let first = SparseMemoryMap::from_ranges([(0x8000, magic.clone())]).unwrap();
        let second =
            SparseMemoryMap::from_ranges([(0x0, vec![0; 4]), (0x8000, magic)]).unwrap();

        assert!(is_mcuboot_image(&first));
        assert!(!is_mcuboot_image(&second));
        assert!(!is_mcuboot_image(&SparseMemoryMap::new()));
    }
}
