#![allow(missing_docs)] // Don't require docs for test code
use std::collections::HashSet;

use nvmprog_target::{CoreDefinition, DeviceFamily, MemoryRange, ProtectionStatus, RegionKind};

use super::{Operation, ProbeDriver, ProbeError};
use crate::flashing::{classify_range, hex, TransferProgress};
use crate::memory::{merge_memory_maps, OverlapMap, SparseMemoryMap};

/// This is a mock device which can be used for tests or for dry runs.
///
/// It keeps the flash contents of every core in memory. Erased flash reads back as
/// absent memory. Every driver call is recorded, and failures can be injected per
/// operation and core.
#[derive(Debug)]
pub struct FakeProbe {
    serial_number: String,
    family: String,
    cores: Vec<FakeCore>,
    failures: HashSet<(Operation, String)>,
    operations: Vec<(Operation, String)>,
}

#[derive(Debug)]
struct FakeCore {
    definition: CoreDefinition,
    flash: SparseMemoryMap,
    protected: bool,
}

impl FakeCore {
    fn contains(&self, range: &std::ops::Range<u64>) -> bool {
        classify_range(range, &self.definition) != RegionKind::Outside
    }
}

impl FakeProbe {
    /// Creates a fake device of the given family with all flash erased.
    pub fn new(serial_number: impl Into<String>, family: &DeviceFamily) -> Self {
        Self {
            serial_number: serial_number.into(),
            family: family.name.clone(),
            cores: family
                .cores
                .iter()
                .map(|definition| FakeCore {
                    definition: CoreDefinition {
                        protection_status: ProtectionStatus::Unknown,
                        ..definition.clone()
                    },
                    flash: SparseMemoryMap::new(),
                    protected: false,
                })
                .collect(),
            failures: HashSet::new(),
            operations: vec![],
        }
    }

    /// Enables or disables readback protection of a core.
    pub fn set_protected(&mut self, core: &str, protected: bool) -> Result<(), ProbeError> {
        self.core_mut(core)?.protected = protected;
        Ok(())
    }

    /// Makes every following `operation` on `core` fail.
    pub fn fail(&mut self, operation: Operation, core: &str) {
        self.failures.insert((operation, core.to_owned()));
    }

    /// Removes all injected failures.
    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// All operations issued so far, in order.
    pub fn operations(&self) -> &[(Operation, String)] {
        &self.operations
    }

    /// Forgets the recorded operations.
    pub fn clear_operations(&mut self) {
        self.operations.clear();
    }

    /// The flash contents of every core, merged into one image.
    pub fn memory_image(&self) -> SparseMemoryMap {
        merge_memory_maps(
            self.cores
                .iter()
                .map(|c| (c.definition.name.clone(), &c.flash)),
        )
    }

    /// Replaces the flash contents of all cores with `image`.
    ///
    /// Every core takes the parts of the image within its ROM and UICR, the rest is
    /// ignored.
    pub fn load_memory_image(&mut self, image: &SparseMemoryMap) {
        for core in &mut self.cores {
            let rom = core.definition.rom_range();
            let uicr = core.definition.uicr_range();
            let mut flash = image.slice(rom.start, rom.end - rom.start);
            for (address, data) in image.slice(uicr.start, uicr.end - uicr.start).blocks() {
                flash.insert_disjoint(address, data.to_vec());
            }
            core.flash = flash;
        }
    }

    fn core_mut(&mut self, name: &str) -> Result<&mut FakeCore, ProbeError> {
        self.cores
            .iter_mut()
            .find(|c| c.definition.name == name)
            .ok_or_else(|| ProbeError::CoreNotFound(name.to_owned()))
    }

    /// Records the operation and returns the core, unless a failure was injected.
    fn begin(&mut self, operation: Operation, core: &str) -> Result<&mut FakeCore, ProbeError> {
        tracing::debug!("[fake probe] {} on core '{}'", operation, core);
        self.operations.push((operation, core.to_owned()));

        if self.failures.contains(&(operation, core.to_owned())) {
            return Err(ProbeError::Operation {
                operation,
                core: core.to_owned(),
                message: "injected failure".to_owned(),
            });
        }
        self.core_mut(core)
    }
}

impl ProbeDriver for FakeProbe {
    fn serial_number(&self) -> String {
        self.serial_number.clone()
    }

    fn family(&self) -> String {
        self.family.clone()
    }

    fn enumerate_cores(&mut self) -> Result<Vec<CoreDefinition>, ProbeError> {
        Ok(self.cores.iter().map(|c| c.definition.clone()).collect())
    }

    fn protection_status(&mut self, core: &str) -> Result<ProtectionStatus, ProbeError> {
        let core = self.begin(Operation::ProtectionQuery, core)?;
        Ok(if core.protected {
            ProtectionStatus::Protected
        } else {
            ProtectionStatus::None
        })
    }

    fn read_memory(&mut self, core: &str) -> Result<SparseMemoryMap, ProbeError> {
        let fake = self.begin(Operation::Read, core)?;
        if fake.protected {
            return Err(ProbeError::Protected(core.to_owned()));
        }
        Ok(fake.flash.clone())
    }

    fn erase_core(
        &mut self,
        core: &str,
        progress: &mut TransferProgress<'_>,
    ) -> Result<(), ProbeError> {
        let fake = self.begin(Operation::Erase, core)?;
        fake.flash = SparseMemoryMap::new();
        fake.protected = false;
        progress.update(100, "Erased");
        Ok(())
    }

    fn program_core(
        &mut self,
        core: &str,
        hex: &str,
        progress: &mut TransferProgress<'_>,
    ) -> Result<(), ProbeError> {
        let fake = self.begin(Operation::Program, core)?;
        let operation_error = |message: String| ProbeError::Operation {
            operation: Operation::Program,
            core: core.to_owned(),
            message,
        };

        let payload = hex::decode(hex).map_err(|e| operation_error(e.to_string()))?;
        if let Some(range) = payload.ranges().find(|r| !fake.contains(r)) {
            return Err(operation_error(format!(
                "{:#010X}..{:#010X} is outside of the core's ROM and UICR",
                range.start, range.end
            )));
        }

        let page_size = fake.definition.page_size as usize;
        let total = payload.byte_len().max(1);
        let mut written = 0;
        for (address, data) in payload.blocks() {
            for (i, chunk) in data.chunks(page_size).enumerate() {
                written += chunk.len();
                let page = address + (i * page_size) as u64;
                progress.update(
                    (written * 100 / total) as u8,
                    format!("Programmed page {page:#010X}"),
                );
            }
        }

        fake.flash = OverlapMap::new([("flash", &fake.flash), ("payload", &payload)]).flatten();
        debug_assert!(fake
            .flash
            .ranges()
            .all(|r| fake.definition.rom_range().contains_range(&r)
                || fake.definition.uicr_range().contains_range(&r)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashing::{FlashProgress, TransferKind};
    use pretty_assertions::assert_eq;

    fn family() -> DeviceFamily {
        DeviceFamily {
            name: "nRF52".to_owned(),
            cores: vec![CoreDefinition {
                name: "Application".to_owned(),
                core_number: 0,
                rom_base_addr: 0,
                rom_size: 0x10_0000,
                uicr_base_addr: 0x1000_1000,
                page_size: 0x1000,
                protection_status: ProtectionStatus::Unknown,
            }],
        }
    }

    fn program(probe: &mut FakeProbe, image: &SparseMemoryMap) -> Result<(), ProbeError> {
        let progress = FlashProgress::empty();
        let mut transfer = progress.start("Application", TransferKind::Program);
        let result = probe.program_core("Application", &hex::encode(image).unwrap(), &mut transfer);
        transfer.finish();
        result
    }

    #[test]
    fn programmed_data_reads_back() {
        let mut probe = FakeProbe::new("123456789", &family());
        let image = SparseMemoryMap::from_ranges([(0x1000, vec![1, 2, 3])]).unwrap();

        program(&mut probe, &image).unwrap();
        assert_eq!(probe.read_memory("Application").unwrap(), image);
    }

    #[test]
    fn data_outside_the_core_is_rejected() {
        let mut probe = FakeProbe::new("123456789", &family());
        let image = SparseMemoryMap::from_ranges([(0x2000_0000, vec![1])]).unwrap();

        assert!(matches!(
            program(&mut probe, &image),
            Err(ProbeError::Operation {
                operation: Operation::Program,
                ..
            })
        ));
        assert!(probe.memory_image().is_empty());
    }

    #[test]
    fn protected_core_rejects_reads_until_erased() {
        let mut probe = FakeProbe::new("123456789", &family());
        probe.set_protected("Application", true).unwrap();

        assert_eq!(
            probe.protection_status("Application"),
            Ok(ProtectionStatus::Protected)
        );
        assert_eq!(
            probe.read_memory("Application"),
            Err(ProbeError::Protected("Application".to_owned()))
        );

        let progress = FlashProgress::empty();
        let mut transfer = progress.start("Application", TransferKind::Erase);
        probe.erase_core("Application", &mut transfer).unwrap();
        transfer.finish();

        assert_eq!(
            probe.protection_status("Application"),
            Ok(ProtectionStatus::None)
        );
    }

    #[test]
    fn injected_failures_are_recorded() {
        let mut probe = FakeProbe::new("123456789", &family());
        probe.fail(Operation::Read, "Application");

        assert!(probe.read_memory("Application").is_err());
        assert_eq!(
            probe.operations(),
            &[(Operation::Read, "Application".to_owned())]
        );
        assert_eq!(
            probe.read_memory("Network"),
            Err(ProbeError::CoreNotFound("Network".to_owned()))
        );
    }

    #[test]
    fn memory_image_is_split_by_core() {
        let mut probe = FakeProbe::new("123456789", &family());
        let image = SparseMemoryMap::from_ranges([
            (0x0, vec![1; 4]),
            (0x1000_1000, vec![2; 4]),
            (0x2000_0000, vec![3; 4]),
        ])
        .unwrap();

        probe.load_memory_image(&image);
        assert_eq!(
            probe.memory_image(),
            SparseMemoryMap::from_ranges([(0x0, vec![1; 4]), (0x1000_1000, vec![2; 4])]).unwrap()
        );
    }
}
