use crate::region::{MemoryRange, Region, RegionKind};
use crate::serialize::hex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Readback protection state of a single core.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtectionStatus {
    /// No readback protection is active, memory can be read.
    None,
    /// Readback protection is active.
    Protected,
    /// The status has not been queried yet, or the query failed.
    #[default]
    Unknown,
}

impl ProtectionStatus {
    /// Only a core that positively reports no protection may be read.
    pub fn allows_read(&self) -> bool {
        matches!(self, ProtectionStatus::None)
    }
}

/// An individual core inside a device.
///
/// Describes where the program memory (ROM) and the configuration registers (UICR)
/// of the core are located, and the page size used when programming them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreDefinition {
    /// The core name, e.g. `Application` or `Network`.
    pub name: String,
    /// The index of the core on the device, used to address it through the probe.
    pub core_number: u32,
    /// Start address of the program memory.
    #[serde(with = "hex")]
    pub rom_base_addr: u64,
    /// Size of the program memory in bytes.
    #[serde(with = "hex")]
    pub rom_size: u64,
    /// Start address of the UICR page.
    #[serde(with = "hex")]
    pub uicr_base_addr: u64,
    /// Size of a flash page in bytes. The UICR occupies exactly one page.
    #[serde(with = "hex")]
    pub page_size: u32,
    /// Protection status, known only after querying the probe.
    #[serde(default)]
    pub protection_status: ProtectionStatus,
}

impl CoreDefinition {
    /// Address range of the program memory.
    pub fn rom_range(&self) -> Range<u64> {
        self.rom_region().range
    }

    /// Address range of the UICR page.
    pub fn uicr_range(&self) -> Range<u64> {
        self.uicr_region().range
    }

    /// The ROM region of this core.
    pub fn rom_region(&self) -> Region {
        Region::new(RegionKind::Rom, self.rom_base_addr, self.rom_size)
    }

    /// The UICR region of this core.
    pub fn uicr_region(&self) -> Region {
        Region::new(RegionKind::Uicr, self.uicr_base_addr, self.page_size as u64)
    }

    /// First address past the end of the program memory.
    pub fn rom_end(&self) -> u64 {
        self.rom_base_addr.saturating_add(self.rom_size)
    }

    /// Checks the layout is usable for programming.
    pub fn validate(&self) -> Result<(), DescriptionError> {
        if self.page_size == 0 {
            return Err(DescriptionError::ZeroPageSize {
                core: self.name.clone(),
            });
        }
        if self.rom_size == 0 {
            return Err(DescriptionError::EmptyRom {
                core: self.name.clone(),
            });
        }
        let page_size = self.page_size as u64;
        if self.rom_base_addr % page_size != 0 || self.uicr_base_addr % page_size != 0 {
            return Err(DescriptionError::Unaligned {
                core: self.name.clone(),
            });
        }
        if self.rom_range().intersects_range(&self.uicr_range()) {
            return Err(DescriptionError::UicrOverlapsRom {
                core: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Describes a malformed core or device description.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptionError {
    #[error("Core '{core}' has a page size of zero.")]
    ZeroPageSize { core: String },
    #[error("Core '{core}' has no program memory.")]
    EmptyRom { core: String },
    #[error("The ROM or UICR of core '{core}' does not start on a page boundary.")]
    Unaligned { core: String },
    #[error("The UICR of core '{core}' overlaps its program memory.")]
    UicrOverlapsRom { core: String },
    #[error("A device must have one or two cores, found {0}.")]
    CoreCount(usize),
    #[error("Core name '{0}' is used more than once.")]
    DuplicateCore(String),
}
