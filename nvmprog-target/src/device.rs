use crate::core_definition::{CoreDefinition, DescriptionError, ProtectionStatus};
use serde::{Deserialize, Serialize};

/// The family description of a device, as found in the built-in target descriptions.
///
/// The cores are listed in the order in which they have to be read, erased and programmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceFamily {
    /// Name of the family, e.g. `nRF53`.
    pub name: String,
    /// The cores of every device of this family.
    pub cores: Vec<CoreDefinition>,
}

impl DeviceFamily {
    /// Dual-core devices carry an Application and a Network core.
    pub fn is_multi_core(&self) -> bool {
        self.cores.len() > 1
    }

    /// Validates every core and the relation between them.
    pub fn validate(&self) -> Result<(), DescriptionError> {
        if self.cores.is_empty() || self.cores.len() > 2 {
            return Err(DescriptionError::CoreCount(self.cores.len()));
        }
        for (i, core) in self.cores.iter().enumerate() {
            core.validate()?;
            if self.cores[..i].iter().any(|c| c.name == core.name) {
                return Err(DescriptionError::DuplicateCore(core.name.clone()));
            }
        }
        Ok(())
    }
}

/// A device which has been opened through a probe.
///
/// A new definition is created whenever the device is opened, it is only ever
/// replaced as a whole. The protection status of the cores is the only part that
/// gets filled in after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Serial number of the probe / device.
    pub serial_number: String,
    /// Name of the device family.
    pub family: String,
    /// The cores, in declared order.
    pub cores: Vec<CoreDefinition>,
}

impl DeviceDefinition {
    /// Creates a definition for a freshly opened device.
    pub fn new(serial_number: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            family: family.into(),
            cores: vec![],
        }
    }

    /// Returns a new definition with `core` appended.
    pub fn with_core(mut self, core: CoreDefinition) -> Self {
        self.cores.push(core);
        self
    }

    /// Looks up a core by name.
    pub fn core(&self, name: &str) -> Option<&CoreDefinition> {
        self.cores.iter().find(|c| c.name == name)
    }

    /// Returns true if any core is not known to be unprotected.
    pub fn any_core_protected(&self) -> bool {
        self.cores
            .iter()
            .any(|c| c.protection_status != ProtectionStatus::None)
    }

    /// The highest ROM end address over all cores.
    pub fn max_core_address(&self) -> u64 {
        self.cores.iter().map(|c| c.rom_end()).max().unwrap_or(0)
    }

    /// The serial number the way the probe driver expects it.
    pub fn probe_serial(&self) -> String {
        format_serial_number(&self.serial_number)
    }

    /// Address of a single core behind the probe, `<serial>:<core number>`.
    pub fn core_address(&self, core: &CoreDefinition) -> String {
        let serial = self
            .serial_number
            .trim_start_matches('0')
            .parse::<u64>()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| self.serial_number.clone());
        format!("{}:{}", serial, core.core_number)
    }
}

/// Formats a serial number with leading zeros, keeping at most nine significant characters.
pub fn format_serial_number(serial_number: &str) -> String {
    let significant: String = serial_number.chars().take(9).collect();
    format!("000{significant}")
}

#[cfg(test)]
mod test {
    use super::*;

    fn core(name: &str, number: u32, rom_base: u64, uicr: u64) -> CoreDefinition {
        CoreDefinition {
            name: name.to_string(),
            core_number: number,
            rom_base_addr: rom_base,
            rom_size: 0x4_0000,
            uicr_base_addr: uicr,
            page_size: 0x800,
            protection_status: ProtectionStatus::None,
        }
    }

    #[test]
    fn serial_number_is_padded() {
        assert_eq!(format_serial_number("683512345"), "000683512345");
        assert_eq!(format_serial_number("6835123456789"), "000683512345");
    }

    #[test]
    fn core_address_uses_the_numeric_serial() {
        let device = DeviceDefinition::new("000683512345", "nRF53")
            .with_core(core("Network", 1, 0x0100_0000, 0x01FF_8000));
        assert_eq!(device.core_address(&device.cores[0]), "683512345:1");
    }

    #[test]
    fn max_core_address_covers_all_cores() {
        let device = DeviceDefinition::new("1", "nRF53")
            .with_core(core("Application", 0, 0, 0x00FF_8000))
            .with_core(core("Network", 1, 0x0100_0000, 0x01FF_8000));
        assert_eq!(device.max_core_address(), 0x0104_0000);
    }

    #[test]
    fn unknown_protection_counts_as_protected() {
        let mut network = core("Network", 1, 0x0100_0000, 0x01FF_8000);
        network.protection_status = ProtectionStatus::Unknown;
        let device = DeviceDefinition::new("1", "nRF53")
            .with_core(core("Application", 0, 0, 0x00FF_8000))
            .with_core(network);
        assert!(device.any_core_protected());
    }

    #[test]
    fn family_rejects_duplicate_cores() {
        let family = DeviceFamily {
            name: "broken".to_string(),
            cores: vec![
                core("Application", 0, 0, 0x00FF_8000),
                core("Application", 1, 0x0100_0000, 0x01FF_8000),
            ],
        };
        assert_eq!(
            family.validate(),
            Err(DescriptionError::DuplicateCore("Application".to_string()))
        );
    }
}
