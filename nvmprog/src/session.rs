use std::path::Path;

use nvmprog_target::{CoreDefinition, DeviceDefinition, ProtectionStatus};

use crate::config::Settings;
use crate::flashing::{self, can_write, FlashProgress, TransferKind, WritePipeline, WriteReport};
use crate::memory::{merge_memory_maps, SparseMemoryMap, MIN_PAD_LENGTH, PAD_BYTE};
use crate::probe::ProbeDriver;
use crate::state::{FileState, TargetState};
use crate::Error;

/// The `Session` struct represents an active connection to a device through a probe,
/// together with the firmware files selected for it.
///
/// All state lives here and is only changed through the operations below. Operations
/// access the device one core at a time, in the order the cores are declared. A session
/// is not meant to be shared; callers have to serialize access to it.
pub struct Session<P: ProbeDriver> {
    probe: P,
    target: TargetState,
    files: FileState,
    settings: Settings,
    progress: FlashProgress,
}

impl<P: ProbeDriver> Session<P> {
    /// Creates a session for the device behind `probe`. The device is not opened yet.
    pub fn new(probe: P, settings: Settings) -> Self {
        Self {
            probe,
            target: TargetState::default(),
            files: FileState::new(),
            settings,
            progress: FlashProgress::empty(),
        }
    }

    /// Sets the handler receiving progress events of erase and program transfers.
    pub fn set_progress(&mut self, progress: FlashProgress) {
        self.progress = progress;
    }

    /// The probe driver.
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// The probe driver, mutably.
    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    /// Consumes the session, returning the probe driver.
    pub fn into_probe(self) -> P {
        self.probe
    }

    /// What is known about the device.
    pub fn target(&self) -> &TargetState {
        &self.target
    }

    /// The loaded firmware files.
    pub fn files(&self) -> &FileState {
        &self.files
    }

    /// The current settings.
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Replaces the settings.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Loads an Intel HEX firmware file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        let memory_map = flashing::hex::decode(&text)?;
        tracing::info!("Loaded {}", path.display());
        self.add_file(path, memory_map);
        Ok(())
    }

    /// Adds an already decoded firmware image.
    pub fn add_file(&mut self, path: &Path, memory_map: SparseMemoryMap) {
        self.files.add_file(path, memory_map);
        self.update_writable();
    }

    /// Unloads all firmware files.
    pub fn clear_files(&mut self) {
        self.files.clear();
        self.update_writable();
    }

    /// Opens the device: enumerates its cores and queries their protection.
    ///
    /// The previous device definition and memory contents are discarded. If auto read
    /// is enabled, the memory is read afterwards.
    pub fn open_device(&mut self) -> Result<&DeviceDefinition, Error> {
        tracing::info!("Opening device {}", self.probe.serial_number());

        let device = self.query_device()?;
        for core in &device.cores {
            tracing::info!(
                "Core {} '{}': ROM {:#010X}..{:#010X}, UICR {:#010X}, page size {:#X}, protection {:?}",
                core.core_number,
                core.name,
                core.rom_base_addr,
                core.rom_end(),
                core.uicr_base_addr,
                core.page_size,
                core.protection_status
            );
        }

        self.target.device = Some(device);
        self.target.memory_map = SparseMemoryMap::new();
        self.target.is_mem_loaded = false;

        if self.settings.auto_read {
            self.read()?;
        }

        self.update_writable();
        self.device()
    }

    /// Reads the memory of every core and merges it into the target memory map.
    ///
    /// Nothing is read if any core is, or might be, readback protected.
    pub fn read(&mut self) -> Result<&SparseMemoryMap, Error> {
        let device = self.device()?.clone();

        if device.any_core_protected() {
            tracing::info!("Skipped reading, since at least one core has readback protection");
            self.update_writable();
            return Ok(&self.target.memory_map);
        }

        let mut maps = Vec::with_capacity(device.cores.len());
        for core in &device.cores {
            tracing::info!("Reading memory for core '{}'", core.name);
            match self.probe.read_memory(&core.name) {
                Ok(memory) => maps.push((core.name.clone(), normalize(&memory, core))),
                Err(error) => {
                    tracing::error!("Reading core '{}' failed: {}", core.name, error);
                    self.target.memory_map = SparseMemoryMap::new();
                    self.target.is_mem_loaded = false;
                    self.update_writable();
                    return Err(error.into());
                }
            }
        }

        self.target.memory_map =
            merge_memory_maps(maps.iter().map(|(name, map)| (name.as_str(), map)));
        self.target.is_mem_loaded = true;
        self.update_writable();

        tracing::info!(
            "Read {} bytes in {} blocks",
            self.target.memory_map.byte_len(),
            self.target.memory_map.len()
        );
        Ok(&self.target.memory_map)
    }

    /// Erases every core, then re-queries the device.
    ///
    /// A failed erase does not stop the remaining cores from being erased, but the
    /// device is only considered erased if all of them succeeded. If auto read is
    /// enabled, the memory is read afterwards.
    pub fn recover(&mut self) -> Result<(), Error> {
        let device = self.device()?.clone();
        let mut failed = vec![];

        for core in &device.cores {
            tracing::info!("Recovering device: core '{}'", core.name);
            let mut transfer = self.progress.start(&core.name, TransferKind::Erase);
            match self.probe.erase_core(&core.name, &mut transfer) {
                Ok(()) => transfer.finish(),
                Err(error) => {
                    tracing::error!("Erasing core '{}' failed: {}", core.name, error);
                    transfer.fail(error.to_string());
                    failed.push(core.name.clone());
                }
            }
        }

        self.target.memory_map = SparseMemoryMap::new();
        self.target.is_mem_loaded = false;
        self.target.is_erased = failed.is_empty();

        // Erasing changes the protection status, query it again.
        let requery = self.query_device();
        match requery {
            Ok(device) => self.target.device = Some(device),
            Err(error) => {
                self.update_writable();
                return Err(error);
            }
        }
        tracing::info!("Device recovery completed");

        if self.settings.auto_read {
            self.read()?;
        }
        self.update_writable();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::RecoverFailed { cores: failed })
        }
    }

    /// Writes the loaded files to the device.
    ///
    /// The files are merged, later files taking precedence, and every core is written
    /// with the parts of the merged image that fall into its ROM or UICR. Writing stops
    /// at the first core that fails. Afterwards the device is opened again, whatever the
    /// outcome, so that its state is observed anew. If that fails, the report is returned
    /// inside [`Error::ReopenFailed`].
    ///
    /// This does not consult [`Session::can_write`]; that decision is up to the caller.
    pub fn write(&mut self) -> Result<WriteReport, Error> {
        let device = self.device()?.clone();
        let overlaps = self.files.overlaps();
        for (range, segment) in overlaps.contested() {
            tracing::warn!(
                "{:#010X}..{:#010X} is contained in {} files, using {}",
                range.start,
                range.end,
                segment.contributions.len(),
                segment.winner().map_or("", |w| w.source.as_str())
            );
        }

        let report = WritePipeline::new(&mut self.probe, &self.progress).run(&device, &overlaps);

        let reopened = self.open_device().map(|_| ());
        self.target.is_erased = false;
        self.update_writable();
        if let Err(source) = reopened {
            return Err(Error::ReopenFailed {
                report,
                source: Box::new(source),
            });
        }

        if report.is_success() {
            tracing::info!("Writing completed");
        }
        Ok(report)
    }

    /// Erases the device, then writes the loaded files to it.
    ///
    /// Nothing is written if any core could not be erased.
    pub fn recover_and_write(&mut self) -> Result<WriteReport, Error> {
        self.recover()?;
        self.write()
    }

    /// Whether writing the loaded files is currently permitted.
    pub fn can_write(&self) -> bool {
        can_write(&self.target, &self.files)
    }

    /// Saves the target memory map, up to the end of the highest ROM, as Intel HEX.
    pub fn save_as_file(&self, path: &Path) -> Result<(), Error> {
        let device = self.device()?;
        let contents = self.target.memory_map.slice(0, device.max_core_address());
        let hex = flashing::hex::encode(&contents)?;

        std::fs::write(path, hex).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        tracing::info!("File is successfully saved at {}", path.display());
        Ok(())
    }

    fn device(&self) -> Result<&DeviceDefinition, Error> {
        self.target.device.as_ref().ok_or(Error::DeviceNotOpen)
    }

    /// Builds a fresh device definition from what the probe reports.
    ///
    /// Core layouts that can not be programmed are rejected before anything else is
    /// queried.
    fn query_device(&mut self) -> Result<DeviceDefinition, Error> {
        let cores = self.probe.enumerate_cores()?;
        for core in &cores {
            core.validate()?;
        }
        let mut device = DeviceDefinition::new(self.probe.serial_number(), self.probe.family());

        for core in cores {
            let protection_status = match self.probe.protection_status(&core.name) {
                Ok(status) => status,
                Err(error) => {
                    tracing::warn!(
                        "Could not determine the protection of core '{}': {}",
                        core.name,
                        error
                    );
                    ProtectionStatus::Unknown
                }
            };
            device = device.with_core(CoreDefinition {
                protection_status,
                ..core
            });
        }
        Ok(device)
    }

    fn update_writable(&mut self) {
        self.target.is_writable = can_write(&self.target, &self.files);
        tracing::debug!("Device writable: {}", self.target.is_writable);
    }
}

/// Restricts a core's memory to its program memory, dropping long runs of erased bytes.
fn normalize(memory: &SparseMemoryMap, core: &CoreDefinition) -> SparseMemoryMap {
    let padded = memory.slice_pad(core.rom_base_addr, core.rom_size as usize, PAD_BYTE);
    SparseMemoryMap::from_padded(core.rom_base_addr, &padded, PAD_BYTE, MIN_PAD_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_drops_erased_runs_and_uicr() {
        let core = CoreDefinition {
            name: "Application".to_owned(),
            core_number: 0,
            rom_base_addr: 0,
            rom_size: 0x1000,
            uicr_base_addr: 0x1_0000,
            page_size: 0x100,
            protection_status: ProtectionStatus::None,
        };
        let mut data = vec![1, 2];
        data.extend([0xFF; 100]);
        data.extend([3]);
        let memory = SparseMemoryMap::from_ranges([(0x10, data), (0x1_0000, vec![4])]).unwrap();

        assert_eq!(
            normalize(&memory, &core),
            SparseMemoryMap::from_ranges([(0x10, vec![1, 2]), (0x76, vec![3])]).unwrap()
        );
    }
}
