use std::path::PathBuf;

use crate::config::{RegistryError, SettingsError};
use crate::flashing::{FlashError, WriteReport};
use crate::memory::MemoryMapError;
use crate::probe::ProbeError;
use nvmprog_target::DescriptionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No device has been opened")]
    DeviceNotOpen,
    #[error("An error with the usage of the probe occured")]
    Probe(#[from] ProbeError),
    #[error("An error occured while writing the device")]
    Flash(#[from] FlashError),
    #[error("The firmware image is malformed")]
    MemoryMap(#[from] MemoryMapError),
    #[error("Unable to load the device description")]
    Registry(#[from] RegistryError),
    #[error("Unable to access the settings")]
    Settings(#[from] SettingsError),
    #[error("Failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Erasing failed for core(s) {}", cores.join(", "))]
    RecoverFailed { cores: Vec<String> },
    #[error("Reopening the device after writing failed")]
    ReopenFailed {
        /// What was written before reopening failed.
        report: WriteReport,
        #[source]
        source: Box<Error>,
    },
    #[error("The device reported an unusable core layout")]
    Description(#[from] DescriptionError),
}
