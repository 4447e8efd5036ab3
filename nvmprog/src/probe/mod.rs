//! Access to a device through a debug probe.
//!
//! Everything that touches hardware goes through the [`ProbeDriver`] trait. Operations are
//! addressed per core and are issued one at a time; callers must not run two operations
//! against the same device concurrently.

pub mod fake_probe;

use std::fmt;

use nvmprog_target::{CoreDefinition, ProtectionStatus};
use thiserror::Error;

use crate::flashing::TransferProgress;
use crate::memory::SparseMemoryMap;

pub use fake_probe::FakeProbe;

/// An operation of a [`ProbeDriver`], used in errors and operation logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Querying the readback protection of a core.
    ProtectionQuery,
    /// Reading the memory of a core.
    Read,
    /// Erasing a core.
    Erase,
    /// Programming a core.
    Program,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ProtectionQuery => write!(f, "Protection query"),
            Operation::Read => write!(f, "Read"),
            Operation::Erase => write!(f, "Erase"),
            Operation::Program => write!(f, "Program"),
        }
    }
}

/// An error reported by the probe or the hardware behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Communication with the probe failed: {0}")]
    Communication(String),
    #[error("Core '{0}' does not exist on the device")]
    CoreNotFound(String),
    #[error("Core '{0}' is readback protected")]
    Protected(String),
    #[error("{operation} of core '{core}' failed: {message}")]
    Operation {
        operation: Operation,
        core: String,
        message: String,
    },
}

/// The interface to a single device connected through a debug probe.
pub trait ProbeDriver {
    /// The serial number of the probe the device is connected to.
    fn serial_number(&self) -> String;

    /// The family of the connected device.
    fn family(&self) -> String;

    /// Lists the cores of the device, in the order in which they have to be accessed.
    fn enumerate_cores(&mut self) -> Result<Vec<CoreDefinition>, ProbeError>;

    /// Queries the readback protection of a core.
    fn protection_status(&mut self, core: &str) -> Result<ProtectionStatus, ProbeError>;

    /// Reads the non-volatile memory of a core.
    fn read_memory(&mut self, core: &str) -> Result<SparseMemoryMap, ProbeError>;

    /// Erases all non-volatile memory of a core, including its UICR.
    ///
    /// This also lifts the readback protection.
    fn erase_core(
        &mut self,
        core: &str,
        progress: &mut TransferProgress<'_>,
    ) -> Result<(), ProbeError>;

    /// Programs a core with the given Intel HEX data.
    ///
    /// The data has already been split into pages and contains nothing outside of the
    /// core's ROM and UICR.
    fn program_core(
        &mut self,
        core: &str,
        hex: &str,
        progress: &mut TransferProgress<'_>,
    ) -> Result<(), ProbeError>;
}

impl<T: ProbeDriver + ?Sized> ProbeDriver for Box<T> {
    fn serial_number(&self) -> String {
        (**self).serial_number()
    }

    fn family(&self) -> String {
        (**self).family()
    }

    fn enumerate_cores(&mut self) -> Result<Vec<CoreDefinition>, ProbeError> {
        (**self).enumerate_cores()
    }

    fn protection_status(&mut self, core: &str) -> Result<ProtectionStatus, ProbeError> {
        (**self).protection_status(core)
    }

    fn read_memory(&mut self, core: &str) -> Result<SparseMemoryMap, ProbeError> {
        (**self).read_memory(core)
    }

    fn erase_core(
        &mut self,
        core: &str,
        progress: &mut TransferProgress<'_>,
    ) -> Result<(), ProbeError> {
        (**self).erase_core(core, progress)
    }

    fn program_core(
        &mut self,
        core: &str,
        hex: &str,
        progress: &mut TransferProgress<'_>,
    ) -> Result<(), ProbeError> {
        (**self).program_core(core, hex, progress)
    }
}
