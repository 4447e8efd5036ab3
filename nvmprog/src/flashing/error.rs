#![allow(missing_docs)]

use thiserror::Error;

use crate::memory::MemoryMapError;
use crate::probe::ProbeError;

/// Describes any error that happened during, or in preparation for, programming a core.
#[derive(Error, Debug)]
pub enum FlashError {
    #[error("The probe failed while programming core '{core}'.")]
    Probe {
        core: String,
        #[source]
        source: ProbeError,
    },
    #[error("Programming core '{core}' failed: {message}")]
    ProgrammingFailed { core: String, message: String },
    #[error("The protection status of core '{core}' is unknown, refusing to write it.")]
    ProtectionUnknown { core: String },

    // Intel HEX payloads
    #[error("The Intel HEX data could not be parsed.")]
    Hex(#[from] ihex::ReaderError),
    #[error("The Intel HEX data could not be written.")]
    HexWrite(#[from] ihex::WriterError),
    #[error("Address {address:#X} can not be represented in the Intel HEX format.")]
    InvalidHexAddress { address: u64 },
    #[error("The image contains overlapping data.")]
    Overlap(#[from] MemoryMapError),
}
