//! Target description schema
//!
//! Programming a device requires knowing, per core, where its program memory and its
//! configuration registers (UICR) live and how large a flash page is.
//!
//! This crate contains the schema structs for the YAML device family descriptions,
//! together with the device definition that is built when a device is opened.
#![warn(missing_docs)]

mod core_definition;
mod device;
mod region;
pub(crate) mod serialize;

pub use core_definition::{CoreDefinition, DescriptionError, ProtectionStatus};
pub use device::{format_serial_number, DeviceDefinition, DeviceFamily};
pub use region::{MemoryRange, Region, RegionKind};
