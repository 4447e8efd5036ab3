//! # nvmprog
//!
//! A library for programming the non-volatile memory of single- and multi-core
//! microcontrollers through a debug probe.
//!
//! Firmware images are handled as [`SparseMemoryMap`](memory::SparseMemoryMap)s. Several
//! images are merged into one, where later images take precedence over earlier ones.
//! The merged image is then split per core into page aligned write plans containing
//! only data for the core's program memory (ROM) and its configuration registers (UICR).
//!
//! # Examples
//!
//! ## Writing firmware to a simulated device
//!
//! ```
//! use nvmprog::config::{Registry, Settings};
//! use nvmprog::memory::SparseMemoryMap;
//! use nvmprog::{FakeProbe, Session};
//! use std::path::Path;
//!
//! let registry = Registry::from_builtin_families()?;
//! let probe = FakeProbe::new("960012345", registry.family("nRF52")?);
//!
//! let mut session = Session::new(probe, Settings { auto_read: true, auto_reset: false });
//! session.open_device()?;
//!
//! let firmware = SparseMemoryMap::from_ranges([(0x1000, vec![0xAA; 64])])?;
//! session.add_file(Path::new("app.hex"), firmware);
//! assert!(session.can_write());
//!
//! let report = session.write()?;
//! assert!(report.is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
mod error;
#[warn(missing_docs)]
pub mod flashing;
#[warn(missing_docs)]
pub mod memory;
pub mod probe;
#[warn(missing_docs)]
mod session;
#[warn(missing_docs)]
pub mod state;

pub use crate::error::Error;
pub use crate::probe::{fake_probe::FakeProbe, Operation as ProbeOperation, ProbeDriver, ProbeError};
pub use crate::session::Session;
pub use crate::state::{FileState, LoadedFile, TargetState};
pub use nvmprog_target::{
    CoreDefinition, DescriptionError, DeviceDefinition, DeviceFamily, ProtectionStatus, Region,
    RegionKind,
};
