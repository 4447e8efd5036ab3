//! Planning and writing firmware to the cores of a device.
//!
//! Loaded images are merged with the [`OverlapMap`](crate::memory::OverlapMap), then every
//! core gets its own [`WritePlan`]: the parts of the image inside the core's ROM or UICR,
//! split into pages. The [`WritePipeline`] transfers the plans core by core and reports
//! what happened in a [`WriteReport`].
//!
//! Progress of every transfer is reported through a [`FlashProgress`] handler:
//!
//! ```
//! use nvmprog::flashing::{FlashProgress, ProgressEvent};
//!
//! let progress = FlashProgress::new(|event| {
//!     if let ProgressEvent::Progress { core, percentage, .. } = event {
//!         println!("{core}: {percentage}%");
//!     }
//! });
//! ```

mod builder;
mod classify;
mod error;
pub mod hex;
mod pipeline;
mod progress;
mod writability;

pub use builder::{FlashPage, WritePlan};
pub use classify::{classify, classify_range};
pub use error::FlashError;
pub use pipeline::{CoreOutcome, CoreReport, WritePipeline, WriteReport, WriteState};
pub use progress::{FlashProgress, ProgressEvent, TransferKind, TransferProgress};
pub use writability::{can_write, is_mcuboot_image, MCUBOOT_IMAGE_MAGIC};
