//! The state a [`Session`](crate::Session) keeps about the device and the loaded files.

use std::path::{Path, PathBuf};

use nvmprog_target::DeviceDefinition;

use crate::flashing::is_mcuboot_image;
use crate::memory::{merge_memory_maps, OverlapMap, SparseMemoryMap};

/// What is known about the connected device.
///
/// Only the session operations change this state, so it always reflects the last
/// thing that was actually observed on the device.
#[derive(Debug, Clone, Default)]
pub struct TargetState {
    pub(crate) device: Option<DeviceDefinition>,
    pub(crate) memory_map: SparseMemoryMap,
    pub(crate) is_erased: bool,
    pub(crate) is_mem_loaded: bool,
    pub(crate) is_writable: bool,
}

impl TargetState {
    /// The device as it was last opened.
    pub fn device(&self) -> Option<&DeviceDefinition> {
        self.device.as_ref()
    }

    /// The composite memory contents of all cores, as last read.
    pub fn memory_map(&self) -> &SparseMemoryMap {
        &self.memory_map
    }

    /// True after every core has been erased, until the next write.
    pub fn is_erased(&self) -> bool {
        self.is_erased
    }

    /// True once the memory of the device has been read.
    pub fn is_mem_loaded(&self) -> bool {
        self.is_mem_loaded
    }

    /// The last writability decision.
    pub fn is_writable(&self) -> bool {
        self.is_writable
    }
}

/// A firmware file that has been loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    /// Where the file was loaded from.
    pub path: PathBuf,
    /// Its contents.
    pub memory_map: SparseMemoryMap,
}

/// The firmware files the user has selected, in load order.
///
/// Later files take precedence over earlier ones where they overlap.
#[derive(Debug, Clone, Default)]
pub struct FileState {
    files: Vec<LoadedFile>,
    is_mcuboot: bool,
    mcuboot_file_path: Option<PathBuf>,
}

impl FileState {
    /// No files loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file. Loading the same path again replaces the earlier contents and moves
    /// the file to the end of the load order.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, memory_map: SparseMemoryMap) {
        let path = path.into();
        self.files.retain(|f| f.path != path);

        if is_mcuboot_image(&memory_map) {
            tracing::info!("{} is an MCUboot image", path.display());
            self.is_mcuboot = true;
            self.mcuboot_file_path = Some(path.clone());
        }

        tracing::debug!(
            "Loaded {} ({} bytes in {} blocks)",
            path.display(),
            memory_map.byte_len(),
            memory_map.len()
        );
        self.files.push(LoadedFile { path, memory_map });
    }

    /// Removes all files.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The loaded files, in load order.
    pub fn files(&self) -> &[LoadedFile] {
        &self.files
    }

    /// Returns true if no file is loaded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether an MCUboot image has been detected among the files.
    pub fn is_mcuboot(&self) -> bool {
        self.is_mcuboot
    }

    /// The path of the detected MCUboot image.
    pub fn mcuboot_file_path(&self) -> Option<&Path> {
        self.mcuboot_file_path.as_deref()
    }

    /// Overlaps all files, keyed by their path.
    pub fn overlaps(&self) -> OverlapMap {
        OverlapMap::new(
            self.files
                .iter()
                .map(|f| (f.path.display().to_string(), &f.memory_map)),
        )
    }

    /// The merged contents of all files.
    pub fn merged(&self) -> SparseMemoryMap {
        merge_memory_maps(
            self.files
                .iter()
                .map(|f| (f.path.display().to_string(), &f.memory_map)),
        )
    }
}
